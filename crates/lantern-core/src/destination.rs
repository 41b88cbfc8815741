//! Where a tab points: either an in-app special page or a web url.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use url::Url;

pub const SPECIAL_SCHEME: &str = "about:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialPage {
    NewTab,
    Landing,
    Bookmarks,
    History,
    Settings,
    Downloads,
    Extensions,
}

impl SpecialPage {
    pub const ALL: [SpecialPage; 7] = [
        Self::NewTab,
        Self::Landing,
        Self::Bookmarks,
        Self::History,
        Self::Settings,
        Self::Downloads,
        Self::Extensions,
    ];

    pub fn marker(self) -> &'static str {
        match self {
            Self::NewTab => "about:newtab",
            Self::Landing => "about:landing",
            Self::Bookmarks => "about:bookmarks",
            Self::History => "about:history",
            Self::Settings => "about:settings",
            Self::Downloads => "about:downloads",
            Self::Extensions => "about:extensions",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|page| page.marker() == marker)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::NewTab => "New Tab",
            Self::Landing => "Lantern",
            Self::Bookmarks => "Bookmarks",
            Self::History => "History",
            Self::Settings => "Settings",
            Self::Downloads => "Downloads",
            Self::Extensions => "Extensions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Destination {
    Special(SpecialPage),
    Web(String),
}

impl Destination {
    pub fn new_tab() -> Self {
        Self::Special(SpecialPage::NewTab)
    }

    /// Classifies a raw destination string without rewriting it.
    pub fn parse(raw: &str) -> Self {
        match SpecialPage::from_marker(raw) {
            Some(page) => Self::Special(page),
            None => Self::Web(raw.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Special(page) => page.marker(),
            Self::Web(url) => url,
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self, Self::Special(_))
    }

    pub fn web_url(&self) -> Option<&str> {
        match self {
            Self::Special(_) => None,
            Self::Web(url) => Some(url),
        }
    }

    pub fn default_title(&self) -> String {
        match self {
            Self::Special(page) => page.title().to_owned(),
            Self::Web(url) => url.clone(),
        }
    }

    pub fn favicon(&self) -> String {
        match self {
            Self::Special(_) => String::new(),
            Self::Web(url) => favicon_for(url),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::new_tab()
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        match value {
            Destination::Special(page) => page.marker().to_owned(),
            Destination::Web(url) => url,
        }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// `<origin>/favicon.ico` for urls with a network origin, empty otherwise.
pub fn favicon_for(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.origin().is_tuple() => {
            format!("{}/favicon.ico", parsed.origin().ascii_serialization())
        }
        _ => String::new(),
    }
}
