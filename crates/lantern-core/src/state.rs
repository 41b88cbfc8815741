use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::destination::Destination;
use crate::ids::{BookmarkId, HistoryId, TabId};
use crate::protocol::DownloadPayload;
use crate::search::DEFAULT_SEARCH_ENGINE_ID;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub url: Destination,
    #[serde(default)]
    pub favicon: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_pinned: bool,
}

impl Tab {
    pub fn new(id: TabId, url: Destination, title: String) -> Self {
        Self {
            id,
            title,
            favicon: url.favicon(),
            url,
            is_active: false,
            is_pinned: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabPatch {
    pub title: Option<String>,
    pub favicon: Option<String>,
    pub url: Option<Destination>,
    pub pinned: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bookmark fields supplied by the user; id and timestamp are generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub favicon: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: HistoryId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: String,
    pub visited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPage {
    #[default]
    NewTab,
    Continue,
    Specific,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CookiePolicy {
    #[default]
    AllowAll,
    BlockThirdParty,
    BlockAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadBehavior {
    Ask,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub font_size: FontSize,
    pub startup_page: StartupPage,
    pub show_home_button: bool,
    pub cookies_policy: CookiePolicy,
    pub do_not_track: bool,
    pub block_popups: bool,
    pub show_search_suggestions: bool,
    pub download_location: String,
    pub download_behavior: DownloadBehavior,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            font_size: FontSize::Medium,
            startup_page: StartupPage::NewTab,
            show_home_button: true,
            cookies_policy: CookiePolicy::AllowAll,
            do_not_track: false,
            block_popups: true,
            show_search_suggestions: true,
            download_location: String::new(),
            download_behavior: DownloadBehavior::Auto,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub font_size: Option<FontSize>,
    pub startup_page: Option<StartupPage>,
    pub show_home_button: Option<bool>,
    pub cookies_policy: Option<CookiePolicy>,
    pub do_not_track: Option<bool>,
    pub block_popups: Option<bool>,
    pub show_search_suggestions: Option<bool>,
    pub download_location: Option<String>,
    pub download_behavior: Option<DownloadBehavior>,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(font_size) = patch.font_size {
            self.font_size = font_size;
        }
        if let Some(startup_page) = patch.startup_page {
            self.startup_page = startup_page;
        }
        if let Some(show_home_button) = patch.show_home_button {
            self.show_home_button = show_home_button;
        }
        if let Some(cookies_policy) = patch.cookies_policy {
            self.cookies_policy = cookies_policy;
        }
        if let Some(do_not_track) = patch.do_not_track {
            self.do_not_track = do_not_track;
        }
        if let Some(block_popups) = patch.block_popups {
            self.block_popups = block_popups;
        }
        if let Some(show_search_suggestions) = patch.show_search_suggestions {
            self.show_search_suggestions = show_search_suggestions;
        }
        if let Some(download_location) = patch.download_location {
            self.download_location = download_location;
        }
        if let Some(download_behavior) = patch.download_behavior {
            self.download_behavior = download_behavior;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Started,
    Progressing,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadEntry {
    pub phase: DownloadPhase,
    pub payload: DownloadPayload,
}

/// Interface-side browsing model. Tab order is display order; history is
/// kept most-recent-first.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserState {
    pub tabs: Vec<Tab>,
    pub bookmarks: Vec<Bookmark>,
    pub history: Vec<HistoryItem>,
    pub settings: Settings,
    pub search_engine_id: String,
    /// Mirrored from host notifications; never persisted.
    pub loading: BTreeMap<TabId, bool>,
    /// Keyed by download url; never persisted.
    pub downloads: BTreeMap<String, DownloadEntry>,
    next_tab_id: u64,
}

impl Default for BrowserState {
    fn default() -> Self {
        Self {
            tabs: Vec::new(),
            bookmarks: Vec::new(),
            history: Vec::new(),
            settings: Settings::default(),
            search_engine_id: DEFAULT_SEARCH_ENGINE_ID.to_owned(),
            loading: BTreeMap::new(),
            downloads: BTreeMap::new(),
            next_tab_id: 1,
        }
    }
}

impl BrowserState {
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub(crate) fn tab_mut(&mut self, tab_id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|tab| tab.id == tab_id)
    }

    pub fn tab_index(&self, tab_id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == tab_id)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.is_active)
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active_tab().map(|tab| tab.id)
    }

    pub fn is_loading(&self, tab_id: TabId) -> bool {
        self.loading.get(&tab_id).copied().unwrap_or(false)
    }

    pub fn is_bookmarked(&self, url: &str) -> bool {
        self.bookmarks.iter().any(|bookmark| bookmark.url == url)
    }

    /// Replaces the tab list and moves the id allocator past every restored id.
    pub fn replace_tabs(&mut self, tabs: Vec<Tab>) {
        let max_id = tabs.iter().map(|tab| tab.id.0).max().unwrap_or(0);
        self.next_tab_id = self.next_tab_id.max(max_id + 1);
        self.loading.retain(|tab_id, _| tabs.iter().any(|tab| tab.id == *tab_id));
        self.tabs = tabs;
    }

    pub(crate) fn set_exclusive_active(&mut self, tab_id: TabId) {
        for tab in &mut self.tabs {
            tab.is_active = tab.id == tab_id;
        }
    }

    /// Restores "at most one active tab, and one whenever tabs exist".
    /// Returns the tab that had to be activated, if any.
    pub(crate) fn heal_active(&mut self) -> Option<TabId> {
        let mut seen_active = false;
        for tab in &mut self.tabs {
            if tab.is_active {
                if seen_active {
                    tab.is_active = false;
                }
                seen_active = true;
            }
        }
        if seen_active {
            return None;
        }
        let first = self.tabs.first_mut()?;
        first.is_active = true;
        Some(first.id)
    }

    pub(crate) fn allocate_tab_id(&mut self) -> TabId {
        let id = TabId(self.next_tab_id);
        self.next_tab_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::{BrowserState, Settings, SettingsPatch, Tab, Theme};
    use crate::destination::Destination;
    use crate::ids::TabId;

    fn tab(id: u64, active: bool) -> Tab {
        let mut tab = Tab::new(TabId(id), Destination::new_tab(), "New Tab".to_owned());
        tab.is_active = active;
        tab
    }

    #[test]
    fn heal_activates_first_tab_when_none_active() {
        let mut state = BrowserState::default();
        state.replace_tabs(vec![tab(1, false), tab(2, false)]);

        assert_eq!(state.heal_active(), Some(TabId(1)));
        assert_eq!(state.active_tab_id(), Some(TabId(1)));
        assert_eq!(state.heal_active(), None);
    }

    #[test]
    fn heal_drops_duplicate_active_flags() {
        let mut state = BrowserState::default();
        state.replace_tabs(vec![tab(1, false), tab(2, true), tab(3, true)]);

        assert_eq!(state.heal_active(), None);
        let active: Vec<TabId> = state
            .tabs
            .iter()
            .filter(|tab| tab.is_active)
            .map(|tab| tab.id)
            .collect();
        assert_eq!(active, vec![TabId(2)]);
    }

    #[test]
    fn replace_tabs_moves_allocator_past_restored_ids() {
        let mut state = BrowserState::default();
        state.replace_tabs(vec![tab(41, true)]);
        assert_eq!(state.allocate_tab_id(), TabId(42));
    }

    #[test]
    fn settings_patch_only_touches_present_fields() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            theme: Some(Theme::Dark),
            do_not_track: Some(true),
            ..SettingsPatch::default()
        });

        assert_eq!(settings.theme, Theme::Dark);
        assert!(settings.do_not_track);
        assert!(settings.block_popups);
        assert!(settings.show_home_button);
    }

    #[test]
    fn settings_use_camel_case_wire_names() {
        let json = serde_json::to_value(Settings::default()).expect("serialize");
        assert_eq!(json["cookiesPolicy"], "allow-all");
        assert_eq!(json["startupPage"], "newtab");
        assert_eq!(json["downloadBehavior"], "auto");

        let partial: Settings =
            serde_json::from_str(r#"{"theme":"dark"}"#).expect("partial settings parse");
        assert_eq!(partial.theme, Theme::Dark);
        assert_eq!(partial.font_size, Settings::default().font_size);
    }
}
