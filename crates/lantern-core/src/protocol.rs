//! Messages exchanged between the interface loop and the host loop.
//!
//! Commands flow interface -> host and are each answered by exactly one
//! [`Response`]. Notifications flow host -> interface, are never
//! acknowledged, and are ordered only relative to each other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TabId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClearDataOptions {
    pub history: bool,
    pub cookies: bool,
    pub cache: bool,
    pub local_storage: bool,
}

impl ClearDataOptions {
    pub fn all() -> Self {
        Self {
            history: true,
            cookies: true,
            cache: true,
            local_storage: true,
        }
    }

    pub fn history_only() -> Self {
        Self {
            history: true,
            ..Self::default()
        }
    }

    pub fn categories(self) -> Vec<DataCategory> {
        let mut categories = Vec::new();
        if self.history {
            categories.push(DataCategory::History);
        }
        if self.cookies {
            categories.push(DataCategory::Cookies);
        }
        if self.cache {
            categories.push(DataCategory::Cache);
        }
        if self.local_storage {
            categories.push(DataCategory::LocalStorage);
        }
        categories
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataCategory {
    History,
    Cookies,
    Cache,
    LocalStorage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub url: String,
    pub title: String,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    pub url: String,
    pub filename: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    CreateTab { tab_id: TabId, url: Option<String> },
    #[serde(rename_all = "camelCase")]
    NavigateTab { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    CloseTab { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    SetActiveTab { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    GoBack { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    GoForward { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    RefreshTab { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    GetTabInfo { tab_id: TabId },
    ClearBrowsingData { options: ClearDataOptions },
    OpenExternal { url: String },
    GetStoreValue { key: String },
    SetStoreValue { key: String, value: Value },
    /// Window-level shutdown: the host closes every surface, answers, and stops.
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTab { .. } => "create-tab",
            Self::NavigateTab { .. } => "navigate-tab",
            Self::CloseTab { .. } => "close-tab",
            Self::SetActiveTab { .. } => "set-active-tab",
            Self::GoBack { .. } => "go-back",
            Self::GoForward { .. } => "go-forward",
            Self::RefreshTab { .. } => "refresh-tab",
            Self::GetTabInfo { .. } => "get-tab-info",
            Self::ClearBrowsingData { .. } => "clear-browsing-data",
            Self::OpenExternal { .. } => "open-external",
            Self::GetStoreValue { .. } => "get-store-value",
            Self::SetStoreValue { .. } => "set-store-value",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Response {
    Bool(bool),
    Url(Option<String>),
    TabInfo(Option<TabInfo>),
    Value(Option<Value>),
}

impl Response {
    /// Any response of the wrong shape reads as a negative result.
    pub fn into_bool(self) -> bool {
        matches!(self, Self::Bool(true))
    }

    pub fn into_url(self) -> Option<String> {
        match self {
            Self::Url(url) => url,
            _ => None,
        }
    }

    pub fn into_tab_info(self) -> Option<TabInfo> {
        match self {
            Self::TabInfo(info) => info,
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => value,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    TitleUpdated,
    FaviconUpdated,
    Loading,
    UrlUpdated,
    WillNavigate,
    NewTabRequested,
    DownloadStarted,
    DownloadUpdated,
    DownloadDone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    #[serde(rename = "tab-title-updated", rename_all = "camelCase")]
    TitleUpdated { tab_id: TabId, title: String },
    #[serde(rename = "tab-favicon-updated", rename_all = "camelCase")]
    FaviconUpdated { tab_id: TabId, favicon: String },
    #[serde(rename = "tab-loading", rename_all = "camelCase")]
    Loading { tab_id: TabId, is_loading: bool },
    #[serde(rename = "tab-url-updated", rename_all = "camelCase")]
    UrlUpdated { tab_id: TabId, url: String },
    #[serde(rename = "tab-will-navigate", rename_all = "camelCase")]
    WillNavigate { tab_id: TabId, url: String },
    NewTabRequested { url: String },
    DownloadStarted(DownloadPayload),
    DownloadUpdated(DownloadPayload),
    DownloadDone(DownloadPayload),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::TitleUpdated { .. } => NotificationKind::TitleUpdated,
            Self::FaviconUpdated { .. } => NotificationKind::FaviconUpdated,
            Self::Loading { .. } => NotificationKind::Loading,
            Self::UrlUpdated { .. } => NotificationKind::UrlUpdated,
            Self::WillNavigate { .. } => NotificationKind::WillNavigate,
            Self::NewTabRequested { .. } => NotificationKind::NewTabRequested,
            Self::DownloadStarted(_) => NotificationKind::DownloadStarted,
            Self::DownloadUpdated(_) => NotificationKind::DownloadUpdated,
            Self::DownloadDone(_) => NotificationKind::DownloadDone,
        }
    }

    /// Routing key for per-tab notifications.
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::TitleUpdated { tab_id, .. }
            | Self::FaviconUpdated { tab_id, .. }
            | Self::Loading { tab_id, .. }
            | Self::UrlUpdated { tab_id, .. }
            | Self::WillNavigate { tab_id, .. } => Some(*tab_id),
            Self::NewTabRequested { .. }
            | Self::DownloadStarted(_)
            | Self::DownloadUpdated(_)
            | Self::DownloadDone(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClearDataOptions, Command, DataCategory, Notification, Response};
    use crate::ids::TabId;

    #[test]
    fn commands_use_kebab_case_tags() {
        let json = serde_json::to_value(Command::CreateTab {
            tab_id: TabId(3),
            url: Some("https://example.com".to_owned()),
        })
        .expect("serialize");
        assert_eq!(json["command"], "create-tab");
        assert_eq!(json["tabId"], 3);
    }

    #[test]
    fn notifications_keep_original_event_names() {
        let json = serde_json::to_value(Notification::Loading {
            tab_id: TabId(1),
            is_loading: true,
        })
        .expect("serialize");
        assert_eq!(json["event"], "tab-loading");
        assert_eq!(json["isLoading"], true);

        let parsed: Notification =
            serde_json::from_str(r#"{"event":"new-tab-requested","url":"https://a.example"}"#)
                .expect("deserialize");
        assert_eq!(parsed.tab_id(), None);
    }

    #[test]
    fn clear_options_expand_to_categories() {
        assert_eq!(ClearDataOptions::default().categories(), Vec::new());
        assert_eq!(
            ClearDataOptions::history_only().categories(),
            vec![DataCategory::History]
        );
        assert_eq!(ClearDataOptions::all().categories().len(), 4);
    }

    #[test]
    fn mismatched_response_reads_negative() {
        assert!(!Response::Url(Some("x".to_owned())).into_bool());
        assert_eq!(Response::Bool(true).into_url(), None);
        assert!(Response::Bool(true).into_bool());
    }
}
