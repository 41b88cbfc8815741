//! Whole-model document used for export/import and for the per-key layout
//! of the persistence store.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::TabId;
use crate::search::SearchEngine;
use crate::state::{Bookmark, BrowserState, HistoryItem, Settings, Tab};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKey {
    Tabs,
    ActiveTabId,
    Bookmarks,
    History,
    Settings,
    SearchEngine,
}

impl StoreKey {
    pub const ALL: [StoreKey; 6] = [
        Self::Tabs,
        Self::ActiveTabId,
        Self::Bookmarks,
        Self::History,
        Self::Settings,
        Self::SearchEngine,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tabs => "tabs",
            Self::ActiveTabId => "activeTabId",
            Self::Bookmarks => "bookmarks",
            Self::History => "history",
            Self::Settings => "settings",
            Self::SearchEngine => "searchEngine",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import document is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("import document repeats tab id {0}")]
    DuplicateTab(TabId),
    #[error("import document names unknown search engine {0:?}")]
    UnknownSearchEngine(String),
    #[error("import document selects tab {0} which is not in its tab list")]
    UnknownActiveTab(TabId),
}

/// Every field is optional on import: absent fields leave the model alone.
/// `activeTabId` distinguishes "absent" from an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExportDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Vec<Tab>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_tab_id: Option<Option<TabId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<Vec<Bookmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ExportDocument {
    pub fn from_state(state: &BrowserState) -> Self {
        Self {
            tabs: Some(state.tabs.clone()),
            active_tab_id: Some(state.active_tab_id()),
            bookmarks: Some(state.bookmarks.clone()),
            history: Some(state.history.clone()),
            settings: Some(state.settings.clone()),
            search_engine: Some(state.search_engine_id.clone()),
        }
    }

    /// Parses and validates; nothing is applied unless this returns `Ok`.
    pub fn parse(json: &str) -> Result<Self, ImportError> {
        let document: Self = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if let Some(tabs) = &self.tabs {
            let mut seen = BTreeSet::new();
            for tab in tabs {
                if !seen.insert(tab.id) {
                    return Err(ImportError::DuplicateTab(tab.id));
                }
            }
            if let Some(Some(active)) = self.active_tab_id {
                if !seen.contains(&active) {
                    return Err(ImportError::UnknownActiveTab(active));
                }
            }
        }
        if let Some(engine_id) = &self.search_engine {
            if SearchEngine::find(engine_id).is_none() {
                return Err(ImportError::UnknownSearchEngine(engine_id.clone()));
            }
        }
        Ok(())
    }

    pub fn value_for(&self, key: StoreKey) -> Option<Value> {
        let value = match key {
            StoreKey::Tabs => serde_json::to_value(self.tabs.as_ref()?),
            StoreKey::ActiveTabId => serde_json::to_value(self.active_tab_id?),
            StoreKey::Bookmarks => serde_json::to_value(self.bookmarks.as_ref()?),
            StoreKey::History => serde_json::to_value(self.history.as_ref()?),
            StoreKey::Settings => serde_json::to_value(self.settings.as_ref()?),
            StoreKey::SearchEngine => serde_json::to_value(self.search_engine.as_ref()?),
        };
        value.ok()
    }

    /// Fills one field from a persisted per-key value. `null` counts as absent
    /// for every key except the active tab id.
    pub fn set_stored(&mut self, key: StoreKey, value: Value) -> Result<(), serde_json::Error> {
        if value.is_null() && key != StoreKey::ActiveTabId {
            return Ok(());
        }
        match key {
            StoreKey::Tabs => self.tabs = Some(decode(value)?),
            StoreKey::ActiveTabId => self.active_tab_id = Some(decode(value)?),
            StoreKey::Bookmarks => self.bookmarks = Some(decode(value)?),
            StoreKey::History => self.history = Some(decode(value)?),
            StoreKey::Settings => self.settings = Some(decode(value)?),
            StoreKey::SearchEngine => self.search_engine = Some(decode(value)?),
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExportDocument, ImportError, StoreKey};
    use crate::ids::TabId;
    use crate::state::BrowserState;

    #[test]
    fn absent_and_null_active_tab_are_distinct() {
        let absent = ExportDocument::parse("{}").expect("empty document is valid");
        assert_eq!(absent.active_tab_id, None);

        let null = ExportDocument::parse(r#"{"activeTabId":null}"#).expect("null is valid");
        assert_eq!(null.active_tab_id, Some(None));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            ExportDocument::parse("{not json"),
            Err(ImportError::Malformed(_))
        ));
        assert!(matches!(
            ExportDocument::parse(r#"{"tabs":"nope"}"#),
            Err(ImportError::Malformed(_))
        ));
        assert!(matches!(
            ExportDocument::parse(r#"{"searchEngine":"99"}"#),
            Err(ImportError::UnknownSearchEngine(id)) if id == "99"
        ));
        let duplicate = json!({
            "tabs": [
                {"id": 1, "title": "a", "url": "about:newtab"},
                {"id": 1, "title": "b", "url": "about:newtab"}
            ]
        });
        assert!(matches!(
            ExportDocument::parse(&duplicate.to_string()),
            Err(ImportError::DuplicateTab(TabId(1)))
        ));
    }

    #[test]
    fn store_values_cover_every_key() {
        let document = ExportDocument::from_state(&BrowserState::default());
        for key in StoreKey::ALL {
            assert!(document.value_for(key).is_some(), "missing value for {key:?}");
            assert_eq!(StoreKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(document.value_for(StoreKey::ActiveTabId), Some(json!(null)));
    }

    #[test]
    fn set_stored_ignores_null_collections() {
        let mut document = ExportDocument::default();
        document
            .set_stored(StoreKey::Tabs, json!(null))
            .expect("null tabs are tolerated");
        document
            .set_stored(StoreKey::ActiveTabId, json!(null))
            .expect("null active tab is meaningful");
        assert_eq!(document.tabs, None);
        assert_eq!(document.active_tab_id, Some(None));
        assert!(document
            .set_stored(StoreKey::History, json!({"oops": true}))
            .is_err());
    }
}
