use chrono::Utc;
use thiserror::Error;

use crate::destination::{favicon_for, Destination, SpecialPage};
use crate::document::{ExportDocument, ImportError};
use crate::effect::HostEffect;
use crate::ids::{BookmarkId, HistoryId, TabId};
use crate::intent::Intent;
use crate::protocol::ClearDataOptions;
use crate::search::{SearchEngine, DEFAULT_SEARCH_ENGINE_ID};
use crate::state::{Bookmark, BrowserState, DownloadEntry, HistoryItem, Settings, Tab};

pub const ERROR_PAGE_TITLE: &str = "Error loading page";

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("tab {0} does not exist")]
    TabNotFound(TabId),
    #[error("unknown search engine {0:?}")]
    UnknownSearchEngine(String),
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Values the model falls back to on clear and on a fresh start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefaults {
    pub home: Destination,
    pub settings: Settings,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            home: Destination::Special(SpecialPage::Landing),
            settings: Settings::default(),
        }
    }
}

pub fn apply_intent(
    state: &mut BrowserState,
    defaults: &ModelDefaults,
    intent: Intent,
) -> Result<Vec<HostEffect>, ReduceError> {
    let mut effects = Vec::new();

    match intent {
        Intent::NewTab { destination } => {
            open_tab(state, destination.unwrap_or_default(), &mut effects);
        }
        Intent::ObserveNewTabRequested { url } => {
            open_tab(state, Destination::parse(&url), &mut effects);
        }
        Intent::CloseTab { tab_id } => {
            let index = state
                .tab_index(tab_id)
                .ok_or(ReduceError::TabNotFound(tab_id))?;
            let was_active = state.tabs[index].is_active;

            if state.tabs.len() == 1 {
                let replacement = state.allocate_tab_id();
                state.tabs.push(Tab::new(
                    replacement,
                    Destination::new_tab(),
                    Destination::new_tab().default_title(),
                ));
                state.tabs.remove(index);
                state.set_exclusive_active(replacement);
                state.loading.remove(&tab_id);
                effects.push(HostEffect::Close { tab_id });
                // The host records the selection even without a surface, so a
                // later navigation of the replacement is attached.
                effects.push(HostEffect::Activate {
                    tab_id: replacement,
                });
            } else {
                state.tabs.remove(index);
                state.loading.remove(&tab_id);
                effects.push(HostEffect::Close { tab_id });
                if was_active {
                    let next = state.tabs[index.saturating_sub(1)].id;
                    state.set_exclusive_active(next);
                    effects.push(HostEffect::Activate { tab_id: next });
                }
            }
        }
        Intent::ActivateTab { tab_id } => {
            let tab = state.tab(tab_id).ok_or(ReduceError::TabNotFound(tab_id))?;
            if !tab.is_active {
                state.set_exclusive_active(tab_id);
                effects.push(HostEffect::Activate { tab_id });
            }
        }
        Intent::Navigate {
            tab_id: None,
            destination,
        } => {
            open_tab(state, destination, &mut effects);
        }
        Intent::Navigate {
            tab_id: Some(tab_id),
            destination,
        } => {
            let tab = state
                .tab_mut(tab_id)
                .ok_or(ReduceError::TabNotFound(tab_id))?;
            let had_surface = !tab.url.is_special();
            tab.url = destination.clone();
            match destination {
                Destination::Web(url) => {
                    tab.favicon = favicon_for(&url);
                    let title = if had_surface {
                        tab.title.clone()
                    } else {
                        url.clone()
                    };
                    state.loading.insert(tab_id, true);
                    push_history(state, &url, &title);
                    effects.push(HostEffect::Navigate { tab_id, url });
                }
                Destination::Special(page) => {
                    tab.title = page.title().to_owned();
                    tab.favicon.clear();
                    state.loading.remove(&tab_id);
                    if had_surface {
                        effects.push(HostEffect::Close { tab_id });
                    }
                }
            }
        }
        Intent::UpdateTab { tab_id, patch } => {
            let tab = state
                .tab_mut(tab_id)
                .ok_or(ReduceError::TabNotFound(tab_id))?;
            if let Some(title) = patch.title {
                tab.title = title;
            }
            if let Some(favicon) = patch.favicon {
                tab.favicon = favicon;
            }
            if let Some(url) = patch.url {
                tab.url = url;
            }
            if let Some(pinned) = patch.pinned {
                tab.is_pinned = pinned;
            }
        }
        Intent::PinTab { tab_id, pinned } => {
            let tab = state
                .tab_mut(tab_id)
                .ok_or(ReduceError::TabNotFound(tab_id))?;
            tab.is_pinned = pinned;
        }
        Intent::GoBack => {
            if let Some(tab_id) = active_web_tab(state) {
                effects.push(HostEffect::Back { tab_id });
            }
        }
        Intent::GoForward => {
            if let Some(tab_id) = active_web_tab(state) {
                effects.push(HostEffect::Forward { tab_id });
            }
        }
        Intent::Refresh => {
            if let Some(tab_id) = active_web_tab(state) {
                effects.push(HostEffect::Reload { tab_id });
            }
        }
        Intent::ObserveTabTitle { tab_id, title } => {
            if let Some(tab) = state.tab_mut(tab_id) {
                tab.title = title;
            }
        }
        Intent::ObserveTabFavicon { tab_id, favicon } => {
            if let Some(tab) = state.tab_mut(tab_id) {
                tab.favicon = favicon;
            }
        }
        Intent::ObserveTabUrl { tab_id, url } => {
            if let Some(tab) = state.tab_mut(tab_id) {
                let observed = Destination::parse(&url);
                // Navigations started here were recorded when they began.
                if tab.url != observed {
                    tab.url = observed;
                    if !tab.url.is_special() {
                        let title = if tab.title.is_empty() {
                            url.clone()
                        } else {
                            tab.title.clone()
                        };
                        push_history(state, &url, &title);
                    }
                }
            }
        }
        Intent::ObserveTabLoading { tab_id, is_loading } => {
            if state.tab(tab_id).is_some() {
                state.loading.insert(tab_id, is_loading);
            }
        }
        Intent::ObserveDownload { phase, payload } => {
            state
                .downloads
                .insert(payload.url.clone(), DownloadEntry { phase, payload });
        }
        Intent::SurfaceFailed { tab_id } => {
            if let Some(tab) = state.tab_mut(tab_id) {
                tab.title = ERROR_PAGE_TITLE.to_owned();
            }
            state.loading.remove(&tab_id);
        }
        Intent::AddBookmark(new) => {
            let favicon = new.favicon.unwrap_or_else(|| favicon_for(&new.url));
            state.bookmarks.push(Bookmark {
                id: BookmarkId::generate(),
                title: new.title,
                url: new.url,
                favicon,
                folder: new.folder,
                created_at: Utc::now(),
            });
        }
        Intent::RemoveBookmark { bookmark_id } => {
            state.bookmarks.retain(|bookmark| bookmark.id != bookmark_id);
        }
        Intent::ClearHistory => {
            state.history.clear();
            effects.push(HostEffect::ClearData(ClearDataOptions::history_only()));
        }
        Intent::RemoveHistoryItem { history_id } => {
            state.history.retain(|item| item.id != history_id);
        }
        Intent::UpdateSettings(patch) => {
            state.settings.apply(patch);
        }
        Intent::SetSearchEngine { engine_id } => {
            if SearchEngine::find(&engine_id).is_none() {
                return Err(ReduceError::UnknownSearchEngine(engine_id));
            }
            state.search_engine_id = engine_id;
        }
        Intent::Import(document) => {
            import_document(state, document, &mut effects)?;
        }
        Intent::ClearAll => {
            // Partitions are only reachable through live surfaces.
            effects.push(HostEffect::ClearData(ClearDataOptions::all()));
            for tab in &state.tabs {
                if !tab.url.is_special() {
                    effects.push(HostEffect::Close { tab_id: tab.id });
                }
            }
            let fresh = state.allocate_tab_id();
            let mut tab = Tab::new(
                fresh,
                Destination::new_tab(),
                Destination::new_tab().default_title(),
            );
            tab.is_active = true;
            state.replace_tabs(vec![tab]);
            state.bookmarks.clear();
            state.history.clear();
            state.settings = defaults.settings.clone();
            state.search_engine_id = DEFAULT_SEARCH_ENGINE_ID.to_owned();
            state.loading.clear();
            state.downloads.clear();
            effects.push(HostEffect::Activate { tab_id: fresh });
        }
    }

    if let Some(tab_id) = state.heal_active() {
        effects.push(HostEffect::Activate { tab_id });
    }

    Ok(effects)
}

fn open_tab(state: &mut BrowserState, destination: Destination, effects: &mut Vec<HostEffect>) {
    let tab_id = state.allocate_tab_id();
    let mut tab = Tab::new(tab_id, destination.clone(), destination.default_title());
    tab.is_active = true;
    for existing in &mut state.tabs {
        existing.is_active = false;
    }
    state.tabs.push(tab);

    if let Destination::Web(url) = destination {
        state.loading.insert(tab_id, true);
        push_history(state, &url, &url);
        effects.push(HostEffect::CreateOrFocus { tab_id, url });
    }
    effects.push(HostEffect::Activate { tab_id });
}

/// Special pages keep no navigation stack.
fn active_web_tab(state: &BrowserState) -> Option<TabId> {
    state
        .active_tab()
        .filter(|tab| !tab.url.is_special())
        .map(|tab| tab.id)
}

fn push_history(state: &mut BrowserState, url: &str, title: &str) {
    state.history.insert(
        0,
        HistoryItem {
            id: HistoryId::generate(),
            title: title.to_owned(),
            url: url.to_owned(),
            favicon: favicon_for(url),
            visited_at: Utc::now(),
        },
    );
}

fn import_document(
    state: &mut BrowserState,
    document: ExportDocument,
    effects: &mut Vec<HostEffect>,
) -> Result<(), ImportError> {
    document.validate()?;
    let ExportDocument {
        tabs,
        active_tab_id,
        bookmarks,
        history,
        settings,
        search_engine,
    } = document;
    let selection_touched = tabs.is_some() || active_tab_id.is_some();

    if let Some(tabs) = tabs {
        for old in &state.tabs {
            let still_web = tabs
                .iter()
                .any(|tab| tab.id == old.id && !tab.url.is_special());
            if !old.url.is_special() && !still_web {
                effects.push(HostEffect::Close { tab_id: old.id });
            }
        }
        for tab in &tabs {
            let Destination::Web(url) = &tab.url else {
                continue;
            };
            match state.tab(tab.id) {
                Some(old) if old.url == tab.url => {}
                Some(old) if !old.url.is_special() => effects.push(HostEffect::Navigate {
                    tab_id: tab.id,
                    url: url.clone(),
                }),
                _ => effects.push(HostEffect::CreateOrFocus {
                    tab_id: tab.id,
                    url: url.clone(),
                }),
            }
        }
        state.replace_tabs(tabs);
        if state.tabs.is_empty() {
            let tab_id = state.allocate_tab_id();
            state.tabs.push(Tab::new(
                tab_id,
                Destination::new_tab(),
                Destination::new_tab().default_title(),
            ));
        }
    }
    match active_tab_id {
        Some(Some(tab_id)) if state.tab(tab_id).is_some() => state.set_exclusive_active(tab_id),
        Some(_) => {
            for tab in &mut state.tabs {
                tab.is_active = false;
            }
        }
        None => {}
    }
    if let Some(bookmarks) = bookmarks {
        state.bookmarks = bookmarks;
    }
    if let Some(history) = history {
        state.history = history;
    }
    if let Some(settings) = settings {
        state.settings = settings;
    }
    if let Some(engine_id) = search_engine {
        state.search_engine_id = engine_id;
    }

    if selection_touched {
        state.heal_active();
        if let Some(tab_id) = state.active_tab_id() {
            effects.push(HostEffect::Activate { tab_id });
        }
    }
    Ok(())
}
