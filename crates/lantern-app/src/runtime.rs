use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use lantern_core::{
    BookmarkId, Destination, Engine, ExportDocument, HistoryId, HostEffect, ImportError, Intent,
    ModelDefaults, NewBookmark, Notification, ReduceError, SearchEngine, SettingsPatch, StoreKey,
    TabId, TabInfo, TabPatch, Transition,
};
use lantern_core::{BrowserState, DownloadPhase};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeError, HostClient, Subscription};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Reduce(#[from] ReduceError),
    #[error("import rejected: {0}")]
    Import(#[from] ImportError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("export could not be encoded: {0}")]
    Export(#[from] serde_json::Error),
    #[error("no tab is active")]
    NoActiveTab,
}

/// Interface-side owner of the browsing model. Every mutation goes through
/// the engine first; the resulting host effects are then sent as commands
/// and reconciled against their responses.
pub struct BrowserRuntime {
    engine: Engine,
    client: HostClient,
    written: BTreeMap<StoreKey, Value>,
}

impl BrowserRuntime {
    /// Loads every persisted key, restores the model and brings the host's
    /// surfaces in line with it.
    pub async fn bootstrap(
        client: HostClient,
        defaults: ModelDefaults,
    ) -> Result<Self, RuntimeError> {
        let mut document = ExportDocument::default();
        let mut written = BTreeMap::new();
        for key in StoreKey::ALL {
            let Some(value) = client.get_store_value(key.as_str()).await? else {
                continue;
            };
            match document.set_stored(key, value.clone()) {
                Ok(()) => {
                    written.insert(key, value);
                }
                Err(error) => {
                    warn!(key = key.as_str(), %error, "ignoring unreadable stored value")
                }
            }
        }
        sanitize_restored(&mut document);

        let mut runtime = Self {
            engine: Engine::new(defaults),
            client,
            written,
        };
        match runtime.engine.dispatch(Intent::Import(document)) {
            Ok(transition) => runtime.reconcile(&transition.effects).await?,
            Err(error) => warn!(%error, "stored state rejected, starting fresh"),
        }
        if runtime.engine.state().tabs.is_empty() {
            runtime.apply(Intent::NewTab { destination: None }).await?;
        }
        runtime.persist().await;

        info!(
            tabs = runtime.engine.state().tabs.len(),
            bookmarks = runtime.engine.state().bookmarks.len(),
            history = runtime.engine.state().history.len(),
            "browsing model restored"
        );
        Ok(runtime)
    }

    pub fn state(&self) -> &BrowserState {
        self.engine.state()
    }

    pub fn revision(&self) -> u64 {
        self.engine.revision()
    }

    pub fn search_engine(&self) -> &'static SearchEngine {
        self.engine.search_engine()
    }

    pub fn resolve(&self, input: &str) -> Destination {
        self.engine.resolve(input)
    }

    /// Opens a tab for `input` (or the new-tab page) and returns its id.
    pub async fn add_tab(&mut self, input: Option<&str>) -> Result<TabId, RuntimeError> {
        let destination = input.map(|input| self.resolve(input));
        self.apply(Intent::NewTab { destination }).await?;
        self.active_tab_id()
    }

    pub async fn close_tab(&mut self, tab_id: TabId) -> Result<Transition, RuntimeError> {
        self.apply(Intent::CloseTab { tab_id }).await
    }

    pub async fn set_active_tab(&mut self, tab_id: TabId) -> Result<Transition, RuntimeError> {
        self.apply(Intent::ActivateTab { tab_id }).await
    }

    /// `tab_id: None` opens the resolved destination in a new tab.
    pub async fn navigate_to(
        &mut self,
        input: &str,
        tab_id: Option<TabId>,
    ) -> Result<Destination, RuntimeError> {
        let destination = self.resolve(input);
        self.apply(Intent::Navigate {
            tab_id,
            destination: destination.clone(),
        })
        .await?;
        Ok(destination)
    }

    pub async fn navigate_active(&mut self, input: &str) -> Result<Destination, RuntimeError> {
        let tab_id = self.engine.state().active_tab_id();
        self.navigate_to(input, tab_id).await
    }

    pub async fn go_back(&mut self) -> Result<Transition, RuntimeError> {
        self.apply(Intent::GoBack).await
    }

    pub async fn go_forward(&mut self) -> Result<Transition, RuntimeError> {
        self.apply(Intent::GoForward).await
    }

    pub async fn refresh(&mut self) -> Result<Transition, RuntimeError> {
        self.apply(Intent::Refresh).await
    }

    pub async fn update_tab(
        &mut self,
        tab_id: TabId,
        patch: TabPatch,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::UpdateTab { tab_id, patch }).await
    }

    pub async fn pin_tab(
        &mut self,
        tab_id: TabId,
        pinned: bool,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::PinTab { tab_id, pinned }).await
    }

    pub async fn add_bookmark(
        &mut self,
        bookmark: NewBookmark,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::AddBookmark(bookmark)).await
    }

    pub async fn remove_bookmark(
        &mut self,
        bookmark_id: BookmarkId,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::RemoveBookmark { bookmark_id }).await
    }

    pub fn is_bookmarked(&self, url: &str) -> bool {
        self.engine.state().is_bookmarked(url)
    }

    pub async fn clear_history(&mut self) -> Result<Transition, RuntimeError> {
        self.apply(Intent::ClearHistory).await
    }

    pub async fn remove_history_item(
        &mut self,
        history_id: HistoryId,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::RemoveHistoryItem { history_id }).await
    }

    pub async fn update_settings(
        &mut self,
        patch: SettingsPatch,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::UpdateSettings(patch)).await
    }

    pub async fn set_search_engine(
        &mut self,
        engine_id: &str,
    ) -> Result<Transition, RuntimeError> {
        self.apply(Intent::SetSearchEngine {
            engine_id: engine_id.to_owned(),
        })
        .await
    }

    pub fn export_all(&self) -> Result<String, RuntimeError> {
        Ok(self.engine.export_json()?)
    }

    /// Rejects malformed documents before anything is replaced.
    pub async fn import_all(&mut self, json: &str) -> Result<Transition, RuntimeError> {
        let document = ExportDocument::parse(json)?;
        self.apply(Intent::Import(document)).await
    }

    pub async fn clear_all(&mut self) -> Result<Transition, RuntimeError> {
        self.apply(Intent::ClearAll).await
    }

    pub async fn tab_info(&self, tab_id: TabId) -> Result<Option<TabInfo>, RuntimeError> {
        Ok(self.client.get_tab_info(tab_id).await?)
    }

    pub async fn open_external(&self, url: &str) -> Result<bool, RuntimeError> {
        Ok(self.client.open_external(url).await?)
    }

    pub async fn handle_notification(
        &mut self,
        notification: Notification,
    ) -> Result<(), RuntimeError> {
        let intent = match notification {
            Notification::TitleUpdated { tab_id, title } => {
                Intent::ObserveTabTitle { tab_id, title }
            }
            Notification::FaviconUpdated { tab_id, favicon } => {
                Intent::ObserveTabFavicon { tab_id, favicon }
            }
            Notification::Loading { tab_id, is_loading } => {
                Intent::ObserveTabLoading { tab_id, is_loading }
            }
            Notification::UrlUpdated { tab_id, url } => Intent::ObserveTabUrl { tab_id, url },
            Notification::WillNavigate { tab_id, url } => {
                debug!(%tab_id, %url, "tab will navigate");
                return Ok(());
            }
            Notification::NewTabRequested { url } => Intent::ObserveNewTabRequested { url },
            Notification::DownloadStarted(payload) => Intent::ObserveDownload {
                phase: DownloadPhase::Started,
                payload,
            },
            Notification::DownloadUpdated(payload) => Intent::ObserveDownload {
                phase: DownloadPhase::Progressing,
                payload,
            },
            Notification::DownloadDone(payload) => Intent::ObserveDownload {
                phase: DownloadPhase::Done,
                payload,
            },
        };
        self.apply(intent).await.map(|_| ())
    }

    /// Feeds notifications into the model until `shutdown` resolves or the
    /// host stops publishing, then shuts the host down.
    pub async fn run(
        mut self,
        mut subscription: Subscription,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RuntimeError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                notification = subscription.next() => {
                    let Some(notification) = notification else {
                        info!("host stopped publishing");
                        break;
                    };
                    if let Err(error) = self.handle_notification(notification).await {
                        warn!(%error, "notification could not be applied");
                    }
                }
            }
        }
        self.shutdown(subscription).await
    }

    pub async fn shutdown(mut self, mut subscription: Subscription) -> Result<(), RuntimeError> {
        self.persist().await;
        let flushed = self.client.shutdown().await?;
        if !flushed {
            warn!("host reported an incomplete store flush");
        }
        subscription.close();
        Ok(())
    }

    fn active_tab_id(&self) -> Result<TabId, RuntimeError> {
        self.engine
            .state()
            .active_tab_id()
            .ok_or(RuntimeError::NoActiveTab)
    }

    async fn apply(&mut self, intent: Intent) -> Result<Transition, RuntimeError> {
        let transition = self.engine.dispatch(intent)?;
        self.reconcile(&transition.effects).await?;
        if transition.changed() {
            self.persist().await;
        }
        Ok(transition)
    }

    /// Sends each effect to the host in order. A tab whose surface could not
    /// be built stays in the model and is marked failed.
    async fn reconcile(&mut self, effects: &[HostEffect]) -> Result<(), BridgeError> {
        for effect in effects {
            let command = effect.to_command();
            let name = command.name();
            let response = self.client.request(command).await?;
            match effect {
                HostEffect::CreateOrFocus { tab_id, url } => {
                    if !response.into_bool() {
                        warn!(%tab_id, %url, "surface could not be created");
                        self.surface_failed(*tab_id);
                    }
                }
                HostEffect::Navigate { tab_id, url } => {
                    if response.into_url().is_none() {
                        warn!(%tab_id, %url, "navigation failed");
                        if self.client.get_tab_info(*tab_id).await?.is_none() {
                            self.surface_failed(*tab_id);
                        }
                    }
                }
                _ => debug!(command = name, ?response, "host answered"),
            }
        }
        Ok(())
    }

    fn surface_failed(&mut self, tab_id: TabId) {
        if let Err(error) = self.engine.dispatch(Intent::SurfaceFailed { tab_id }) {
            warn!(%tab_id, %error, "could not mark tab as failed");
        }
    }

    /// Writes every key whose serialized value changed since the last
    /// successful write. Failures are logged and retried on the next change.
    async fn persist(&mut self) {
        let document = self.engine.export_document();
        for key in StoreKey::ALL {
            let Some(value) = document.value_for(key) else {
                continue;
            };
            if self.written.get(&key) == Some(&value) {
                continue;
            }
            match self.client.set_store_value(key.as_str(), value.clone()).await {
                Ok(true) => {
                    self.written.insert(key, value);
                }
                Ok(false) => warn!(key = key.as_str(), "store rejected write"),
                Err(error) => warn!(key = key.as_str(), %error, "store unreachable"),
            }
        }
    }
}

/// Drops restored values that would make the whole import fail.
fn sanitize_restored(document: &mut ExportDocument) {
    if let Some(tabs) = &mut document.tabs {
        let mut seen = BTreeSet::new();
        tabs.retain(|tab| seen.insert(tab.id));
    }
    if let Some(Some(active)) = document.active_tab_id {
        let known = document
            .tabs
            .as_ref()
            .is_some_and(|tabs| tabs.iter().any(|tab| tab.id == active));
        if !known {
            warn!(tab_id = %active, "stored active tab no longer exists");
            document.active_tab_id = None;
        }
    }
    if let Some(engine_id) = &document.search_engine {
        if SearchEngine::find(engine_id).is_none() {
            warn!(%engine_id, "stored search engine is unknown, using the default");
            document.search_engine = None;
        }
    }
}
