use std::collections::BTreeMap;

use futures::future::join_all;
use lantern_core::{
    ClearDataOptions, Destination, DownloadPhase, Notification, TabId, TabInfo, ERROR_PAGE_TITLE,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::bridge::NotificationSink;
use crate::host::{
    error_page_url, is_error_page, Bounds, RenderBackend, SignalSender, SurfaceEvent,
    SurfaceHandle, SurfaceSignal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Attached,
    Detached,
}

#[derive(Debug)]
struct Surface {
    handle: SurfaceHandle,
    phase: SurfacePhase,
    url: String,
    title: String,
    is_loading: bool,
    generation: u64,
}

/// Owns every rendering surface, keyed by the tab it is bound to. At most
/// one surface is attached to the window at any time.
pub struct ViewManager<B: RenderBackend> {
    backend: B,
    surfaces: BTreeMap<TabId, Surface>,
    active: Option<TabId>,
    bounds: Bounds,
    notifications: NotificationSink,
    signals: SignalSender,
}

impl<B: RenderBackend> ViewManager<B> {
    pub fn new(
        backend: B,
        notifications: NotificationSink,
        bounds: Bounds,
    ) -> (Self, UnboundedReceiver<SurfaceSignal>) {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let manager = Self {
            backend,
            surfaces: BTreeMap::new(),
            active: None,
            bounds,
            notifications,
            signals,
        };
        (manager, signal_rx)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn has_surface(&self, tab_id: TabId) -> bool {
        self.surfaces.contains_key(&tab_id)
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn attached(&self) -> Vec<TabId> {
        self.surfaces
            .iter()
            .filter(|(_, surface)| surface.phase == SurfacePhase::Attached)
            .map(|(tab_id, _)| *tab_id)
            .collect()
    }

    pub async fn create_or_focus(&mut self, tab_id: TabId, url: Option<&str>) -> bool {
        if self.surfaces.contains_key(&tab_id) {
            debug!(%tab_id, "surface exists, focusing");
            self.activate(tab_id);
            return true;
        }
        if let Some(url) = url {
            if Destination::parse(url).is_special() {
                warn!(%tab_id, url, "refusing to create a surface for a special page");
                return false;
            }
        }

        let handle = match self
            .backend
            .create_surface(tab_id, &tab_id.partition(), self.signals.clone())
            .await
        {
            Ok(handle) => handle,
            Err(error) => {
                warn!(%tab_id, %error, "surface construction failed");
                return false;
            }
        };

        let mut surface = Surface {
            handle,
            phase: SurfacePhase::Detached,
            url: String::new(),
            title: String::new(),
            is_loading: false,
            generation: 0,
        };
        if self.active == Some(tab_id) {
            self.backend.attach(handle, self.bounds);
            surface.phase = SurfacePhase::Attached;
        }
        self.surfaces.insert(tab_id, surface);
        info!(%tab_id, "surface created");

        if let Some(url) = url {
            self.load_with_placeholder(tab_id, url).await;
        }
        true
    }

    async fn load_with_placeholder(&mut self, tab_id: TabId, url: &str) {
        let Some((handle, generation)) = self.begin_navigation(tab_id) else {
            return;
        };
        match self.backend.load(handle, url, generation).await {
            Ok(committed) => self.commit(tab_id, generation, committed),
            Err(error) => {
                warn!(%tab_id, url, %error, "load failed, showing error page");
                let placeholder = error_page_url(error.code());
                if let Err(error) = self.backend.load(handle, &placeholder, generation).await {
                    warn!(%tab_id, %error, "error page failed to render");
                }
                if let Some(surface) = self.surfaces.get_mut(&tab_id) {
                    surface.url = url.to_owned();
                    surface.title = ERROR_PAGE_TITLE.to_owned();
                    surface.is_loading = false;
                }
                self.notifications.publish(Notification::TitleUpdated {
                    tab_id,
                    title: ERROR_PAGE_TITLE.to_owned(),
                });
            }
        }
    }

    /// Starts a new navigation generation; signals from older generations
    /// are ignored from here on.
    fn begin_navigation(&mut self, tab_id: TabId) -> Option<(SurfaceHandle, u64)> {
        let surface = self.surfaces.get_mut(&tab_id)?;
        surface.generation += 1;
        surface.is_loading = true;
        Some((surface.handle, surface.generation))
    }

    fn commit(&mut self, tab_id: TabId, generation: u64, committed: String) {
        if let Some(surface) = self.surfaces.get_mut(&tab_id) {
            if surface.generation == generation {
                surface.url = committed;
                surface.is_loading = false;
            }
        }
    }

    /// Detaches everything, then attaches only `tab_id`. A tab without a
    /// surface leaves the window empty and reports `false`; it stays the
    /// active tab, so the surface it gets later is attached on creation.
    pub fn activate(&mut self, tab_id: TabId) -> bool {
        for surface in self.surfaces.values_mut() {
            if surface.phase == SurfacePhase::Attached {
                self.backend.detach(surface.handle);
                surface.phase = SurfacePhase::Detached;
            }
        }

        self.active = Some(tab_id);
        match self.surfaces.get_mut(&tab_id) {
            Some(surface) => {
                self.backend.attach(surface.handle, self.bounds);
                surface.phase = SurfacePhase::Attached;
                true
            }
            None => {
                debug!(%tab_id, "no surface to activate");
                false
            }
        }
    }

    /// Loads `url` into the tab's surface and returns the committed url, or
    /// `None` if the load failed. A tab without a surface gets one as in
    /// [`Self::create_or_focus`]; a failed first load there still answers
    /// with `url`, since the surface exists and shows the error page.
    pub async fn navigate(&mut self, tab_id: TabId, url: &str) -> Option<String> {
        if !self.surfaces.contains_key(&tab_id) {
            if !self.create_or_focus(tab_id, Some(url)).await {
                return None;
            }
            return self.surfaces.get(&tab_id).map(|surface| surface.url.clone());
        }
        if Destination::parse(url).is_special() {
            warn!(%tab_id, url, "refusing to load a special page into a surface");
            return None;
        }

        let (handle, generation) = self.begin_navigation(tab_id)?;
        match self.backend.load(handle, url, generation).await {
            Ok(committed) => {
                self.commit(tab_id, generation, committed.clone());
                Some(committed)
            }
            Err(error) => {
                warn!(%tab_id, url, %error, "navigation failed");
                if let Some(surface) = self.surfaces.get_mut(&tab_id) {
                    surface.is_loading = false;
                }
                None
            }
        }
    }

    pub fn close(&mut self, tab_id: TabId) -> bool {
        let Some(surface) = self.surfaces.remove(&tab_id) else {
            return false;
        };
        if surface.phase == SurfacePhase::Attached {
            self.backend.detach(surface.handle);
        }
        self.backend.destroy(surface.handle);
        if self.active == Some(tab_id) {
            self.active = None;
        }
        info!(%tab_id, "surface closed");
        true
    }

    pub fn back(&mut self, tab_id: TabId) -> bool {
        let Some(surface) = self.surfaces.get(&tab_id) else {
            return false;
        };
        if !self.backend.can_go_back(surface.handle) {
            return false;
        }
        match self.begin_navigation(tab_id) {
            Some((handle, generation)) => self.backend.go_back(handle, generation),
            None => false,
        }
    }

    pub fn forward(&mut self, tab_id: TabId) -> bool {
        let Some(surface) = self.surfaces.get(&tab_id) else {
            return false;
        };
        if !self.backend.can_go_forward(surface.handle) {
            return false;
        }
        match self.begin_navigation(tab_id) {
            Some((handle, generation)) => self.backend.go_forward(handle, generation),
            None => false,
        }
    }

    pub fn reload(&mut self, tab_id: TabId) -> bool {
        match self.begin_navigation(tab_id) {
            Some((handle, generation)) => self.backend.reload(handle, generation),
            None => false,
        }
    }

    pub fn query_state(&self, tab_id: TabId) -> Option<TabInfo> {
        let surface = self.surfaces.get(&tab_id)?;
        Some(TabInfo {
            url: surface.url.clone(),
            title: surface.title.clone(),
            can_go_back: self.backend.can_go_back(surface.handle),
            can_go_forward: self.backend.can_go_forward(surface.handle),
            is_loading: surface.is_loading,
        })
    }

    /// Clears every requested category in every live partition. Every
    /// clear runs to completion; the result is `false` if any failed.
    pub async fn clear_data(&self, options: ClearDataOptions) -> bool {
        let categories = options.categories();
        let jobs: Vec<(String, _)> = self
            .surfaces
            .keys()
            .flat_map(|tab_id| {
                categories
                    .iter()
                    .map(move |category| (tab_id.partition(), *category))
            })
            .collect();

        let results = join_all(
            jobs.iter()
                .map(|(partition, category)| self.backend.clear_partition(partition, *category)),
        )
        .await;

        let mut ok = true;
        for result in results {
            if let Err(error) = result {
                warn!(%error, "clearing browsing data failed for one partition");
                ok = false;
            }
        }
        ok
    }

    pub async fn open_external(&mut self, url: &str) -> bool {
        match self.backend.open_external(url).await {
            Ok(()) => true,
            Err(error) => {
                warn!(url, %error, "open external failed");
                false
            }
        }
    }

    /// Closes every live surface.
    pub fn shutdown(&mut self) -> usize {
        let tab_ids: Vec<TabId> = self.surfaces.keys().copied().collect();
        for tab_id in &tab_ids {
            self.close(*tab_id);
        }
        tab_ids.len()
    }

    /// Mirrors a surface event into the shadow fields and forwards it to the
    /// interface. Events for closed surfaces or superseded navigations are
    /// dropped.
    pub fn handle_signal(&mut self, signal: SurfaceSignal) {
        let SurfaceSignal {
            tab_id,
            generation,
            event,
        } = signal;

        if let SurfaceEvent::PopupRequested(url) = event {
            debug!(%tab_id, %url, "popup denied, requesting a tab instead");
            self.notifications
                .publish(Notification::NewTabRequested { url });
            return;
        }
        if let SurfaceEvent::Download { phase, payload } = event {
            self.notifications.publish(match phase {
                DownloadPhase::Started => Notification::DownloadStarted(payload),
                DownloadPhase::Progressing => Notification::DownloadUpdated(payload),
                DownloadPhase::Done => Notification::DownloadDone(payload),
            });
            return;
        }

        let Some(surface) = self.surfaces.get_mut(&tab_id) else {
            debug!(%tab_id, "signal for closed surface dropped");
            return;
        };
        if generation < surface.generation {
            debug!(%tab_id, generation, current = surface.generation, "stale signal dropped");
            return;
        }

        match event {
            SurfaceEvent::LoadStarted => {
                surface.is_loading = true;
                self.notifications.publish(Notification::Loading {
                    tab_id,
                    is_loading: true,
                });
            }
            SurfaceEvent::LoadStopped { url } => {
                surface.is_loading = false;
                self.notifications.publish(Notification::Loading {
                    tab_id,
                    is_loading: false,
                });
                if !is_error_page(&url) {
                    surface.url = url.clone();
                    self.notifications
                        .publish(Notification::UrlUpdated { tab_id, url });
                }
            }
            SurfaceEvent::LoadFailed { code, description } => {
                warn!(%tab_id, code, %description, "page failed to load");
                surface.is_loading = false;
                self.notifications.publish(Notification::Loading {
                    tab_id,
                    is_loading: false,
                });
            }
            SurfaceEvent::TitleChanged(title) => {
                surface.title = title.clone();
                self.notifications
                    .publish(Notification::TitleUpdated { tab_id, title });
            }
            SurfaceEvent::FaviconChanged(favicon) => {
                self.notifications
                    .publish(Notification::FaviconUpdated { tab_id, favicon });
            }
            SurfaceEvent::WillNavigate(url) => {
                self.notifications
                    .publish(Notification::WillNavigate { tab_id, url });
            }
            SurfaceEvent::PopupRequested(_) | SurfaceEvent::Download { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use lantern_core::{ClearDataOptions, Notification, TabId, ERROR_PAGE_TITLE};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::ViewManager;
    use crate::bridge::{self, Subscription};
    use crate::host::{BackendCall, Bounds, RecordingBackend, SurfaceEvent, SurfaceSignal};

    const BOUNDS: Bounds = Bounds {
        x: 0,
        y: 90,
        width: 1200,
        height: 710,
    };

    struct Fixture {
        views: ViewManager<RecordingBackend>,
        backend: RecordingBackend,
        signals: UnboundedReceiver<SurfaceSignal>,
        subscription: Subscription,
    }

    fn fixture() -> Fixture {
        let backend = RecordingBackend::default();
        let (_client, subscription, endpoint) = bridge::connect();
        let (views, signals) = ViewManager::new(backend.clone(), endpoint.notifications(), BOUNDS);
        Fixture {
            views,
            backend,
            signals,
            subscription,
        }
    }

    impl Fixture {
        fn pump(&mut self) -> Vec<Notification> {
            while let Ok(signal) = self.signals.try_recv() {
                self.views.handle_signal(signal);
            }
            let mut out = Vec::new();
            while let Some(notification) = self.subscription.try_next() {
                out.push(notification);
            }
            out
        }
    }

    #[tokio::test]
    async fn create_twice_yields_one_surface() {
        let mut fx = fixture();
        assert!(fx.views.create_or_focus(TabId(1), Some("https://a.example")).await);
        assert!(fx.views.create_or_focus(TabId(1), Some("https://a.example")).await);

        assert_eq!(fx.views.surface_count(), 1);
        let created = fx
            .backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Created { .. }))
            .count();
        assert_eq!(created, 1);
        assert_eq!(fx.views.attached(), vec![TabId(1)]);
    }

    #[tokio::test]
    async fn new_surface_stays_detached_until_activated() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.views.activate(TabId(1));
        fx.views.create_or_focus(TabId(2), Some("https://b.example")).await;

        assert_eq!(fx.views.attached(), vec![TabId(1)]);
        assert!(fx.views.activate(TabId(2)));
        assert_eq!(fx.views.attached(), vec![TabId(2)]);
        assert!(fx.backend.calls().contains(&BackendCall::Attached {
            tab_id: TabId(2),
            bounds: BOUNDS,
        }));
    }

    #[tokio::test]
    async fn activating_tab_without_surface_detaches_all() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.views.activate(TabId(1));

        assert!(!fx.views.activate(TabId(7)));
        assert!(fx.views.attached().is_empty());
        assert_eq!(fx.views.active(), Some(TabId(7)));
    }

    #[tokio::test]
    async fn surface_created_for_the_active_tab_is_attached() {
        let mut fx = fixture();
        fx.views.activate(TabId(1));

        assert_eq!(
            fx.views.navigate(TabId(1), "https://github.com").await,
            Some("https://github.com".to_owned())
        );
        assert_eq!(fx.views.attached(), vec![TabId(1)]);
        assert!(fx.backend.calls().contains(&BackendCall::Attached {
            tab_id: TabId(1),
            bounds: BOUNDS,
        }));
    }

    #[tokio::test]
    async fn construction_failure_leaves_no_entry() {
        let mut fx = fixture();
        fx.backend.fail_create_for(TabId(3));

        assert!(!fx.views.create_or_focus(TabId(3), Some("https://a.example")).await);
        assert!(!fx.views.has_surface(TabId(3)));
        assert_eq!(fx.views.navigate(TabId(3), "https://a.example").await, None);
    }

    #[tokio::test]
    async fn special_pages_never_get_surfaces() {
        let mut fx = fixture();
        assert!(!fx.views.create_or_focus(TabId(1), Some("about:newtab")).await);
        assert_eq!(fx.views.surface_count(), 0);
    }

    #[tokio::test]
    async fn load_failure_keeps_surface_with_error_title() {
        let mut fx = fixture();
        fx.backend.fail_load_for("https://down.example");

        assert!(fx.views.create_or_focus(TabId(4), Some("https://down.example")).await);
        assert!(fx.views.has_surface(TabId(4)));

        let notifications = fx.pump();
        assert!(notifications.contains(&Notification::TitleUpdated {
            tab_id: TabId(4),
            title: ERROR_PAGE_TITLE.to_owned(),
        }));
        assert!(!notifications
            .iter()
            .any(|n| matches!(n, Notification::UrlUpdated { .. })));
        let info = fx.views.query_state(TabId(4)).expect("surface exists");
        assert_eq!(info.title, ERROR_PAGE_TITLE);
        assert!(!info.is_loading);
    }

    #[tokio::test]
    async fn navigate_failure_keeps_surface() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.backend.fail_load_for("https://down.example");

        assert_eq!(fx.views.navigate(TabId(1), "https://down.example").await, None);
        assert!(fx.views.has_surface(TabId(1)));
        assert_eq!(
            fx.views.navigate(TabId(1), "https://b.example").await,
            Some("https://b.example".to_owned())
        );
    }

    #[tokio::test]
    async fn first_navigate_keeps_surface_showing_error_page() {
        let mut fx = fixture();
        fx.backend.fail_load_for("https://down.example");

        assert_eq!(
            fx.views.navigate(TabId(5), "https://down.example").await,
            Some("https://down.example".to_owned())
        );
        assert!(fx.views.has_surface(TabId(5)));
        assert!(fx.pump().contains(&Notification::TitleUpdated {
            tab_id: TabId(5),
            title: ERROR_PAGE_TITLE.to_owned(),
        }));
        let info = fx.views.query_state(TabId(5)).expect("surface exists");
        assert_eq!(info.title, ERROR_PAGE_TITLE);
        assert!(!info.is_loading);
    }

    #[tokio::test]
    async fn last_initiated_navigation_wins() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), None).await;
        fx.views.navigate(TabId(1), "https://first.example").await;
        fx.views.navigate(TabId(1), "https://second.example").await;

        let urls: Vec<String> = fx
            .pump()
            .into_iter()
            .filter_map(|n| match n {
                Notification::UrlUpdated { url, .. } => Some(url),
                _ => None,
            })
            .collect();
        assert_eq!(urls, vec!["https://second.example".to_owned()]);
        let info = fx.views.query_state(TabId(1)).expect("surface exists");
        assert_eq!(info.url, "https://second.example");
        assert!(info.can_go_back);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drops_late_signals() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.views.activate(TabId(1));

        assert!(fx.views.close(TabId(1)));
        assert!(!fx.views.close(TabId(1)));
        assert_eq!(fx.views.active(), None);
        assert!(fx.backend.live_surfaces().is_empty());
        assert!(fx.pump().is_empty(), "signals of a closed surface are dropped");
    }

    #[tokio::test]
    async fn back_forward_require_history() {
        let mut fx = fixture();
        assert!(!fx.views.back(TabId(9)));
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        assert!(!fx.views.back(TabId(1)));
        fx.views.navigate(TabId(1), "https://b.example").await;

        assert!(fx.views.back(TabId(1)));
        assert!(fx.views.forward(TabId(1)));
        assert!(!fx.views.forward(TabId(1)));
        assert!(fx.views.reload(TabId(1)));
        assert!(!fx.views.reload(TabId(2)));
    }

    #[tokio::test]
    async fn clear_data_tolerates_partial_failure() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.views.create_or_focus(TabId(2), Some("https://b.example")).await;
        fx.backend.fail_clear_for("persist:tab-1");

        assert!(!fx.views.clear_data(ClearDataOptions::all()).await);
        let cleared = fx
            .backend
            .calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    BackendCall::Cleared { partition, .. } if partition == "persist:tab-2"
                )
            })
            .count();
        assert_eq!(cleared, 4, "the healthy partition is fully cleared");
    }

    #[tokio::test]
    async fn popups_become_new_tab_requests() {
        let mut fx = fixture();
        fx.views.create_or_focus(TabId(1), Some("https://a.example")).await;
        fx.pump();
        fx.backend.simulate(
            TabId(1),
            1,
            SurfaceEvent::PopupRequested("https://popup.example".to_owned()),
        );

        assert_eq!(
            fx.pump(),
            vec![Notification::NewTabRequested {
                url: "https://popup.example".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn shutdown_closes_every_surface() {
        let mut fx = fixture();
        for id in 1..=3 {
            fx.views
                .create_or_focus(TabId(id), Some("https://a.example"))
                .await;
        }
        assert_eq!(fx.views.shutdown(), 3);
        assert_eq!(fx.views.surface_count(), 0);
        assert!(fx.backend.live_surfaces().is_empty());
    }
}
