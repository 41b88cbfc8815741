//! Seam between the view lifecycle manager and an embedded rendering engine.
//!
//! A backend owns the engine-level surfaces. It reports what happens inside
//! a surface through [`SurfaceSignal`]s tagged with the navigation generation
//! that caused them, so the manager can drop events from superseded loads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use lantern_core::destination::favicon_for;
use lantern_core::{DataCategory, DownloadPayload, DownloadPhase, TabId};
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use url::Url;

pub const ERROR_PAGE_PREFIX: &str = "data:text/html;charset=utf-8,";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceHandle(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    LoadStarted,
    LoadStopped { url: String },
    LoadFailed { code: i32, description: String },
    TitleChanged(String),
    FaviconChanged(String),
    WillNavigate(String),
    /// Popups are always denied at the surface and reopened as tabs.
    PopupRequested(String),
    Download {
        phase: DownloadPhase,
        payload: DownloadPayload,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSignal {
    pub tab_id: TabId,
    pub generation: u64,
    pub event: SurfaceEvent,
}

pub type SignalSender = UnboundedSender<SurfaceSignal>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface for {tab_id} could not be constructed: {reason}")]
    Construct { tab_id: TabId, reason: String },
    #[error("{url} failed to load ({code})")]
    Load { url: String, code: String },
    #[error("surface {0:?} is gone")]
    Gone(SurfaceHandle),
    #[error("clearing {category:?} in {partition} failed: {reason}")]
    Clear {
        partition: String,
        category: DataCategory,
        reason: String,
    },
    #[error("no external handler for {0}")]
    External(String),
}

impl SurfaceError {
    pub fn code(&self) -> &str {
        match self {
            Self::Load { code, .. } => code,
            _ => "Unknown error",
        }
    }
}

#[async_trait(?Send)]
pub trait RenderBackend {
    /// Allocates a detached surface bound to its own storage partition.
    async fn create_surface(
        &mut self,
        tab_id: TabId,
        partition: &str,
        signals: SignalSender,
    ) -> Result<SurfaceHandle, SurfaceError>;

    /// Resolves once the load settles, with the committed url.
    async fn load(
        &mut self,
        surface: SurfaceHandle,
        url: &str,
        generation: u64,
    ) -> Result<String, SurfaceError>;

    fn attach(&mut self, surface: SurfaceHandle, bounds: Bounds);

    fn detach(&mut self, surface: SurfaceHandle);

    fn destroy(&mut self, surface: SurfaceHandle);

    fn can_go_back(&self, surface: SurfaceHandle) -> bool;

    fn can_go_forward(&self, surface: SurfaceHandle) -> bool;

    fn go_back(&mut self, surface: SurfaceHandle, generation: u64) -> bool;

    fn go_forward(&mut self, surface: SurfaceHandle, generation: u64) -> bool;

    fn reload(&mut self, surface: SurfaceHandle, generation: u64) -> bool;

    async fn clear_partition(
        &self,
        partition: &str,
        category: DataCategory,
    ) -> Result<(), SurfaceError>;

    async fn open_external(&mut self, url: &str) -> Result<(), SurfaceError>;
}

/// Locally rendered page shown inside a surface whose load failed.
pub fn error_page_url(code: &str) -> String {
    let html = format!(
        "<html><head><title>Error loading page</title></head>\
         <body><div class=\"container\"><h1>Error loading page</h1>\
         <p>The page could not be loaded. This might be due to network issues or content filtering.</p>\
         <p class=\"error-code\">Error: {code}</p></div></body></html>"
    );
    format!("{ERROR_PAGE_PREFIX}{}", utf8_percent_encode(&html, NON_ALPHANUMERIC))
}

pub fn is_error_page(url: &str) -> bool {
    url.starts_with(ERROR_PAGE_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Created { tab_id: TabId, partition: String },
    Loaded { tab_id: TabId, url: String },
    Attached { tab_id: TabId, bounds: Bounds },
    Detached { tab_id: TabId },
    Destroyed { tab_id: TabId },
    Back { tab_id: TabId },
    Forward { tab_id: TabId },
    Reloaded { tab_id: TabId },
    Cleared { partition: String, category: DataCategory },
    OpenedExternal { url: String },
}

#[derive(Debug)]
struct SimSurface {
    tab_id: TabId,
    signals: SignalSender,
    stack: Vec<String>,
    cursor: usize,
}

impl SimSurface {
    fn current(&self) -> Option<&str> {
        self.stack.get(self.cursor).map(String::as_str)
    }

    fn emit(&self, generation: u64, event: SurfaceEvent) {
        let _ = self.signals.send(SurfaceSignal {
            tab_id: self.tab_id,
            generation,
            event,
        });
    }

    fn settle(&self, generation: u64, url: &str) {
        self.emit(generation, SurfaceEvent::LoadStarted);
        if !is_error_page(url) {
            self.emit(generation, SurfaceEvent::TitleChanged(page_title(url)));
            let favicon = favicon_for(url);
            if !favicon.is_empty() {
                self.emit(generation, SurfaceEvent::FaviconChanged(favicon));
            }
        }
        self.emit(
            generation,
            SurfaceEvent::LoadStopped {
                url: url.to_owned(),
            },
        );
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    next_handle: u64,
    surfaces: BTreeMap<SurfaceHandle, SimSurface>,
    calls: Vec<BackendCall>,
    fail_create: BTreeSet<TabId>,
    fail_load: BTreeSet<String>,
    fail_clear: BTreeSet<String>,
}

/// Headless backend that simulates page loads and records every call.
/// Clones share state, so a test can keep one to steer and inspect it.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    shared: Arc<Mutex<RecordingState>>,
}

impl RecordingBackend {
    pub fn fail_create_for(&self, tab_id: TabId) {
        self.shared.lock().fail_create.insert(tab_id);
    }

    pub fn fail_load_for(&self, url: &str) {
        self.shared.lock().fail_load.insert(url.to_owned());
    }

    pub fn fail_clear_for(&self, partition: &str) {
        self.shared.lock().fail_clear.insert(partition.to_owned());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.shared.lock().calls.clone()
    }

    pub fn live_surfaces(&self) -> Vec<TabId> {
        self.shared
            .lock()
            .surfaces
            .values()
            .map(|surface| surface.tab_id)
            .collect()
    }

    /// Injects an engine event for the surface bound to `tab_id`.
    pub fn simulate(&self, tab_id: TabId, generation: u64, event: SurfaceEvent) -> bool {
        let state = self.shared.lock();
        match state.surfaces.values().find(|surface| surface.tab_id == tab_id) {
            Some(surface) => {
                surface.emit(generation, event);
                true
            }
            None => false,
        }
    }

    fn step(
        &mut self,
        surface: SurfaceHandle,
        generation: u64,
        delta: isize,
        record: fn(TabId) -> BackendCall,
    ) -> bool {
        let mut state = self.shared.lock();
        let Some(sim) = state.surfaces.get_mut(&surface) else {
            return false;
        };
        let Some(target) = sim.cursor.checked_add_signed(delta) else {
            return false;
        };
        if target >= sim.stack.len() {
            return false;
        }
        sim.cursor = target;
        let tab_id = sim.tab_id;
        if let Some(url) = sim.current().map(str::to_owned) {
            sim.settle(generation, &url);
        }
        state.calls.push(record(tab_id));
        true
    }
}

#[async_trait(?Send)]
impl RenderBackend for RecordingBackend {
    async fn create_surface(
        &mut self,
        tab_id: TabId,
        partition: &str,
        signals: SignalSender,
    ) -> Result<SurfaceHandle, SurfaceError> {
        let mut state = self.shared.lock();
        if state.fail_create.contains(&tab_id) {
            return Err(SurfaceError::Construct {
                tab_id,
                reason: "renderer process unavailable".to_owned(),
            });
        }
        state.next_handle += 1;
        let handle = SurfaceHandle(state.next_handle);
        state.surfaces.insert(
            handle,
            SimSurface {
                tab_id,
                signals,
                stack: Vec::new(),
                cursor: 0,
            },
        );
        state.calls.push(BackendCall::Created {
            tab_id,
            partition: partition.to_owned(),
        });
        Ok(handle)
    }

    async fn load(
        &mut self,
        surface: SurfaceHandle,
        url: &str,
        generation: u64,
    ) -> Result<String, SurfaceError> {
        let mut state = self.shared.lock();
        let failing = state.fail_load.contains(url);
        let sim = state
            .surfaces
            .get_mut(&surface)
            .ok_or(SurfaceError::Gone(surface))?;
        let tab_id = sim.tab_id;

        if failing {
            sim.emit(generation, SurfaceEvent::LoadStarted);
            sim.emit(
                generation,
                SurfaceEvent::LoadFailed {
                    code: -105,
                    description: "ERR_NAME_NOT_RESOLVED".to_owned(),
                },
            );
            return Err(SurfaceError::Load {
                url: url.to_owned(),
                code: "ERR_NAME_NOT_RESOLVED".to_owned(),
            });
        }

        if !sim.stack.is_empty() {
            sim.stack.truncate(sim.cursor + 1);
        }
        sim.stack.push(url.to_owned());
        sim.cursor = sim.stack.len() - 1;
        sim.settle(generation, url);
        state.calls.push(BackendCall::Loaded {
            tab_id,
            url: url.to_owned(),
        });
        Ok(url.to_owned())
    }

    fn attach(&mut self, surface: SurfaceHandle, bounds: Bounds) {
        let mut state = self.shared.lock();
        if let Some(tab_id) = state.surfaces.get(&surface).map(|sim| sim.tab_id) {
            state.calls.push(BackendCall::Attached { tab_id, bounds });
        }
    }

    fn detach(&mut self, surface: SurfaceHandle) {
        let mut state = self.shared.lock();
        if let Some(tab_id) = state.surfaces.get(&surface).map(|sim| sim.tab_id) {
            state.calls.push(BackendCall::Detached { tab_id });
        }
    }

    fn destroy(&mut self, surface: SurfaceHandle) {
        let mut state = self.shared.lock();
        if let Some(sim) = state.surfaces.remove(&surface) {
            state.calls.push(BackendCall::Destroyed { tab_id: sim.tab_id });
        }
    }

    fn can_go_back(&self, surface: SurfaceHandle) -> bool {
        self.shared
            .lock()
            .surfaces
            .get(&surface)
            .is_some_and(|sim| sim.cursor > 0)
    }

    fn can_go_forward(&self, surface: SurfaceHandle) -> bool {
        self.shared
            .lock()
            .surfaces
            .get(&surface)
            .is_some_and(|sim| sim.cursor + 1 < sim.stack.len())
    }

    fn go_back(&mut self, surface: SurfaceHandle, generation: u64) -> bool {
        self.step(surface, generation, -1, |tab_id| BackendCall::Back { tab_id })
    }

    fn go_forward(&mut self, surface: SurfaceHandle, generation: u64) -> bool {
        self.step(surface, generation, 1, |tab_id| BackendCall::Forward { tab_id })
    }

    fn reload(&mut self, surface: SurfaceHandle, generation: u64) -> bool {
        self.step(surface, generation, 0, |tab_id| BackendCall::Reloaded { tab_id })
    }

    async fn clear_partition(
        &self,
        partition: &str,
        category: DataCategory,
    ) -> Result<(), SurfaceError> {
        let mut state = self.shared.lock();
        if state.fail_clear.contains(partition) {
            return Err(SurfaceError::Clear {
                partition: partition.to_owned(),
                category,
                reason: "partition is locked".to_owned(),
            });
        }
        state.calls.push(BackendCall::Cleared {
            partition: partition.to_owned(),
            category,
        });
        Ok(())
    }

    async fn open_external(&mut self, url: &str) -> Result<(), SurfaceError> {
        if Url::parse(url).is_err() {
            return Err(SurfaceError::External(url.to_owned()));
        }
        debug!(url, "handing url to the system browser");
        self.shared.lock().calls.push(BackendCall::OpenedExternal {
            url: url.to_owned(),
        });
        Ok(())
    }
}

pub type DefaultBackend = RecordingBackend;

fn page_title(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
mod tests {
    use lantern_core::TabId;
    use tokio::sync::mpsc;

    use super::{error_page_url, is_error_page, RecordingBackend, RenderBackend, SurfaceEvent};

    #[test]
    fn error_page_carries_code() {
        let url = error_page_url("ERR_TIMED_OUT");
        assert!(is_error_page(&url));
        assert!(url.contains("ERR_TIMED_OUT"));
        assert!(!url.contains(' '));
    }

    #[tokio::test]
    async fn navigation_stack_tracks_back_and_forward() {
        let mut backend = RecordingBackend::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let surface = backend
            .create_surface(TabId(1), "persist:tab-1", tx)
            .await
            .expect("create");

        backend.load(surface, "https://a.example", 1).await.expect("a");
        backend.load(surface, "https://b.example", 2).await.expect("b");
        assert!(backend.can_go_back(surface));
        assert!(!backend.can_go_forward(surface));

        assert!(backend.go_back(surface, 3));
        assert!(backend.can_go_forward(surface));
        assert!(!backend.go_back(surface, 4));

        let mut last_stop = None;
        while let Ok(signal) = rx.try_recv() {
            if let SurfaceEvent::LoadStopped { url } = signal.event {
                last_stop = Some((signal.generation, url));
            }
        }
        assert_eq!(last_stop, Some((3, "https://a.example".to_owned())));
    }

    #[tokio::test]
    async fn failing_load_reports_error() {
        let mut backend = RecordingBackend::default();
        backend.fail_load_for("https://down.example");
        let (tx, _rx) = mpsc::unbounded_channel();
        let surface = backend
            .create_surface(TabId(2), "persist:tab-2", tx)
            .await
            .expect("create");

        let error = backend
            .load(surface, "https://down.example", 1)
            .await
            .expect_err("load should fail");
        assert_eq!(error.code(), "ERR_NAME_NOT_RESOLVED");
        assert!(!backend.can_go_back(surface));
    }
}
