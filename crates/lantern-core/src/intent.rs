use crate::destination::Destination;
use crate::document::ExportDocument;
use crate::ids::{BookmarkId, HistoryId, TabId};
use crate::protocol::DownloadPayload;
use crate::state::{DownloadPhase, NewBookmark, SettingsPatch, TabPatch};

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    NewTab {
        destination: Option<Destination>,
    },
    CloseTab {
        tab_id: TabId,
    },
    ActivateTab {
        tab_id: TabId,
    },
    /// `tab_id: None` opens the destination in a new tab.
    Navigate {
        tab_id: Option<TabId>,
        destination: Destination,
    },
    UpdateTab {
        tab_id: TabId,
        patch: TabPatch,
    },
    PinTab {
        tab_id: TabId,
        pinned: bool,
    },
    GoBack,
    GoForward,
    Refresh,
    ObserveTabTitle {
        tab_id: TabId,
        title: String,
    },
    ObserveTabFavicon {
        tab_id: TabId,
        favicon: String,
    },
    ObserveTabUrl {
        tab_id: TabId,
        url: String,
    },
    ObserveTabLoading {
        tab_id: TabId,
        is_loading: bool,
    },
    ObserveNewTabRequested {
        url: String,
    },
    ObserveDownload {
        phase: DownloadPhase,
        payload: DownloadPayload,
    },
    /// The host could not construct a surface for this tab.
    SurfaceFailed {
        tab_id: TabId,
    },
    AddBookmark(NewBookmark),
    RemoveBookmark {
        bookmark_id: BookmarkId,
    },
    ClearHistory,
    RemoveHistoryItem {
        history_id: HistoryId,
    },
    UpdateSettings(SettingsPatch),
    SetSearchEngine {
        engine_id: String,
    },
    Import(ExportDocument),
    ClearAll,
}
