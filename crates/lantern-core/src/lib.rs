pub mod destination;
pub mod document;
pub mod effect;
pub mod engine;
pub mod ids;
pub mod intent;
pub mod protocol;
pub mod reducer;
pub mod resolve;
pub mod search;
pub mod state;

pub use destination::{Destination, SpecialPage};
pub use document::{ExportDocument, ImportError, StoreKey};
pub use effect::{HostEffect, Transition};
pub use engine::Engine;
pub use ids::{BookmarkId, HistoryId, TabId};
pub use intent::Intent;
pub use protocol::{
    ClearDataOptions, Command, DataCategory, DownloadPayload, Notification, NotificationKind,
    Response, TabInfo,
};
pub use reducer::{ModelDefaults, ReduceError, ERROR_PAGE_TITLE};
pub use resolve::resolve;
pub use search::{SearchEngine, DEFAULT_SEARCH_ENGINE_ID, SEARCH_ENGINES};
pub use state::{
    Bookmark, BrowserState, DownloadEntry, DownloadPhase, HistoryItem, NewBookmark, Settings,
    SettingsPatch, Tab, TabPatch,
};
