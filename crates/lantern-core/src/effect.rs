use crate::ids::TabId;
use crate::protocol::{ClearDataOptions, Command};

/// Host-side work requested by a model transition. Each effect maps onto
/// exactly one protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEffect {
    CreateOrFocus { tab_id: TabId, url: String },
    Activate { tab_id: TabId },
    Navigate { tab_id: TabId, url: String },
    Close { tab_id: TabId },
    Back { tab_id: TabId },
    Forward { tab_id: TabId },
    Reload { tab_id: TabId },
    ClearData(ClearDataOptions),
}

impl HostEffect {
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::CreateOrFocus { tab_id, .. }
            | Self::Activate { tab_id }
            | Self::Navigate { tab_id, .. }
            | Self::Close { tab_id }
            | Self::Back { tab_id }
            | Self::Forward { tab_id }
            | Self::Reload { tab_id } => Some(*tab_id),
            Self::ClearData(_) => None,
        }
    }

    pub fn to_command(&self) -> Command {
        match self {
            Self::CreateOrFocus { tab_id, url } => Command::CreateTab {
                tab_id: *tab_id,
                url: Some(url.clone()),
            },
            Self::Activate { tab_id } => Command::SetActiveTab { tab_id: *tab_id },
            Self::Navigate { tab_id, url } => Command::NavigateTab {
                tab_id: *tab_id,
                url: url.clone(),
            },
            Self::Close { tab_id } => Command::CloseTab { tab_id: *tab_id },
            Self::Back { tab_id } => Command::GoBack { tab_id: *tab_id },
            Self::Forward { tab_id } => Command::GoForward { tab_id: *tab_id },
            Self::Reload { tab_id } => Command::RefreshTab { tab_id: *tab_id },
            Self::ClearData(options) => Command::ClearBrowsingData { options: *options },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub effects: Vec<HostEffect>,
    pub from_revision: u64,
    pub to_revision: u64,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.to_revision != self.from_revision
    }
}
