use crate::destination::Destination;
use crate::document::ExportDocument;
use crate::effect::Transition;
use crate::intent::Intent;
use crate::reducer::{apply_intent, ModelDefaults, ReduceError};
use crate::resolve::resolve;
use crate::search::SearchEngine;
use crate::state::BrowserState;

/// Owns the browsing model and its revision counter. A failed dispatch
/// leaves the state untouched.
pub struct Engine {
    state: BrowserState,
    defaults: ModelDefaults,
    revision: u64,
}

impl Engine {
    pub fn new(defaults: ModelDefaults) -> Self {
        Self {
            state: BrowserState::with_settings(defaults.settings.clone()),
            defaults,
            revision: 0,
        }
    }

    pub fn with_state(defaults: ModelDefaults, state: BrowserState, revision: u64) -> Self {
        Self {
            state,
            defaults,
            revision,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> &BrowserState {
        &self.state
    }

    pub fn defaults(&self) -> &ModelDefaults {
        &self.defaults
    }

    pub fn search_engine(&self) -> &'static SearchEngine {
        SearchEngine::find_or_default(&self.state.search_engine_id)
    }

    pub fn resolve(&self, input: &str) -> Destination {
        resolve(input, &self.defaults.home, self.search_engine())
    }

    pub fn dispatch(&mut self, intent: Intent) -> Result<Transition, ReduceError> {
        let from_revision = self.revision;
        let before = self.state.clone();
        let effects = apply_intent(&mut self.state, &self.defaults, intent)?;

        let to_revision = if effects.is_empty() && self.state == before {
            from_revision
        } else {
            from_revision + 1
        };
        self.revision = to_revision;

        Ok(Transition {
            effects,
            from_revision,
            to_revision,
        })
    }

    pub fn export_document(&self) -> ExportDocument {
        ExportDocument::from_state(&self.state)
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        self.export_document().to_json_pretty()
    }
}
