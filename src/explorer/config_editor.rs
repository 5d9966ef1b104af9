//! Field-by-field editor over the active project configuration.

use crate::config::{ConfigError, ProjectConfig};
use crate::session::ConsoleSession;

/// Message shown in place of the form when no configuration is active.
pub const NO_CONFIG_MESSAGE: &str = "No configuration loaded";

/// A working copy of the session's configuration. Edits stay local until
/// [`ConfigEditor::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEditor {
    draft: ProjectConfig,
}

impl ConfigEditor {
    /// `None` when the session has no configuration yet.
    pub fn load(session: &ConsoleSession) -> Option<Self> {
        session.config().map(|draft| Self { draft })
    }

    pub fn fields(&self) -> Vec<(&str, String)> {
        self.draft.entries()
    }

    pub fn set_field(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        self.draft.set_field(key, value)
    }

    pub fn draft(&self) -> &ProjectConfig {
        &self.draft
    }

    /// Replaces the session's configuration with the edited copy.
    ///
    /// An already established connection keeps running against the old
    /// project.
    pub fn save(&self, session: &ConsoleSession) {
        session.update_config(self.draft.clone());
    }
}
