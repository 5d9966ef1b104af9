//! Console panels: the state behind each view of the admin console, bound to
//! a shared [`ConsoleSession`](crate::session::ConsoleSession).

pub mod auth_form;
pub mod bookmarks;
pub mod config_editor;
pub mod firestore_panel;
pub mod query_builder;
pub mod storage_panel;

pub use auth_form::AuthForm;
pub use bookmarks::{CollectionBookmarks, FileStore, KeyValueStore, MemoryStore};
pub use config_editor::ConfigEditor;
pub use firestore_panel::{ExecutionOutcome, QueryError, QueryPanel};
pub use query_builder::{QueryBuilder, QueryCondition, QueryOrder};
pub use storage_panel::{BrowseError, StorageBrowser, StorageItem};
