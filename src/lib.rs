//! Lexfold serves dictionary definitions as enriched HTML fragments.
//!
//! A lookup backend maps words to raw definition markup; the enrichment
//! pass rewrites that markup (abbreviations, fold affordances, bilingual
//! layers, cross-reference merging) before it is delivered, and the
//! widget layer models the interactive surfaces as explicit state
//! transitions over the same tree.

pub mod abbrev;
pub mod config;
pub mod dom;
pub mod enrich;
pub mod source;
pub mod theme;
pub mod translate;
#[cfg(feature = "web")]
pub mod web;
pub mod widgets;

pub use config::{ConfigKey, ConfigStore, FileStore, MemoryStore, Options};
pub use dom::{Fragment, NodeId, Selector};
pub use enrich::Enricher;
pub use source::{DefinitionSource, Entry, MemorySource, SourceError, SqliteSource, validate_query};
pub use theme::{HostKind, HostProbe, Theme};
pub use translate::{Credentials, TranslationHandle, Translator};
pub use widgets::FoldController;
