//! Service layer for devjournal.
//!
//! Contains business logic and external service integrations:
//! - Linear (GraphQL client)
//! - Notes (REST client)
//! - Documents (companion service client)
//! - Summary (summary generator gateway over the LLM crate)
//! - Reconcile (cache reconciliation engine)
//! - Sync (one pass per integration)
//! - KnowledgeIndex (bounded multi-source context for the oracle)
//! - Citations (answer to source cross-referencing)
//! - Oracle (question answering)

pub mod citations;
mod documents;
pub mod knowledge_index;
mod linear;
mod notes;
mod oracle;
pub mod reconcile;
mod summary;
mod sync;

pub use citations::CitationExtractor;
pub use documents::DocumentsClient;
pub use knowledge_index::{render_index, KnowledgeIndexBuilder};
pub use linear::{LinearClient, LinearClientConfig};
pub use notes::{NotesClient, NotesClientConfig};
pub use oracle::OracleService;
pub use reconcile::{PassOutcome, Reconciler, SummaryMode};
pub use summary::{LlmSummaryGenerator, SummaryGenerator};
pub use sync::{LinearSyncOptions, NotesSyncOptions, SyncService, LINEAR_SOURCE, NOTES_SOURCE};
