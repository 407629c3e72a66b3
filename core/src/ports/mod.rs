// Capability Ports
// Narrow interfaces to the model, document index, database and stores

pub mod artifacts;
pub mod generation;
pub mod retrieval;
pub mod runs;
pub mod sql;
pub mod traces;

pub use artifacts::{ArtifactError, ArtifactKind, ArtifactStore, ArtifactVersion, FsArtifactStore};
pub use generation::{
  GenerationError, GeneratorFactory, PromptMessage, PromptRole, TextGenerator, TokenCallback,
};
pub use retrieval::{Document, DocumentRetriever, RetrievalError};
pub use runs::{InMemoryRunRegistry, RunRegistry};
pub use sql::{QueryRows, SqlDatabase, SqlError, TableInfo};
pub use traces::{FeedbackRecord, InMemoryTraceStore, RunOutcome, RunTrace, TraceError, TraceStore};
