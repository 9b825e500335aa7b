//! Markdown ingestion and validation pipeline.
//!
//! Walks folders of `.md` files, splits front-matter from body, validates
//! the header against the family's rule document and the body against
//! structural checks, rolls findings up into a severity, and persists
//! validation records. A single file failing never aborts a batch.

mod findings;
mod pipeline;

pub use findings::{Finding, HeaderValue};
pub use pipeline::{Analysis, FileError, FileOutcome, FolderReport, Ingestion, Validation};
