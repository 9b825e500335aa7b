//! mdcheck - a content-validation and enhancement server for Markdown
//! documentation.
//!
//! The library assembles a JSON-RPC 2.0 method dispatcher over an
//! ingestion pipeline, an approval/enhancement/recommendation lifecycle,
//! a workflow engine, and a SQLite store. The binary wraps it in a
//! line-delimited stdio transport; richer transports and front-ends sit
//! outside this crate and talk to [`Server::handle`] or the client
//! adapters.

pub mod client;
pub mod config;
pub(crate) mod methods;
pub mod server;

pub use client::{AsyncClient, Client};
pub use config::ServerConfig;
pub use server::Server;

// Re-export the subsystem crates under their domain names.
pub use mdcheck_enhance as enhance;
pub use mdcheck_ingest as ingest;
pub use mdcheck_llm as llm;
pub use mdcheck_prompts as prompts;
pub use mdcheck_recommend as recommend;
pub use mdcheck_rpc as rpc;
pub use mdcheck_rules as rules;
pub use mdcheck_store as store;
pub use mdcheck_utils as utils;
pub use mdcheck_workflow as workflow;
