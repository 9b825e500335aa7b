//! Shared utilities for mdcheck.
//!
//! Low-level building blocks used across the workspace: file I/O with
//! line-ending guarantees, path safety checks, front-matter splitting,
//! diff generation, id generation, and tracing setup.

pub mod diff;
pub mod frontmatter;
pub mod fs;
pub mod ids;
pub mod logging;
pub mod paths;
