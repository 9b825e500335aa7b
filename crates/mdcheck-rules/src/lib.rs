//! Family rule documents and family detection.
//!
//! A *family* names the rule set a document is validated against (e.g.
//! "words", "code"). Rule documents live on disk as `<family>.json`; the
//! manager caches parsed documents and merges per-family non-editable
//! fields with a global set.

mod family;
mod manager;

pub use family::FamilyDetector;
pub use manager::{FamilyRules, RuleManager, ValidationRequirements};
