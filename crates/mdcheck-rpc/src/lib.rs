//! JSON-RPC 2.0 plumbing: the method registry, the dispatcher, and the
//! typed error taxonomy with its code mapping.

mod dispatcher;
mod error;
pub mod params;
mod registry;

pub use dispatcher::{Dispatcher, error_response, parse_error_response};
pub use error::{RpcError, codes};
pub use registry::{Handler, HandlerResult, MethodRegistry};
