//! HTTP transport for load runs: a pooled hyper client, prepared requests and wire-size
//! estimates used for byte accounting.

#![forbid(unsafe_code)]

mod client;
mod error;
mod estimate;
mod types;
mod util;

pub use client::{HttpClient, PreparedRequest};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use estimate::estimate_http_request_bytes;
pub use types::{HttpRequest, HttpResponse};
