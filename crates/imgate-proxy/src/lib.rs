//! imgate request services
//!
//! [`ProxyStreamer`] serves stored images back through their backend, [`UploadService`] stores
//! new ones and [`DeleteService`] removes them. None of these bind a socket; an HTTP layer maps
//! [`ProxyResponse`] and [`ProxyError::status`] onto its own types.

pub mod delete;
pub mod error;
pub mod path;
pub mod records;
pub mod referer;
pub mod streamer;
pub mod upload;

pub use delete::{DeleteOutcome, DeleteService};
pub use error::{ProxyError, ProxyResult};
pub use path::{normalize_request_path, resolve_object_path};
pub use records::{ImageRecordStore, InMemoryRecordStore};
pub use referer::RefererPolicy;
pub use streamer::{ProxyResponse, ProxyStreamer};
pub use upload::UploadService;
