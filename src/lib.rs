//! findstream - streaming find/replace search client.
//!
//! Sends a search to a content-management server, decodes the server-sent
//! event stream it answers with, and forwards events as they arrive. Results
//! too large for interactive display are fetched through the CSV export.
//!
//! # Modules
//!
//! - [`client`] - `SearchStreamClient`: streaming search and CSV export
//! - [`stream`] - One search session: cancellation, timeout, state
//! - [`sse`] - Incremental frame decoder
//! - [`protocol`] - Request and event types
//! - [`form`] - Building requests from form input
//! - [`error`] - Failure taxonomy
//! - [`results`] - Accumulated display state
//! - [`config`] - Configuration loading
//! - [`render`] - Terminal output

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod form;
pub mod protocol;
pub mod render;
pub mod results;
pub mod sse;
pub mod stream;

pub use client::{ClientSettings, CsvExport, SearchStreamClient};
pub use error::{ErrorKind, RequestError, SearchError};
pub use form::{build_export_request, build_search_request, ContextType, CriteriaForm, ScopeForm};
pub use protocol::{SearchContext, SearchCriteria, SearchRequest, StreamEvent};
pub use results::{SearchResults, SearchStatus};
pub use stream::{SearchStream, SessionState};
