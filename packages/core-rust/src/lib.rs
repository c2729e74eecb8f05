//! `handle-chain` -- build HTTP endpoints from typed, independently optional stages.
//!
//! ```ignore
//! let create_book = Chain::<Book, EmptyResponse>::new()
//!     .parse(read_book)
//!     .authorize(allow_book_write)
//!     .resolve(insert_book)
//!     .on_success(render_created)
//!     .on_error(render_error)
//!     .monitor(record_metrics)
//!     .audit(audit_log);
//!
//! let app = axum::Router::new().route("/books", post_service(create_book));
//! ```

pub mod chain;
pub mod context;
pub mod types;
pub mod writer;

pub use chain::Chain;
pub use context::RequestContext;
pub use types::{
    BoxError, EmptyRequest, EmptyResponse, ParseFailure, ParsedRequest, SuccessResponse,
};
pub use writer::ResponseWriter;
