//! Small helpers shared by the pipeline and the CLI.
//!
//! - **URL validation**: only anonymous http/https feed URLs are accepted
//! - **Text cleanup**: feed-supplied text is stripped of terminal controls
//!   before it is printed

mod text;
mod url_validator;

pub use text::{single_line, strip_control_chars};
pub use url_validator::{validate_url, UrlValidationError};
