//! Output formatting for CLI.

mod json;
mod text;

pub use json::{CheckOutput, FetchOutput, JsonFormatter, StatusOutput};
pub use text::TextFormatter;
