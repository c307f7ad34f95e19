//! Small shared utilities

mod deferred;

pub use deferred::*;

/// Uppercase the first character of a string, leaving the rest untouched.
/// Used when turning entry labels into user-visible messages.
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
