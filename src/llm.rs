//! Chat-completion endpoint access.

pub mod completion;

pub use completion::{Completer, CompletionClient};
