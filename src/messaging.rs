//! Messaging adapters.

pub mod console;
pub mod traits;

pub use console::ConsoleAdapter;
pub use traits::{InboundStream, Messaging, MessagingDyn};
