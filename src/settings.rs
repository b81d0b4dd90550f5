//! Runtime settings that outlive the process.

pub mod toggle;

pub use toggle::{PersistedToggle, STATE_FILE_NAME};
