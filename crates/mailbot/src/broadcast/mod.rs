//! Broadcasting of progress events to UIs and other listeners.

pub mod progress;

pub use progress::{ProgressBroadcaster, ProgressEvent, ProgressPhase};
