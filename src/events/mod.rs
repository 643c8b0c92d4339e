//! # Event System
//!
//! Broadcast-based application event publishing. The orchestration core
//! pushes error-prompt and recalculation-retrigger events here; the host UI
//! subscribes and reacts.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};
