//! # Boundary Services
//!
//! Collaborators at the edge of the orchestration core: application-wide
//! state projections, user-facing alerts, host-portal messaging, and the
//! context entity reload hook.
//!
//! These are deliberately thin. The UI layers own rendering; the core only
//! publishes state changes and messages through the channels defined here.

pub mod alerts;
pub mod application;
pub mod context_entities;
pub mod messages;

pub use alerts::{Alert, AlertService, AlertSeverity};
pub use application::{ApplicationState, FormType};
pub use context_entities::ContextEntityLoader;
pub use messages::{PortalMessage, PortalMessenger};
