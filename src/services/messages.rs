//! Host-portal messaging.
//!
//! The embedding portal listens for these to react to workflow completion:
//! showing a "save in progress" indicator and relabelling its close button.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::instruction::OperationName;

/// Messages sent to the embedding host portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PortalMessage {
    /// A workflow-completing operation has finished and the backend save ran
    SaveInitiated { operation: OperationName },
    /// The portal close button should be relabelled for the completed step
    CloseButtonLabel { label: String },
}

/// Fan-out channel for [`PortalMessage`]s
#[derive(Debug, Clone)]
pub struct PortalMessenger {
    sender: broadcast::Sender<PortalMessage>,
}

impl PortalMessenger {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(32);
        Self { sender }
    }

    pub fn save_initiated(&self, operation: OperationName) {
        self.send(PortalMessage::SaveInitiated { operation });
    }

    pub fn close_button_label(&self, label: impl Into<String>) {
        self.send(PortalMessage::CloseButtonLabel {
            label: label.into(),
        });
    }

    fn send(&self, message: PortalMessage) {
        debug!(message = ?message, "Portal message");
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortalMessage> {
        self.sender.subscribe()
    }
}

impl Default for PortalMessenger {
    fn default() -> Self {
        Self::new()
    }
}
