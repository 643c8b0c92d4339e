//! User-facing alert side channel.
//!
//! Operation failures never surface as thrown errors to the UI widget layer;
//! they are rendered from alerts pushed here.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::instruction::OperationName;

const ALERT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

/// A user-facing alert produced by an operation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    /// The operation that produced this alert, when known
    pub operation: Option<OperationName>,
}

impl Alert {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Error,
            title: title.into(),
            message: message.into(),
            operation: None,
        }
    }

    pub fn for_operation(mut self, operation: OperationName) -> Self {
        self.operation = Some(operation);
        self
    }
}

/// Receives alerts from the engine and fans them out to UI subscribers
#[derive(Debug)]
pub struct AlertService {
    sender: broadcast::Sender<Alert>,
    history: Mutex<VecDeque<Alert>>,
}

impl AlertService {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Display an alert. Also retained in a bounded history for late-mounting
    /// UI surfaces.
    pub fn display(&self, alert: Alert) {
        warn!(
            severity = ?alert.severity,
            title = %alert.title,
            operation = alert.operation.map(|o| o.as_str()),
            "Displaying alert"
        );
        {
            let mut history = self.history.lock();
            if history.len() == ALERT_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }
        let _ = self.sender.send(alert);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }

    pub fn recent(&self) -> Vec<Alert> {
        self.history.lock().iter().cloned().collect()
    }
}

impl Default for AlertService {
    fn default() -> Self {
        Self::new()
    }
}
