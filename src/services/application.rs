//! Application-wide state projections.
//!
//! Single source of truth for what the embedding host needs to know about
//! the core: which operation occupies the execution slot, and whether a
//! calculation is in flight (overall, premium-scoped, trigger-scoped, or
//! silent/background). All projections are `watch` channels so the UI only
//! observes edges, never intermediate counter arithmetic.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::DebugConfig;

/// The product form this embed is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    Quote,
    Claim,
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => write!(f, "quote"),
            Self::Claim => write!(f, "claim"),
        }
    }
}

/// Shared application state, mutated by the orchestration core only
#[derive(Debug)]
pub struct ApplicationState {
    form_type: RwLock<FormType>,
    debug: DebugConfig,
    /// The form reached its terminal Complete state (quote issued / claim settled)
    form_completed: RwLock<bool>,
    operation_in_progress: watch::Sender<Option<String>>,
    calculation_in_progress: watch::Sender<bool>,
    premium_calculation_in_progress: watch::Sender<bool>,
    trigger_calculation_in_progress: watch::Sender<bool>,
    background_calculation_in_progress: watch::Sender<bool>,
}

impl ApplicationState {
    pub fn new(form_type: FormType, debug: DebugConfig) -> Self {
        Self {
            form_type: RwLock::new(form_type),
            debug,
            form_completed: RwLock::new(false),
            operation_in_progress: watch::channel(None).0,
            calculation_in_progress: watch::channel(false).0,
            premium_calculation_in_progress: watch::channel(false).0,
            trigger_calculation_in_progress: watch::channel(false).0,
            background_calculation_in_progress: watch::channel(false).0,
        }
    }

    pub fn form_type(&self) -> FormType {
        *self.form_type.read()
    }

    pub fn set_form_type(&self, form_type: FormType) {
        *self.form_type.write() = form_type;
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.enabled
    }

    pub fn debug_level(&self) -> u8 {
        self.debug.level
    }

    pub fn form_completed(&self) -> bool {
        *self.form_completed.read()
    }

    /// Mark the form as terminally complete for its type.
    pub fn set_form_completed(&self, completed: bool) {
        *self.form_completed.write() = completed;
    }

    /// Publish the name of the operation occupying the execution slot, the
    /// priority sentinel, or `None`. Edge-triggered.
    pub fn set_operation_in_progress(&self, name: Option<String>) {
        self.operation_in_progress.send_if_modified(|current| {
            if *current == name {
                return false;
            }
            *current = name;
            true
        });
    }

    pub fn operation_in_progress(&self) -> Option<String> {
        self.operation_in_progress.borrow().clone()
    }

    pub fn subscribe_operation_in_progress(&self) -> watch::Receiver<Option<String>> {
        self.operation_in_progress.subscribe()
    }

    pub(crate) fn calculation_in_progress_sender(&self) -> &watch::Sender<bool> {
        &self.calculation_in_progress
    }

    pub(crate) fn premium_calculation_in_progress_sender(&self) -> &watch::Sender<bool> {
        &self.premium_calculation_in_progress
    }

    pub(crate) fn trigger_calculation_in_progress_sender(&self) -> &watch::Sender<bool> {
        &self.trigger_calculation_in_progress
    }

    pub(crate) fn background_calculation_in_progress_sender(&self) -> &watch::Sender<bool> {
        &self.background_calculation_in_progress
    }

    pub fn calculation_in_progress(&self) -> bool {
        *self.calculation_in_progress.borrow()
    }

    pub fn subscribe_calculation_in_progress(&self) -> watch::Receiver<bool> {
        self.calculation_in_progress.subscribe()
    }

    pub fn subscribe_premium_calculation_in_progress(&self) -> watch::Receiver<bool> {
        self.premium_calculation_in_progress.subscribe()
    }

    pub fn subscribe_trigger_calculation_in_progress(&self) -> watch::Receiver<bool> {
        self.trigger_calculation_in_progress.subscribe()
    }

    pub fn subscribe_background_calculation_in_progress(&self) -> watch::Receiver<bool> {
        self.background_calculation_in_progress.subscribe()
    }
}
