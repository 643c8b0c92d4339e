//! Calculation activity state machine.
//!
//! Replaces raw counter arithmetic with explicit projections. Each
//! projection is active while `count > 0 || pending`, and publishes its
//! derived flag only on change (edge-triggered), which keeps UI spinners
//! from flickering during counter churn.
//!
//! Four projections are tracked: overall, premium-scoped, trigger-scoped,
//! and background (silent calculations, which must not drive the blocking
//! spinner).

use tokio::sync::watch;
use tracing::warn;

use crate::services::ApplicationState;

/// Derived state of one activity projection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// No request in flight or waiting
    Idle,
    /// A request is debouncing or queued but not yet executing
    Pending,
    /// At least one request is executing
    Active,
}

/// One `count > 0 || pending` projection with edge detection
#[derive(Debug, Default)]
pub struct ActivityProjection {
    count: u32,
    pending: bool,
    published: bool,
}

impl ActivityProjection {
    fn derived(&self) -> bool {
        self.count > 0 || self.pending
    }

    pub fn state(&self) -> ActivityState {
        if self.count > 0 {
            ActivityState::Active
        } else if self.pending {
            ActivityState::Pending
        } else {
            ActivityState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.derived()
    }

    /// A request started executing. Returns the new derived flag on edge.
    pub fn begin(&mut self) -> Option<bool> {
        self.count += 1;
        self.edge()
    }

    /// A request settled. Returns the new derived flag on edge.
    pub fn settle(&mut self) -> Option<bool> {
        if self.count == 0 {
            warn!("Activity projection settled below zero; clamping");
        }
        self.count = self.count.saturating_sub(1);
        self.edge()
    }

    /// A request entered or left the waiting stage.
    pub fn set_pending(&mut self, pending: bool) -> Option<bool> {
        self.pending = pending;
        self.edge()
    }

    fn edge(&mut self) -> Option<bool> {
        let derived = self.derived();
        if derived != self.published {
            self.published = derived;
            Some(derived)
        } else {
            None
        }
    }
}

/// The four projections the calculation pipeline maintains
#[derive(Debug, Default)]
pub struct CalculationActivity {
    overall: ActivityProjection,
    premium: ActivityProjection,
    trigger: ActivityProjection,
    background: ActivityProjection,
}

impl CalculationActivity {
    pub fn overall(&self) -> &ActivityProjection {
        &self.overall
    }

    pub fn background(&self) -> &ActivityProjection {
        &self.background
    }

    /// A request is now waiting (debounce window or queue).
    pub fn request_pending(
        &mut self,
        app: &ApplicationState,
        for_premium: bool,
        for_trigger: bool,
    ) {
        publish(
            app.calculation_in_progress_sender(),
            self.overall.set_pending(true),
        );
        if for_premium {
            publish(
                app.premium_calculation_in_progress_sender(),
                self.premium.set_pending(true),
            );
        }
        if for_trigger {
            publish(
                app.trigger_calculation_in_progress_sender(),
                self.trigger.set_pending(true),
            );
        }
    }

    /// The waiting stage for these dimensions is over.
    pub fn clear_pending(&mut self, app: &ApplicationState, for_premium: bool, for_trigger: bool) {
        publish(
            app.calculation_in_progress_sender(),
            self.overall.set_pending(false),
        );
        if for_premium {
            publish(
                app.premium_calculation_in_progress_sender(),
                self.premium.set_pending(false),
            );
        }
        if for_trigger {
            publish(
                app.trigger_calculation_in_progress_sender(),
                self.trigger.set_pending(false),
            );
        }
    }

    /// A user-visible calculation started executing.
    pub fn begin_foreground(
        &mut self,
        app: &ApplicationState,
        for_premium: bool,
        for_trigger: bool,
    ) {
        publish(app.calculation_in_progress_sender(), self.overall.begin());
        if for_premium {
            publish(
                app.premium_calculation_in_progress_sender(),
                self.premium.begin(),
            );
        }
        if for_trigger {
            publish(
                app.trigger_calculation_in_progress_sender(),
                self.trigger.begin(),
            );
        }
    }

    /// A user-visible calculation settled.
    pub fn settle_foreground(
        &mut self,
        app: &ApplicationState,
        for_premium: bool,
        for_trigger: bool,
    ) {
        publish(app.calculation_in_progress_sender(), self.overall.settle());
        if for_premium {
            publish(
                app.premium_calculation_in_progress_sender(),
                self.premium.settle(),
            );
        }
        if for_trigger {
            publish(
                app.trigger_calculation_in_progress_sender(),
                self.trigger.settle(),
            );
        }
    }

    /// A silent calculation started executing in the background.
    pub fn begin_background(&mut self, app: &ApplicationState) {
        publish(
            app.background_calculation_in_progress_sender(),
            self.background.begin(),
        );
    }

    /// A silent calculation settled (or was superseded while waiting).
    pub fn settle_background(&mut self, app: &ApplicationState) {
        publish(
            app.background_calculation_in_progress_sender(),
            self.background.settle(),
        );
    }
}

fn publish(sender: &watch::Sender<bool>, edge: Option<bool>) {
    if let Some(value) = edge {
        sender.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
