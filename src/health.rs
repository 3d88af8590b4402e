//! Edge-logged health state for external collaborators
//!
//! Replaces silent-after-first-error booleans with an explicit
//! `Healthy`/`Degraded` value that only logs on transitions: one line when a
//! collaborator drops out, one line when it comes back. A dead broker or
//! database therefore produces two log lines per outage, not one per tick.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
}

/// Health flag for one subsystem (e.g. `"mqtt"`, `"storage"`).
///
/// Logging happens inside the flag so every caller gets the same
/// once-per-edge discipline for free.
#[derive(Debug)]
pub struct HealthFlag {
    subsystem: &'static str,
    state: Mutex<Health>,
}

impl HealthFlag {
    pub fn new(subsystem: &'static str) -> Self {
        Self {
            subsystem,
            state: Mutex::new(Health::Healthy),
        }
    }

    pub fn current(&self) -> Health {
        *self.state.lock().expect("health lock poisoned")
    }

    pub fn is_degraded(&self) -> bool {
        self.current() == Health::Degraded
    }

    /// Record a failure. Logs only on the Healthy -> Degraded edge.
    pub fn degrade(&self, reason: &str) {
        let mut state = self.state.lock().expect("health lock poisoned");
        if *state == Health::Healthy {
            *state = Health::Degraded;
            warn!(
                subsystem = self.subsystem,
                reason, "entering degraded mode, continuing with reduced capability"
            );
        }
    }

    /// Record a success. Logs only on the Degraded -> Healthy edge.
    pub fn restore(&self) {
        let mut state = self.state.lock().expect("health lock poisoned");
        if *state == Health::Degraded {
            *state = Health::Healthy;
            info!(subsystem = self.subsystem, "recovered, back to full capability");
        }
    }
}
