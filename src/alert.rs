use crate::config::AlertConfig;
use crate::display::DisplayRow;
use chrono::{DateTime, Local, TimeDelta};

/// Terminal bell, written by the display ahead of a frame that carries an alert
pub const BELL: &str = "\x07";

/// Decides when an approaching train is worth an alert
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    threshold_minutes: i64,
    cooldown: TimeDelta,
    last_alert: Option<DateTime<Local>>,
}

impl AlertPolicy {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            threshold_minutes: config.threshold_minutes,
            cooldown: TimeDelta::minutes(config.cooldown_minutes),
            last_alert: None,
        }
    }

    /// True when sound is on, some row is under the threshold, and the
    /// previous alert is at least one cooldown old. Records the alert time
    /// when it returns true.
    pub fn should_alert(
        &mut self,
        rows: &[DisplayRow],
        sound_enabled: bool,
        now: DateTime<Local>,
    ) -> bool {
        if !sound_enabled {
            return false;
        }

        if !rows.iter().any(|r| r.eta_minutes() < self.threshold_minutes) {
            return false;
        }

        if let Some(last) = self.last_alert {
            if now - last < self.cooldown {
                return false;
            }
        }

        self.last_alert = Some(now);
        true
    }
}
