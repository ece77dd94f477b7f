//! Flow-controlled program streaming
//!
//! [`StreamingEngine`] is the pure state machine; [`Session`] binds it to a
//! transport, the firmware parsers and a background receive activity.

pub mod engine;
pub mod session;

use gcodestream_core::SpeedClass;
use gcodestream_settings::Config;
use std::time::Duration;

pub use engine::{Advance, StreamingEngine};
pub use session::Session;

/// Timing and jog parameters for a [`Session`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Pause after every transmitted line
    pub settle_delay: Duration,
    /// Upper bound of one receive poll
    pub read_timeout: Duration,
    /// Wait before the status query that follows `home()`
    pub home_status_delay: Duration,
    /// Jog distance for [`SpeedClass::Slow`]
    pub jog_slow: f64,
    /// Jog distance for [`SpeedClass::Medium`]
    pub jog_medium: f64,
    /// Jog distance for [`SpeedClass::Fast`]
    pub jog_fast: f64,
}

impl SessionSettings {
    /// Distance travelled by one jog at `speed`
    pub fn jog_distance(&self, speed: SpeedClass) -> f64 {
        match speed {
            SpeedClass::Slow => self.jog_slow,
            SpeedClass::Medium => self.jog_medium,
            SpeedClass::Fast => self.jog_fast,
        }
    }

    /// Same settings with a different settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            read_timeout: Duration::from_millis(50),
            home_status_delay: Duration::from_millis(1000),
            jog_slow: SpeedClass::Slow.default_distance(),
            jog_medium: SpeedClass::Medium.default_distance(),
            jog_fast: SpeedClass::Fast.default_distance(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.streaming.settle_delay_ms),
            read_timeout: Duration::from_millis(config.connection.read_timeout_ms),
            home_status_delay: Duration::from_millis(config.streaming.home_status_delay_ms),
            jog_slow: config.jog.slow,
            jog_medium: config.jog.medium,
            jog_fast: config.jog.fast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        assert_eq!(SessionSettings::from(&Config::default()), SessionSettings::default());
    }

    #[test]
    fn test_jog_distance() {
        let settings = SessionSettings::default();
        assert_eq!(settings.jog_distance(SpeedClass::Slow), 0.001);
        assert_eq!(settings.jog_distance(SpeedClass::Medium), 0.01);
        assert_eq!(settings.jog_distance(SpeedClass::Fast), 0.1);
    }
}
