//! Data models for positions and session state
//!
//! This module provides:
//! - Three-axis machine position snapshots
//! - The streaming session state machine states
//! - Firmware machine state tags reported in status frames
//! - Jog parameters (axis, direction, speed class)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine position in machine coordinates
///
/// Only ever replaced as a whole; a failed status parse leaves the previous
/// snapshot in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// X axis position
    pub x: f64,
    /// Y axis position
    pub y: f64,
    /// Z axis position
    pub z: f64,
}

impl PositionSnapshot {
    /// Create a new snapshot
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The machine origin
    pub fn origin() -> Self {
        Self::default()
    }

    /// Get the coordinate for one axis
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

impl fmt::Display for PositionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Streaming session state
///
/// `Disconnected` gates every other state: nothing is transmitted without an
/// attached transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport attached
    #[default]
    Disconnected,
    /// Connected, no job active
    Idle,
    /// Actively advancing through the program
    Streaming,
    /// Advancement suspended, connection alive
    Paused,
    /// Job stopped, cursor reset
    Stopped,
}

impl SessionState {
    /// Check if a transport is attached
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    /// Check if a job is in progress (streaming or paused)
    pub fn is_job_active(&self) -> bool {
        matches!(self, SessionState::Streaming | SessionState::Paused)
    }

    /// Check if `start()` is allowed from this state
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Idle => write!(f, "Idle"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Machine state tag reported by the firmware in status frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold
    Hold,
    /// Jogging
    Jog,
    /// Alarm lock
    Alarm,
    /// Safety door open
    Door,
    /// Check mode
    Check,
    /// Homing cycle
    Home,
    /// Sleep mode
    Sleep,
    /// Anything else, kept verbatim
    Unknown(String),
}

impl MachineState {
    /// Parse a state tag such as `Idle` or `Hold:0`
    pub fn from_tag(tag: &str) -> Self {
        let base = tag.split(':').next().unwrap_or(tag);
        match base {
            "Idle" => Self::Idle,
            "Run" => Self::Run,
            "Hold" => Self::Hold,
            "Jog" => Self::Jog,
            "Alarm" => Self::Alarm,
            "Door" => Self::Door,
            "Check" => Self::Check,
            "Home" => Self::Home,
            "Sleep" => Self::Sleep,
            _ => Self::Unknown(tag.to_string()),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown(tag) => write!(f, "{}", tag),
        }
    }
}

/// Machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
}

impl Axis {
    /// G-code word letter for this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Jog direction along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JogDirection {
    /// Towards positive coordinates
    Positive,
    /// Towards negative coordinates
    Negative,
}

impl JogDirection {
    /// Sign multiplier for this direction
    pub fn sign(&self) -> f64 {
        match self {
            JogDirection::Positive => 1.0,
            JogDirection::Negative => -1.0,
        }
    }
}

/// Jog speed class, mapped to a fixed step distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    /// Finest step
    #[default]
    Slow,
    /// Medium step
    Medium,
    /// Coarsest step
    Fast,
}

impl SpeedClass {
    /// Default step distance in machine units
    pub fn default_distance(&self) -> f64 {
        match self {
            SpeedClass::Slow => 0.001,
            SpeedClass::Medium => 0.01,
            SpeedClass::Fast => 0.1,
        }
    }
}

impl fmt::Display for SpeedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::Medium => write!(f, "medium"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_predicates() {
        assert!(!SessionState::Disconnected.is_connected());
        assert!(SessionState::Paused.is_job_active());
        assert!(SessionState::Stopped.can_start());
        assert!(!SessionState::Streaming.can_start());
    }

    #[test]
    fn test_machine_state_from_tag() {
        assert_eq!(MachineState::from_tag("Idle"), MachineState::Idle);
        assert_eq!(MachineState::from_tag("Hold:1"), MachineState::Hold);
        assert_eq!(
            MachineState::from_tag("Tool"),
            MachineState::Unknown("Tool".to_string())
        );
    }

    #[test]
    fn test_speed_class_distances() {
        assert_eq!(SpeedClass::Slow.default_distance(), 0.001);
        assert_eq!(SpeedClass::Medium.default_distance(), 0.01);
        assert_eq!(SpeedClass::Fast.default_distance(), 0.1);
    }
}
