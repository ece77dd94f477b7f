//! GRBL command construction
//!
//! Builders for the fixed commands the session issues on its own, outside
//! of a loaded program.

use gcodestream_core::{Axis, JogDirection};
use gcodestream_gcode::Program;

/// Real-time status query, sent as a single byte
pub const STATUS_QUERY: u8 = b'?';

/// Real-time soft reset (Ctrl-X), sent as a single byte
pub const SOFT_RESET: u8 = 0x18;

/// Homing cycle
pub const HOME: &str = "$H";

/// Zero all axes at the current position
pub const SET_ORIGIN: &str = "G92 X0 Y0 Z0";

/// Absolute distance mode
pub const ABSOLUTE_MODE: &str = "G90";

/// Relative rapid move of one axis by `distance` in `direction`
pub fn jog_command(axis: Axis, direction: JogDirection, distance: f64) -> String {
    format!("G91 G0 {}{}", axis.letter(), direction.sign() * distance.abs())
}

/// The machine limit exercise: home to the origin, then travel 10 units out
/// and back on each axis in turn
pub fn limit_test_program() -> Program {
    Program::from_commands([
        "G90", "G0X0Y0Z0", "G0X10", "G0X0", "G0Y10", "G0Y0", "G0Z10", "G0Z0",
    ])
}
