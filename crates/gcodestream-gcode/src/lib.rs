//! # gcodestream G-code
//!
//! Loading of G-code files into streamable programs.

pub mod loader;

pub use loader::{GcodeLoader, Program, TrajectoryHint};
