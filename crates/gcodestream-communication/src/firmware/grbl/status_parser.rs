//! GRBL Status Report Parsing
//!
//! Decodes `<State|MPos:x,y,z|...>` status frames into a position snapshot
//! and the machine state tag. Parsing is pure: the same line always yields
//! the same result, and a malformed frame never produces a partial update.

use gcodestream_core::{MachineState, PositionSnapshot, ProtocolError};
use serde::{Deserialize, Serialize};

const MPOS_FIELD: &str = "MPos:";

/// A decoded status frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state tag, when the frame starts with one
    pub machine_state: Option<MachineState>,
    /// Machine position
    pub position: PositionSnapshot,
}

/// Status frame parser
pub struct StatusParser;

impl StatusParser {
    /// Parse a status frame, reporting why it was rejected
    pub fn try_parse(line: &str) -> Result<StatusReport, ProtocolError> {
        let body = line
            .trim()
            .strip_prefix('<')
            .ok_or(ProtocolError::NotAStatusFrame)?;
        // A missing '>' is tolerated; the frame simply runs to end of line.
        let body = body.strip_suffix('>').unwrap_or(body);

        let start = body
            .find(MPOS_FIELD)
            .ok_or(ProtocolError::MissingMachinePosition)?;
        let field = &body[start + MPOS_FIELD.len()..];
        let field = field.split('|').next().unwrap_or(field);

        let position = parse_xyz(field).ok_or_else(|| ProtocolError::InvalidCoordinates {
            field: "MPos".to_string(),
            value: field.to_string(),
        })?;

        let tag = body.split('|').next().unwrap_or_default().trim();
        let machine_state = (!tag.is_empty() && !tag.starts_with(MPOS_FIELD))
            .then(|| MachineState::from_tag(tag));

        Ok(StatusReport {
            machine_state,
            position,
        })
    }

    /// Parse a status frame, or `None` if the line is not a valid one
    pub fn parse(line: &str) -> Option<StatusReport> {
        Self::try_parse(line).ok()
    }
}

/// Extract the machine position from a status line
pub fn parse_status(line: &str) -> Option<PositionSnapshot> {
    StatusParser::parse(line).map(|report| report.position)
}

/// Parse exactly three comma-separated coordinates
fn parse_xyz(field: &str) -> Option<PositionSnapshot> {
    let mut coords = field.split(',').map(|s| s.trim().parse::<f64>());
    let x = coords.next()?.ok()?;
    let y = coords.next()?.ok()?;
    let z = coords.next()?.ok()?;
    if coords.next().is_some() {
        return None;
    }
    Some(PositionSnapshot::new(x, y, z))
}
