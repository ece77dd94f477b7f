//! GRBL Response Parser
//!
//! Classifies firmware lines into acknowledgements, errors, alarms, status
//! frames and free-form messages. Only the generic conventions are relied
//! on: `ok`, `error...`, `ALARM...` and `<...>` frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified firmware line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmwareResponse {
    /// Acknowledgement of the previous command
    Ok,
    /// Error response, kept verbatim
    Error(String),
    /// Alarm notification, kept verbatim
    Alarm(String),
    /// Status frame, kept verbatim for the status parser
    Status(String),
    /// Anything else (banners, settings, feedback)
    Message(String),
}

impl FirmwareResponse {
    /// Numeric code of an `error:N` / `ALARM:N` response
    pub fn code(&self) -> Option<u8> {
        let text = match self {
            Self::Error(text) | Self::Alarm(text) => text,
            _ => return None,
        };
        text.split_once(':')?.1.trim().parse().ok()
    }
}

impl fmt::Display for FirmwareResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(text) => match self.code() {
                Some(code) => write!(f, "{} ({})", text, error_description(code)),
                None => write!(f, "{}", text),
            },
            Self::Alarm(text) => match self.code() {
                Some(code) => write!(f, "{} ({})", text, alarm_description(code)),
                None => write!(f, "{}", text),
            },
            Self::Status(frame) => write!(f, "{}", frame),
            Self::Message(msg) => write!(f, "{}", msg),
        }
    }
}

/// Firmware response parser
pub struct ResponseParser;

impl ResponseParser {
    /// Classify a firmware line; `None` for blank lines
    pub fn parse(line: &str) -> Option<FirmwareResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line.starts_with('<') {
            return Some(FirmwareResponse::Status(line.to_string()));
        }

        if line.starts_with("ok") {
            return Some(FirmwareResponse::Ok);
        }

        if line.starts_with("error") {
            return Some(FirmwareResponse::Error(line.to_string()));
        }

        if line
            .get(..5)
            .is_some_and(|head| head.eq_ignore_ascii_case("alarm"))
        {
            return Some(FirmwareResponse::Alarm(line.to_string()));
        }

        Some(FirmwareResponse::Message(line.to_string()))
    }
}

/// Get error description
pub fn error_description(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid statement",
        4 => "Negative value",
        5 => "Setting disabled",
        9 => "G-code locked out during alarm or jog state",
        15 => "Travel exceeded",
        20 => "Unsupported or invalid g-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Failed to execute startup block",
        24 => "EEPROM read failed",
        _ => "Unknown error",
    }
}

/// Get alarm description
pub fn alarm_description(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Abort during cycle",
        4 => "Probe fail",
        5 => "Probe not triggered",
        6 => "Homing fail",
        7 => "Homing fail pulloff",
        8 => "Spindle control failure",
        9 => "Cooling mist control failure",
        _ => "Unknown alarm",
    }
}
