//! GRBL protocol support
//!
//! Response classification, status frame parsing and command builders for
//! GRBL-style firmware.

pub mod commands;
pub mod response_parser;
pub mod status_parser;

pub use response_parser::{FirmwareResponse, ResponseParser};
pub use status_parser::{parse_status, StatusParser, StatusReport};
