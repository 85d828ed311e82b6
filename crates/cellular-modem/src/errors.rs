//! Error types for the modem stack

use cellular_core::SmsDecodeError;
use thiserror::Error;

pub use cellular_core::{
    CellularError, ParseError, PipeError, UnexpectedResponseError,
};

/// Result type alias
pub type Result<T> = std::result::Result<T, CellularError>;

/// Structural problems found while walking a PDU
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PduError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("truncated {field}: need {needed} octets, {available} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("cannot recognize DCS field 0x{0:02X}")]
    UnsupportedDcs(u8),

    #[error("invalid user data header: {0}")]
    InvalidUdh(String),

    #[error("segment mismatch: {0}")]
    SegmentMismatch(String),
}

impl PduError {
    /// Attach the offending PDU text
    pub fn into_decode_error(self, pdu: &str) -> SmsDecodeError {
        SmsDecodeError::new(pdu, self.to_string())
    }
}
