//! Common types used across the modem stack

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PduError;

/// A decoded inbound SMS.
///
/// For a segment of a concatenated message, `content` holds only that
/// segment's text until the reassembly store delivers the joined record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRecord {
    /// Service-center address
    pub smsc: Option<String>,
    pub sender: String,
    /// Service-center timestamp, `YY/MM/DD,hh:mm:ss`
    pub timestamp: String,
    pub content: String,
    pub is_segment: bool,
    /// Concatenation reference, 0 when not a segment
    pub reference: u16,
}

impl fmt::Display for SmsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SMS from {} at {}", self.sender, self.timestamp)?;
        if let Some(smsc) = &self.smsc {
            write!(f, " via {}", smsc)?;
        }
        if self.is_segment {
            write!(f, " (segment of #{})", self.reference)?;
        }
        write!(f, ": {}", self.content)
    }
}

/// Concatenation header of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub reference: u16,
    /// Declared number of segments in the group
    pub count: u8,
    /// Zero-based position of this segment
    pub index: u8,
}

/// Text alphabet selected by the data coding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alphabet {
    /// GSM 03.38 default alphabet, packed septets
    Gsm7,
    /// Big-endian 16-bit code units
    Ucs2,
}

impl Alphabet {
    /// Select the alphabet from bits 2-3 of the DCS byte
    pub fn from_dcs(dcs: u8) -> std::result::Result<Self, PduError> {
        match dcs & 0x0C {
            0x00 => Ok(Self::Gsm7),
            0x08 => Ok(Self::Ucs2),
            _ => Err(PduError::UnsupportedDcs(dcs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_from_dcs() {
        assert_eq!(Alphabet::from_dcs(0x00).unwrap(), Alphabet::Gsm7);
        assert_eq!(Alphabet::from_dcs(0x08).unwrap(), Alphabet::Ucs2);
        // Class bits do not affect the alphabet
        assert_eq!(Alphabet::from_dcs(0x11).unwrap(), Alphabet::Gsm7);
        assert_eq!(Alphabet::from_dcs(0x18).unwrap(), Alphabet::Ucs2);
        assert_eq!(Alphabet::from_dcs(0x04), Err(PduError::UnsupportedDcs(0x04)));
        assert_eq!(Alphabet::from_dcs(0x0C), Err(PduError::UnsupportedDcs(0x0C)));
    }

    #[test]
    fn test_record_display() {
        let record = SmsRecord {
            smsc: None,
            sender: "10086".to_string(),
            timestamp: "25/01/17,15:20:43".to_string(),
            content: "hi".to_string(),
            is_segment: true,
            reference: 7,
        };
        assert_eq!(
            record.to_string(),
            "SMS from 10086 at 25/01/17,15:20:43 (segment of #7): hi"
        );
    }
}
