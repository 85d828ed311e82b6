//! SMS-DELIVER PDU decoding
//!
//! Layout walked left to right:
//! SMSC length + address, first octet (UDHI = 0x40), originator length,
//! type-of-address and digits, PID, DCS, 7-octet timestamp, UDL, user data.

pub mod encoding;

use bytes::{Buf, Bytes};
use cellular_core::SmsDecodeError;
use tracing::{debug, instrument, warn};

use crate::errors::PduError;
use crate::reassembly::SegmentStore;
use crate::types::{Alphabet, SegmentInfo, SmsRecord};

/// User-data-header-indicator bit of the first octet
pub const UDHI_FLAG: u8 = 0x40;

/// Concatenation IE with 8-bit reference
pub const IEI_CONCAT_8BIT: u8 = 0x00;

/// Concatenation IE with 16-bit reference
pub const IEI_CONCAT_16BIT: u8 = 0x08;

/// Result of decoding a single PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPdu {
    pub record: SmsRecord,
    pub segment: Option<SegmentInfo>,
    pub alphabet: Alphabet,
}

/// Decode one PDU and file its text into `store` when it is a segment.
#[instrument(level = "debug", skip(store))]
pub fn decode(pdu: &str, store: &mut SegmentStore) -> Result<SmsRecord, SmsDecodeError> {
    let decoded = parse(pdu)?;

    if let Some(segment) = decoded.segment {
        store
            .insert(segment, decoded.record.content.clone())
            .map_err(|e| {
                warn!(pdu = %pdu, error = %e, "Segment rejected by reassembly store");
                e.into_decode_error(pdu)
            })?;
    }

    Ok(decoded.record)
}

/// Decode one PDU without touching any reassembly state.
pub fn parse(pdu: &str) -> Result<DecodedPdu, SmsDecodeError> {
    parse_octets(pdu.trim()).map_err(|e| {
        warn!(pdu = %pdu, error = %e, "Failed to decode PDU");
        e.into_decode_error(pdu)
    })
}

fn take_u8(buf: &mut Bytes, field: &'static str) -> Result<u8, PduError> {
    if !buf.has_remaining() {
        return Err(PduError::Truncated {
            field,
            needed: 1,
            available: 0,
        });
    }
    Ok(buf.get_u8())
}

fn take(buf: &mut Bytes, len: usize, field: &'static str) -> Result<Bytes, PduError> {
    if buf.remaining() < len {
        return Err(PduError::Truncated {
            field,
            needed: len,
            available: buf.remaining(),
        });
    }
    Ok(buf.split_to(len))
}

fn parse_octets(hex_text: &str) -> Result<DecodedPdu, PduError> {
    let octets = hex::decode(hex_text).map_err(|e| PduError::InvalidHex(e.to_string()))?;
    let mut buf = Bytes::from(octets);

    // Service center
    let smsc_len = usize::from(take_u8(&mut buf, "SMSC length")?);
    let smsc = if smsc_len > 0 {
        let info = take(&mut buf, smsc_len, "SMSC address")?;
        Some(encoding::decode_semi_octets(&info[1..], (smsc_len - 1) * 2))
    } else {
        None
    };

    let first_octet = take_u8(&mut buf, "first octet")?;
    let udh_present = first_octet & UDHI_FLAG != 0;

    // Originator
    let sender_digits = usize::from(take_u8(&mut buf, "sender length")?);
    let type_of_address = take_u8(&mut buf, "sender type-of-address")?;
    let sender_octets = take(&mut buf, (sender_digits + 1) / 2, "sender address")?;
    let sender = if type_of_address & 0x70 == 0x50 {
        // Alphanumeric: the length counts semi-octets of packed septets
        encoding::decode_gsm7(&sender_octets, sender_digits * 4 / 7)?
    } else {
        encoding::decode_semi_octets(&sender_octets, sender_digits)
    };

    let _pid = take_u8(&mut buf, "protocol identifier")?;
    let dcs = take_u8(&mut buf, "data coding scheme")?;
    let alphabet = Alphabet::from_dcs(dcs)?;

    let timestamp = encoding::decode_timestamp(&take(&mut buf, 7, "timestamp")?);

    let udl = usize::from(take_u8(&mut buf, "user data length")?);
    let user_data = buf;

    let (segment, skip) = if udh_present {
        let (segment, skip) = parse_udh(&user_data)?;
        (Some(segment), skip)
    } else {
        (None, 0)
    };

    let content = match alphabet {
        Alphabet::Ucs2 => {
            if user_data.len() < udl {
                return Err(PduError::Truncated {
                    field: "UCS2 user data",
                    needed: udl,
                    available: user_data.len(),
                });
            }
            let body = user_data.get(skip..udl).ok_or_else(|| {
                PduError::InvalidUdh(format!("header of {} octets exceeds UDL {}", skip, udl))
            })?;
            encoding::decode_ucs2(body)
        }
        Alphabet::Gsm7 => {
            let septets = encoding::unpack_septets(&user_data, udl)?;
            // The header length is applied as a septet index
            let body = septets.get(skip..).ok_or_else(|| {
                PduError::InvalidUdh(format!("header of {} septets exceeds UDL {}", skip, udl))
            })?;
            encoding::septets_to_string(body)
        }
    };

    debug!(
        sender = %sender,
        alphabet = ?alphabet,
        segment = ?segment,
        "PDU decoded"
    );

    Ok(DecodedPdu {
        record: SmsRecord {
            smsc,
            sender,
            timestamp,
            content,
            is_segment: segment.is_some(),
            reference: segment.map(|s| s.reference).unwrap_or(0),
        },
        segment,
        alphabet,
    })
}

/// Parse the concatenation header. Returns the segment and the skip count
/// (`UDH length + 1`) applied before the text.
fn parse_udh(user_data: &[u8]) -> Result<(SegmentInfo, usize), PduError> {
    let header_len = usize::from(*user_data.first().ok_or(PduError::Truncated {
        field: "user data header",
        needed: 1,
        available: 0,
    })?);
    if header_len == 0 {
        return Err(PduError::InvalidUdh("UDH length is 0".to_string()));
    }
    if user_data.len() < header_len + 1 {
        return Err(PduError::Truncated {
            field: "user data header",
            needed: header_len + 1,
            available: user_data.len(),
        });
    }

    let header = &user_data[1..=header_len];
    let iei = header[0];
    let iedl = usize::from(*header.get(1).ok_or_else(|| {
        PduError::InvalidUdh(format!("UDH length {} leaves no room for IEDL", header_len))
    })?);
    if iedl + 2 != header_len {
        return Err(PduError::InvalidUdh(format!(
            "IEDL {} does not match UDH length {}",
            iedl, header_len
        )));
    }
    let data = &header[2..];

    let (reference, count, ordinal) = match (iei, iedl) {
        (IEI_CONCAT_8BIT, 3) => (u16::from(data[0]), data[1], data[2]),
        (IEI_CONCAT_16BIT, 4) => ((u16::from(data[0]) << 8) | u16::from(data[1]), data[2], data[3]),
        (IEI_CONCAT_8BIT, _) | (IEI_CONCAT_16BIT, _) => {
            return Err(PduError::InvalidUdh(format!(
                "IEDL {} is invalid for IEI 0x{:02X}",
                iedl, iei
            )))
        }
        _ => {
            return Err(PduError::InvalidUdh(format!(
                "unsupported IEI 0x{:02X}",
                iei
            )))
        }
    };

    let index = ordinal
        .checked_sub(1)
        .ok_or_else(|| PduError::InvalidUdh("segment number 0".to_string()))?;

    Ok((
        SegmentInfo {
            reference,
            count,
            index,
        },
        header_len + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembly::Delivery;

    const UCS2_SINGLE: &str =
        "0891683108200505F0040D91683119325476F8000852107151023480124F60597D002C00200077006F0072006C0064";
    const GSM7_SINGLE: &str =
        "0891683108200505F0040D91683119325476F80000521071510234800AE8329BFD4697D9EC37";
    const GSM7_SEGMENT: &str =
        "0891683108200505F0440D91683119325476F80000521071510234800F0500030702019069101D5D969701";
    const CLASSIC: &str =
        "07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07";

    #[test]
    fn test_decode_ucs2_single() {
        let decoded = parse(UCS2_SINGLE).unwrap();
        let record = decoded.record;
        assert_eq!(record.smsc.as_deref(), Some("8613800250500"));
        assert_eq!(record.sender, "8613912345678");
        assert_eq!(record.timestamp, "25/01/17,15:20:43");
        assert_eq!(record.content, "你好, world");
        assert!(!record.is_segment);
        assert_eq!(record.reference, 0);
        assert_eq!(decoded.alphabet, Alphabet::Ucs2);
    }

    #[test]
    fn test_decode_is_deterministic() {
        assert_eq!(parse(UCS2_SINGLE).unwrap(), parse(UCS2_SINGLE).unwrap());
    }

    #[test]
    fn test_decode_gsm7_single() {
        let record = parse(GSM7_SINGLE).unwrap().record;
        assert_eq!(record.content, "hellohello");
        assert!(!record.is_segment);
    }

    #[test]
    fn test_decode_classic_vector() {
        let record = parse(CLASSIC).unwrap().record;
        assert_eq!(record.smsc.as_deref(), Some("31624000000"));
        assert_eq!(record.sender, "31641600986");
        assert_eq!(record.timestamp, "02/08/26,19:37:41");
        assert_eq!(record.content, "How are you?");
    }

    #[test]
    fn test_gsm7_segment_skips_header_as_septets() {
        let decoded = parse(GSM7_SEGMENT).unwrap();
        assert_eq!(
            decoded.segment,
            Some(SegmentInfo {
                reference: 7,
                count: 2,
                index: 0,
            })
        );
        // The fill bits surface as a leading '@'
        assert_eq!(decoded.record.content, "@Hi there");
        assert_eq!(decoded.record.reference, 7);
    }

    #[test]
    fn test_decode_files_segment_into_store() {
        let mut store = SegmentStore::new();
        let record = decode(GSM7_SEGMENT, &mut store).unwrap();
        assert!(record.is_segment);
        assert_eq!(store.received(7), Some((1, 2)));
        assert!(!store.is_complete(7));
        assert!(matches!(store.deliver(record), Delivery::Pending { .. }));
    }

    #[test]
    fn test_unsupported_dcs() {
        // DCS 0x04 (8-bit data)
        let pdu = GSM7_SINGLE.replacen("F80000", "F80004", 1);
        let err = parse(&pdu).unwrap_err();
        assert_eq!(err.pdu, pdu);
        assert!(err.reason.contains("DCS"));
    }

    #[test]
    fn test_invalid_hex() {
        assert!(parse("0791ZZ").is_err());
        assert!(parse("079").is_err());
    }

    #[test]
    fn test_truncated_input() {
        let err = parse(&UCS2_SINGLE[..40]).unwrap_err();
        assert!(err.reason.contains("truncated"));
        assert!(parse("").is_err());
    }

    #[test]
    fn test_udh_zero_length() {
        // First octet 0x44, UDL 1, UDH length 0
        let pdu = format!("00440D91683119325476F80008{}0100", "52107151023480");
        let err = parse(&pdu).unwrap_err();
        assert!(err.reason.contains("UDH length is 0"));
    }

    #[test]
    fn test_udh_8bit_reference() {
        let ud = "0500030A0302";
        let text = "0041";
        let pdu = format!(
            "00440D91683119325476F80008{}{:02X}{}{}",
            "52107151023480",
            (ud.len() + text.len()) / 2,
            ud,
            text
        );
        let decoded = parse(&pdu).unwrap();
        assert_eq!(
            decoded.segment,
            Some(SegmentInfo {
                reference: 10,
                count: 3,
                index: 1,
            })
        );
        assert_eq!(decoded.record.content, "A");
        assert_eq!(decoded.record.smsc, None);
    }

    #[test]
    fn test_udh_mismatched_iedl() {
        // IEI 0x00 with IEDL 4
        let pdu = format!("00440D91683119325476F80008{}08060004AB020100", "52107151023480");
        let err = parse(&pdu).unwrap_err();
        assert!(err.reason.contains("IEDL 4 is invalid for IEI 0x00"));
    }

    #[test]
    fn test_udh_iedl_disagrees_with_length() {
        let pdu = format!("00440D91683119325476F80008{}0806080302010000", "52107151023480");
        let err = parse(&pdu).unwrap_err();
        assert!(err.reason.contains("does not match UDH length"));
    }

    #[test]
    fn test_udh_unknown_iei() {
        let pdu = format!("00440D91683119325476F80008{}06050503010203", "52107151023480");
        let err = parse(&pdu).unwrap_err();
        assert!(err.reason.contains("unsupported IEI 0x05"));
    }

    #[test]
    fn test_alphanumeric_sender() {
        // "Test" packed: 7 septet bits -> D4F29C0E, 7 semi-octets
        let pdu = format!("00040750D4F29C0E0000{}0441E19008", "52107151023480");
        let record = parse(&pdu).unwrap().record;
        assert_eq!(record.sender, "Test");
        assert_eq!(record.content, "ABCD");
    }
}
