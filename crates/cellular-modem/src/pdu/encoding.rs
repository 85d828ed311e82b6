//! GSM 7-bit, UCS2 and semi-octet decoding

use crate::errors::PduError;

/// GSM 7-bit default alphabet
const GSM7_BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\x1b', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// GSM 7-bit extension table (after ESC)
const GSM7_EXTENSION: &[(u8, char)] = &[
    (0x0A, '\x0C'), // Form feed
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

const ESC: u8 = 0x1B;

/// Octets occupied by `septets` packed septets
pub fn packed_len(septets: usize) -> usize {
    (septets * 7 + 7) / 8
}

/// Unpack `count` septets from packed octets.
///
/// Septet `i` starts at bit `(i*7) % 8` of octet `(i*7) / 8`; when it starts
/// above bit 1 its high bits come from the following octet.
pub fn unpack_septets(data: &[u8], count: usize) -> Result<Vec<u8>, PduError> {
    let needed = packed_len(count);
    if data.len() < needed {
        return Err(PduError::Truncated {
            field: "7-bit user data",
            needed,
            available: data.len(),
        });
    }

    let mut septets = Vec::with_capacity(count);
    for i in 0..count {
        let byte_index = (i * 7) / 8;
        let start_bit = (i * 7) % 8;
        let mut value = (data[byte_index] >> start_bit) & 0x7F;
        if start_bit > 1 {
            if let Some(&next) = data.get(byte_index + 1) {
                value |= ((u16::from(next) << (8 - start_bit)) & 0x7F) as u8;
            }
        }
        septets.push(value);
    }
    Ok(septets)
}

/// Map septets through the default alphabet and its escape extension
pub fn septets_to_string(septets: &[u8]) -> String {
    let mut result = String::with_capacity(septets.len());
    let mut escape = false;

    for &septet in septets {
        if escape {
            escape = false;
            match GSM7_EXTENSION.iter().find(|&&(code, _)| code == septet) {
                Some(&(_, ch)) => result.push(ch),
                None => result.push(GSM7_BASIC[usize::from(septet & 0x7F)]),
            }
        } else if septet == ESC {
            escape = true;
        } else {
            result.push(GSM7_BASIC[usize::from(septet & 0x7F)]);
        }
    }

    result
}

/// Decode `count` packed septets as GSM 7-bit text
pub fn decode_gsm7(data: &[u8], count: usize) -> Result<String, PduError> {
    unpack_septets(data, count).map(|septets| septets_to_string(&septets))
}

/// Decode big-endian UCS2. Surrogate pairs are combined; a lone surrogate
/// becomes U+FFFD and a trailing odd octet is ignored.
pub fn decode_ucs2(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair[1]));

    char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn semi_octet_digit(nibble: u8) -> Option<char> {
    match nibble {
        0..=9 => Some(char::from(b'0' + nibble)),
        0x0A => Some('*'),
        0x0B => Some('#'),
        _ => None,
    }
}

/// Decode nibble-swapped BCD, truncated to `digits`. Pad nibbles are elided.
pub fn decode_semi_octets(data: &[u8], digits: usize) -> String {
    let mut result = String::with_capacity(data.len() * 2);

    for &byte in data {
        for nibble in [byte & 0x0F, byte >> 4] {
            if let Some(ch) = semi_octet_digit(nibble) {
                result.push(ch);
            }
        }
    }

    result.truncate(digits);
    result
}

/// Format a service-center timestamp as `YY/MM/DD,hh:mm:ss`.
///
/// Only the first six octets are rendered; the time-zone octet is ignored.
pub fn decode_timestamp(data: &[u8]) -> String {
    const SEPARATORS: [&str; 6] = ["/", "/", ",", ":", ":", ""];

    let mut result = String::with_capacity(17);
    for (&byte, separator) in data.iter().take(6).zip(SEPARATORS) {
        for nibble in [byte & 0x0F, byte >> 4] {
            result.push(char::from_digit(u32::from(nibble), 16).unwrap_or('?'));
        }
        result.push_str(separator);
    }
    result
}
