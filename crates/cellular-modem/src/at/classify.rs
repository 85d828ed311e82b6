//! Classification of steady-state serial lines

/// New message stored notification
pub const NEW_MESSAGE_MARKER: &str = "+CMTI:";

/// Storage tag of the SIM message area, including the index separator
pub const SIM_STORAGE: &str = "\"SM\",";

pub const RING_MARKER: &str = "RING";

/// Calling line identification
pub const CLIP_MARKER: &str = "+CLIP:";

/// Header line of a read-message response
pub const READ_HEADER: &str = "+CMGR:";

/// What a completed line means to the read loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    /// A message was stored on the SIM at `index`
    NewMessage { index: u32 },
    IncomingCall { caller: Option<String> },
    /// Notification the loop does not act on
    Unsolicited(&'a str),
    /// Anything else, matched against the pending command queue
    Response(&'a str),
}

pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }

    if trimmed.contains(NEW_MESSAGE_MARKER) {
        return match sim_message_index(trimmed) {
            Some(index) => LineKind::NewMessage { index },
            None => LineKind::Unsolicited(trimmed),
        };
    }

    if trimmed.contains(CLIP_MARKER) {
        return LineKind::IncomingCall {
            caller: first_quoted(trimmed).map(str::to_string),
        };
    }
    if trimmed.contains(RING_MARKER) {
        return LineKind::IncomingCall { caller: None };
    }

    LineKind::Response(trimmed)
}

fn sim_message_index(line: &str) -> Option<u32> {
    let start = line.find(SIM_STORAGE)? + SIM_STORAGE.len();
    let digits: String = line[start..]
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn first_quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    let value = &line[start..start + len];
    (!value.is_empty()).then_some(value)
}

pub fn read_message_command(index: u32) -> String {
    format!("AT+CMGR={}", index)
}

pub fn delete_message_command(index: u32) -> String {
    format!("AT+CMGD={}", index)
}

/// Extract the PDU from a read-message response: the first non-empty line
/// after the `+CMGR:` header, or after the first line break when no header
/// is present.
pub fn message_body(response: &str) -> Option<&str> {
    let rest = match response.find(READ_HEADER) {
        Some(pos) => {
            let after = &response[pos..];
            &after[after.find('\n')? + 1..]
        }
        None => &response[response.find('\n')? + 1..],
    };

    rest.lines().map(str::trim).find(|line| !line.is_empty())
}
