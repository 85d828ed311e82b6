//! # Cellular Modem Stack
//!
//! Protocol layer for a cellular modem driven over a serial line:
//!
//! - **PDU** - SMS-DELIVER decoding, GSM 7-bit and UCS2 alphabets
//! - **Reassembly** - concatenated SMS segment store
//! - **AT** - command transactions, unsolicited line classification, serial port
//! - **Relay** - line protocol and named-pipe transport to a front-end process
//!
//! ## Example
//! ```rust,ignore
//! use cellular_modem::{pdu, SegmentStore, Delivery};
//!
//! let mut store = SegmentStore::new();
//! let record = pdu::decode(hex, &mut store)?;
//! if let Delivery::Ready(sms) = store.deliver(record) {
//!     println!("{}: {}", sms.sender, sms.content);
//! }
//! ```

pub mod at;
pub mod config;
pub mod errors;
pub mod pdu;
pub mod reassembly;
pub mod relay;
pub mod types;

// Re-exports
pub use at::{ModemPort, ReadOutcome, ScriptedChannel, SerialChannel, SerialWrite};
pub use config::{PipeConfig, SerialConfig};
pub use errors::{PduError, Result};
pub use reassembly::{Delivery, SegmentStore};
pub use relay::{Command, CommandPipe, Message, MessageSink, Role};
pub use types::{Alphabet, SegmentInfo, SmsRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// AT command line terminator
pub const CRLF: &str = "\r\n";
