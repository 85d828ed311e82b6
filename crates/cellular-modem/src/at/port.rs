//! Serial port adapter

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

use super::{ReadOutcome, SerialChannel, SerialWrite};
use crate::config::SerialConfig;

/// Modem serial line: raw 8N1, no flow control, DTR and RTS asserted.
pub struct ModemPort {
    port: Box<dyn SerialPort>,
    path: String,
    read_timeout: Duration,
}

impl ModemPort {
    pub fn open(config: &SerialConfig) -> io::Result<Self> {
        let mut port = serialport::new(&config.path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(config.poll_interval())
            .open()?;

        port.write_data_terminal_ready(true)?;
        port.write_request_to_send(true)?;

        info!(
            path = %config.path,
            baud_rate = config.baud_rate,
            "Serial port opened"
        );

        Ok(Self {
            port,
            path: config.path.clone(),
            read_timeout: config.poll_interval(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Independent write handle for another thread
    pub fn try_clone_writer(&self) -> io::Result<PortWriter> {
        Ok(PortWriter {
            port: self.port.try_clone()?,
        })
    }
}

impl SerialChannel for ModemPort {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)?;
        self.port.flush()
    }

    fn read_byte(&mut self, timeout: Duration) -> ReadOutcome {
        if timeout != self.read_timeout {
            if let Err(e) = self.port.set_timeout(timeout) {
                return ReadOutcome::Error(e.into());
            }
            self.read_timeout = timeout;
        }

        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => ReadOutcome::Closed,
            Ok(_) => ReadOutcome::Byte(byte[0]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                ReadOutcome::Timeout
            }
            Err(e) => ReadOutcome::Error(e),
        }
    }
}

/// Write half of a [`ModemPort`]
pub struct PortWriter {
    port: Box<dyn SerialPort>,
}

impl SerialWrite for PortWriter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)?;
        self.port.flush()
    }
}
