//! Orchestrator: modem start-up, the serial read loop and the front-end
//! listener thread
//!
//! The main thread owns the serial reader for the whole run. During start-up
//! it is also the only writer; afterwards only the listener thread writes,
//! through a cloned handle, so the port needs no lock of its own. The
//! pending command queue is the one structure both threads touch.

use cellular_core::{CellularError, ParseError};
use cellular_modem::at::classify::{delete_message_command, read_message_command};
use cellular_modem::at::{
    classify_line, command_line, message_body, transact, LineEvent, LineKind, LineReader,
};
use cellular_modem::{
    pdu, Command, CommandPipe, Delivery, Message, MessageSink, ModemPort, Role, SegmentStore,
    SerialChannel, SerialWrite,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServiceConfig;
use crate::mailer::MailQueue;

/// Liveness probe sent until the modem answers
pub const PROBE_COMMAND: &str = "AT";

/// Echo off, PDU mode, route new-message notifications, report registration
pub const INIT_SCRIPT: [&str; 4] = ["ATE0", "AT+CMGF=0", "AT+CNMI=2,1", "AT+CREG?"];

pub const INCOMING_CALL_PROMPT: &str = "Incoming phone call";

const LISTENER_JOIN_ATTEMPTS: u32 = 20;
const LISTENER_JOIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("modem did not answer after {0} probes")]
    ModemUnresponsive(u32),

    #[error("stop requested during start-up")]
    Stopped,

    #[error(transparent)]
    Cellular(#[from] CellularError),
}

/// Why the read loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    Closed,
    Failed,
}

/// Front-end commands written to the modem and awaiting their response line
#[derive(Debug, Default)]
pub struct PendingQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `command` to the modem and queue it.
    ///
    /// The lock is held across the write so the read loop cannot see the
    /// response before the command is queued.
    pub fn submit<W: SerialWrite + ?Sized>(&self, writer: &mut W, command: Command) -> io::Result<()> {
        let mut commands = self.commands.lock();
        writer.write_all(command_line(&command.command).as_bytes())?;
        commands.push_back(command);
        Ok(())
    }

    pub fn pop(&self) -> Option<Command> {
        self.commands.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

/// Probe the modem until it answers, then run the init script.
///
/// Script commands that fail are logged and skipped.
#[instrument(skip(channel, stop))]
pub fn initialize<C: SerialChannel + ?Sized>(
    channel: &mut C,
    attempts: u32,
    timeout: Duration,
    stop: &AtomicBool,
) -> Result<(), ServiceError> {
    let mut answered = false;
    for attempt in 1..=attempts {
        if stop.load(Ordering::Acquire) {
            return Err(ServiceError::Stopped);
        }
        if transact(channel, PROBE_COMMAND, timeout).is_some() {
            info!(attempt, "Modem answered");
            answered = true;
            break;
        }
        debug!(attempt, attempts, "Modem not answering yet");
    }
    if !answered {
        return Err(ServiceError::ModemUnresponsive(attempts));
    }

    for command in INIT_SCRIPT {
        if stop.load(Ordering::Acquire) {
            return Err(ServiceError::Stopped);
        }
        if transact(channel, command, timeout).is_none() {
            warn!(command, "Init command failed, continuing");
        }
    }

    info!("Modem initialised");
    Ok(())
}

/// Listener-side handler: writes front-end commands to the modem
pub struct CommandForwarder<W> {
    writer: W,
    pending: Arc<PendingQueue>,
}

impl<W: SerialWrite> CommandForwarder<W> {
    pub fn new(writer: W, pending: Arc<PendingQueue>) -> Self {
        Self { writer, pending }
    }

    pub fn forward(&mut self, message: Result<Message, ParseError>) {
        match message {
            Ok(Message::Command(command)) => {
                let text = command.command.clone();
                match self.pending.submit(&mut self.writer, command) {
                    Ok(()) => info!(
                        command = %text,
                        pending = self.pending.len(),
                        "Front-end command written"
                    ),
                    Err(e) => error!(command = %text, error = %e, "Could not write front-end command"),
                }
            }
            Ok(Message::Prompt(text)) => {
                debug!(text = %text, "Prompt from front-end ignored");
            }
            Err(e) => {
                let err = CellularError::from(e);
                warn!(code = err.error_code(), error = %err, "Malformed front-end line");
            }
        }
    }
}

/// Steady-state reader of the serial line
pub struct ReadLoop<C, S: ?Sized> {
    channel: C,
    pending: Arc<PendingQueue>,
    sink: Arc<S>,
    store: SegmentStore,
    mail: MailQueue,
    at_timeout: Duration,
    poll: Duration,
}

impl<C: SerialChannel, S: MessageSink + ?Sized> ReadLoop<C, S> {
    pub fn new(
        channel: C,
        pending: Arc<PendingQueue>,
        sink: Arc<S>,
        store: SegmentStore,
        mail: MailQueue,
        at_timeout: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            channel,
            pending,
            sink,
            store,
            mail,
            at_timeout,
            poll,
        }
    }

    /// Read lines until `stop` is set or the serial line ends.
    ///
    /// `stop` is checked between poll slices.
    pub fn run(&mut self, stop: &AtomicBool) -> LoopExit {
        let mut reader = LineReader::new();
        info!(poll_ms = self.poll.as_millis() as u64, "Read loop started");

        let exit = loop {
            if stop.load(Ordering::Acquire) {
                break LoopExit::Stopped;
            }
            match reader.next_event(&mut self.channel, self.poll) {
                LineEvent::Line(line) => self.handle_line(&line),
                LineEvent::Idle => {}
                LineEvent::Closed => {
                    warn!("Serial port closed");
                    break LoopExit::Closed;
                }
                LineEvent::Failed(e) => {
                    error!(error = %e, "Serial read failed");
                    break LoopExit::Failed;
                }
            }
        };

        info!(exit = ?exit, "Read loop ended");
        exit
    }

    pub fn handle_line(&mut self, line: &str) {
        match classify_line(line) {
            LineKind::Blank => {}
            LineKind::NewMessage { index } => self.fetch_message(index),
            LineKind::IncomingCall { caller } => {
                info!(caller = caller.as_deref().unwrap_or("unknown"), "Incoming call");
                self.notify(&Message::prompt(INCOMING_CALL_PROMPT));
            }
            LineKind::Unsolicited(text) => debug!(line = text, "Notification ignored"),
            LineKind::Response(text) => self.match_response(text),
        }
    }

    fn match_response(&self, line: &str) {
        let Some(command) = self.pending.pop() else {
            warn!(line, "Unparsable content from serial port, no command pending");
            return;
        };

        match command.verify(line) {
            Ok(()) => {
                info!(command = %command.command, response = line, "Front-end command answered");
                self.notify(&Message::prompt(line));
            }
            Err(e) => {
                let err = CellularError::from(e);
                error!(code = err.error_code(), error = %err, "Front-end command failed verification");
            }
        }
    }

    #[instrument(skip(self))]
    fn fetch_message(&mut self, index: u32) {
        info!("New message stored on SIM");
        let Some(response) = transact(&mut self.channel, &read_message_command(index), self.at_timeout)
        else {
            return;
        };

        // The slot is freed before decoding.
        if transact(&mut self.channel, &delete_message_command(index), self.at_timeout).is_none() {
            warn!("Could not delete message from SIM");
        }

        let Some(body) = message_body(&response) else {
            warn!(response = %response.trim(), "Read response carried no PDU");
            return;
        };

        let record = match pdu::decode(body, &mut self.store) {
            Ok(record) => record,
            Err(e) => {
                let err = CellularError::from(e);
                error!(code = err.error_code(), error = %err, "Could not decode message");
                return;
            }
        };

        match self.store.deliver(record) {
            Delivery::Ready(record) => {
                info!(record = %record, "Message received");
                if let Err(SendError(record)) = self.mail.send(record) {
                    warn!(record = %record, "Mail dispatcher gone, message only logged");
                }
            }
            Delivery::Pending { .. } => {}
        }
    }

    fn notify(&self, message: &Message) {
        if let Err(e) = self.sink.send(message) {
            warn!(
                message = %message,
                code = e.error_code(),
                error = %e,
                "Could not relay message to front-end"
            );
        }
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Consume the loop, releasing its relay and mail handles, and return the
    /// serial channel.
    pub fn into_channel(self) -> C {
        self.channel
    }
}

fn spawn_listener<W: SerialWrite + 'static>(
    pipe: Arc<CommandPipe>,
    mut forwarder: CommandForwarder<W>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("frontend-listener".to_string())
        .spawn(move || {
            if let Err(e) = pipe.listen(&stop, |message| forwarder.forward(message)) {
                let err = CellularError::from(e);
                error!(code = err.error_code(), error = %err, "Front-end listener failed");
            }
        })
}

fn stop_listener(pipe: &CommandPipe, handle: JoinHandle<()>) {
    for _ in 0..LISTENER_JOIN_ATTEMPTS {
        pipe.wake_listener();
        if handle.is_finished() {
            match handle.join() {
                Ok(()) => info!("Front-end listener joined"),
                Err(_) => error!("Front-end listener panicked"),
            }
            return;
        }
        thread::sleep(LISTENER_JOIN_INTERVAL);
    }
    warn!("Front-end listener did not stop, detaching");
}

/// Run the daemon until `stop` is set or the serial line ends.
///
/// Blocking; call from a dedicated thread.
pub fn run(
    config: ServiceConfig,
    mail: MailQueue,
    stop: Arc<AtomicBool>,
) -> Result<LoopExit, ServiceError> {
    let mut port = ModemPort::open(&config.serial).map_err(CellularError::from)?;
    info!(
        path = port.path(),
        baud = config.serial.baud_rate,
        "Serial port open"
    );

    initialize(
        &mut port,
        config.probe_attempts,
        config.serial.at_timeout(),
        &stop,
    )?;

    let pipe = Arc::new(CommandPipe::open(&config.pipes, Role::Service).map_err(CellularError::from)?);
    let pending = Arc::new(PendingQueue::new());

    let writer = port.try_clone_writer().map_err(CellularError::from)?;
    let listener = spawn_listener(
        Arc::clone(&pipe),
        CommandForwarder::new(writer, Arc::clone(&pending)),
        Arc::clone(&stop),
    )
    .map_err(CellularError::from)?;
    info!("Daemon is listening to front-end");

    let store = match config.segment_ttl {
        Some(ttl) => SegmentStore::with_ttl(ttl),
        None => SegmentStore::new(),
    };
    let mut read_loop = ReadLoop::new(
        port,
        pending,
        Arc::clone(&pipe),
        store,
        mail,
        config.serial.at_timeout(),
        config.serial.poll_interval(),
    );
    let exit = read_loop.run(&stop);

    stop.store(true, Ordering::Release);
    stop_listener(&pipe, listener);

    let port = read_loop.into_channel();
    drop(pipe);
    drop(port);
    info!("Serial port closed");

    Ok(exit)
}
