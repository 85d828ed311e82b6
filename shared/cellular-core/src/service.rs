//! Process runtime helpers shared by the daemon binaries

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;
use std::backtrace::Backtrace;
use std::ffi::c_int;
use std::os::fd::AsFd;
use tokio::signal as tokio_signal;
use tracing::{error, info};

/// Signals that indicate a fault in the process itself.
pub const FAULT_SIGNALS: [Signal; 5] = [
    Signal::SIGSEGV,
    Signal::SIGABRT,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGBUS,
];

/// Resolve once Ctrl-C or SIGTERM has been received.
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = tokio_signal::unix::signal(tokio_signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio_signal::ctrl_c() => res?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio_signal::ctrl_c().await?;

    info!("Shutdown signal received");
    Ok(())
}

fn write_stderr(bytes: &[u8]) {
    let _ = unistd::write(std::io::stderr().as_fd(), bytes);
}

/// SIGABRT may be raised from inside the allocator, where capturing a
/// backtrace would deadlock on the heap lock.
fn captures_backtrace(sig: Option<Signal>) -> bool {
    !matches!(sig, Some(Signal::SIGABRT))
}

extern "C" fn on_fault(signo: c_int) {
    let sig = Signal::try_from(signo).ok();
    write_stderr(b"Fatal signal ");
    write_stderr(sig.map(Signal::as_str).unwrap_or("unknown").as_bytes());

    if captures_backtrace(sig) {
        write_stderr(b", backtrace:\n");
        let trace = Backtrace::force_capture().to_string();
        write_stderr(trace.as_bytes());
        write_stderr(b"\n");
    } else {
        write_stderr(b", backtrace not captured\n");
    }

    // SA_RESETHAND restored the default disposition on entry.
    if let Some(sig) = sig {
        let _ = signal::raise(sig);
    }
}

/// Install fault-signal handlers that dump a backtrace before re-raising,
/// and a panic hook that logs the panic with its backtrace.
pub fn install_crash_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_fault),
        SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER,
        SigSet::empty(),
    );
    for sig in FAULT_SIGNALS {
        // SAFETY: the handler only writes to stderr and re-raises with the
        // default disposition restored.
        unsafe { signal::sigaction(sig, &action) }?;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(
            thread = std::thread::current().name().unwrap_or("<unnamed>"),
            backtrace = %Backtrace::force_capture(),
            "Panic: {}",
            panic_info
        );
        previous(panic_info);
    }));

    Ok(())
}
