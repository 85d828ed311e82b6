//! Cellular UART Service
//!
//! Daemon driving a cellular modem over a serial line:
//! - Modem start-up and AT command handling
//! - SMS retrieval, PDU decoding and concatenated-message reassembly
//! - Mail delivery of received messages
//! - Command relay to a front-end process over named pipes

use cellular_core::{install_crash_handlers, wait_for_shutdown, MailSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod mailer;
mod service;

use config::ServiceConfig;
use mailer::Mailer;

/// Time the mail worker gets to drain its backlog at exit
const MAIL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cellular_telemetry::init("uart-service")?;
    install_crash_handlers()?;

    info!(version = cellular_modem::VERSION, "Starting cellular UART service");

    let config = ServiceConfig::from_env()?;
    info!(
        serial = %config.serial.path,
        baud = config.serial.baud_rate,
        pipes = %config.pipes.dir.display(),
        "Configuration loaded"
    );

    let mailer = Mailer::new(MailSettings::load(&config.mail_config));
    let (mail_queue, mail_worker) = mailer::spawn_dispatcher(mailer);

    let stop = Arc::new(AtomicBool::new(false));
    let mut daemon = tokio::task::spawn_blocking({
        let stop = Arc::clone(&stop);
        move || service::run(config, mail_queue, stop)
    });

    let finished = tokio::select! {
        res = &mut daemon => Some(res),
        signal = wait_for_shutdown() => {
            if let Err(e) = signal {
                error!(error = %e, "Signal listener failed, shutting down");
            }
            None
        }
    };
    let outcome = match finished {
        Some(res) => res,
        None => {
            stop.store(true, Ordering::Release);
            daemon.await
        }
    };

    let result = match outcome {
        Ok(Ok(exit)) => {
            info!(exit = ?exit, "Service stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Service failed");
            Err(e.into())
        }
        Err(e) => Err(anyhow::anyhow!("service thread failed: {}", e)),
    };

    match tokio::time::timeout(MAIL_DRAIN_TIMEOUT, mail_worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Mail dispatcher failed"),
        Err(_) => warn!("Mail dispatcher still busy, abandoning backlog"),
    }

    result
}
