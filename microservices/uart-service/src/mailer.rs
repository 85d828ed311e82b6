//! Mail delivery of decoded messages
//!
//! The read loop runs on a blocking thread and hands records to an async
//! worker over an unbounded channel, so SMTP latency never stalls the
//! serial line.

use cellular_core::{EmailError, MailConfig, MailSettings};
use cellular_modem::SmsRecord;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Sender half handed to the read loop
pub type MailQueue = mpsc::UnboundedSender<SmsRecord>;

enum MailerState {
    Ready {
        config: MailConfig,
        transport: AsyncSmtpTransport<Tokio1Executor>,
    },
    Disabled(String),
}

/// SMTP client for decoded messages
pub struct Mailer {
    state: MailerState,
}

impl Mailer {
    pub fn new(settings: MailSettings) -> Self {
        let state = match settings {
            MailSettings::Valid(config) => match build_transport(&config) {
                Ok(transport) => MailerState::Ready { config, transport },
                Err(reason) => {
                    warn!(server = %config.sender.server, reason = %reason, "Mail transport unusable");
                    MailerState::Disabled(reason)
                }
            },
            MailSettings::Invalid(reason) => MailerState::Disabled(reason),
        };
        Self { state }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, MailerState::Ready { .. })
    }

    /// Build the mail for a record without sending it
    pub fn compose(&self, record: &SmsRecord) -> Result<Email, EmailError> {
        match &self.state {
            MailerState::Ready { config, .. } => compose(config, record),
            MailerState::Disabled(reason) => Err(EmailError::NotConfigured(reason.clone())),
        }
    }

    pub async fn send(&self, record: &SmsRecord) -> Result<(), EmailError> {
        let (config, transport) = match &self.state {
            MailerState::Ready { config, transport } => (config, transport),
            MailerState::Disabled(reason) => {
                return Err(EmailError::NotConfigured(reason.clone()))
            }
        };

        let email = compose(config, record)?;
        transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| EmailError::Transport {
                code: e.status().map(|code| code.to_string()),
                description: e.to_string(),
            })
    }
}

fn build_transport(config: &MailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    let builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&config.sender.server)
        .map_err(|e| format!("invalid server URI {}: {}", config.sender.server, e))?;

    Ok(builder
        .credentials(Credentials::new(
            config.sender.mailbox.email.clone(),
            config.sender.password.clone(),
        ))
        .build())
}

fn parse_mailbox(role: &str, text: &str) -> Result<Mailbox, EmailError> {
    text.parse()
        .map_err(|e| EmailError::Compose(format!("{} mailbox {:?}: {}", role, text, e)))
}

/// Subject names the sender; the body carries the text and its metadata.
pub fn compose(config: &MailConfig, record: &SmsRecord) -> Result<Email, EmailError> {
    let from = parse_mailbox("sender", &config.sender.mailbox.mailbox())?;
    let to = parse_mailbox("receiver", &config.receiver.mailbox())?;

    let mut body = record.content.clone();
    body.push_str("\n\n--\n");
    body.push_str(&format!("From: {}\nSent: {}\n", record.sender, record.timestamp));
    if let Some(smsc) = &record.smsc {
        body.push_str(&format!("SMSC: {}\n", smsc));
    }

    Email::builder()
        .from(from)
        .to(to)
        .subject(format!("SMS from {}", record.sender))
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| EmailError::Compose(e.to_string()))
}

/// Start the delivery worker. It stops once every [`MailQueue`] is dropped
/// and the backlog is drained.
pub fn spawn_dispatcher(mailer: Mailer) -> (MailQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_dispatcher(mailer, rx));
    (tx, handle)
}

async fn run_dispatcher(mailer: Mailer, mut rx: mpsc::UnboundedReceiver<SmsRecord>) {
    info!(enabled = mailer.is_enabled(), "Mail dispatcher started");

    while let Some(record) = rx.recv().await {
        match mailer.send(&record).await {
            Ok(()) => info!(sender = %record.sender, "Message mailed"),
            Err(EmailError::NotConfigured(reason)) => info!(
                reason = %reason,
                record = %record,
                "Mail not configured, message logged only"
            ),
            Err(e @ EmailError::Compose(_)) => warn!(
                error = %e,
                record = %record,
                "Could not compose mail"
            ),
            Err(EmailError::Transport { code, description }) => error!(
                code = code.as_deref().unwrap_or("none"),
                description = %description,
                record = %record,
                "Mail transport failed"
            ),
        }
    }

    info!("Mail dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MailSettings {
        MailSettings::parse(
            r#"
sender: { name: Modem, email: modem@example.com, server: "smtp://127.0.0.1:1", password: pw }
receiver: { name: Me, email: me@example.com }
"#,
        )
    }

    fn record() -> SmsRecord {
        SmsRecord {
            smsc: Some("8613800250500".to_string()),
            sender: "8613912345678".to_string(),
            timestamp: "25/01/17,15:20:43".to_string(),
            content: "你好, world".to_string(),
            is_segment: false,
            reference: 0,
        }
    }

    #[tokio::test]
    async fn test_compose_headers_and_body() {
        let mailer = Mailer::new(settings());
        assert!(mailer.is_enabled());

        let email = mailer.compose(&record()).unwrap();
        let text = String::from_utf8(email.formatted()).unwrap();
        assert!(text.contains("<modem@example.com>"));
        assert!(text.contains("<me@example.com>"));
        assert!(text.contains("Subject: SMS from 8613912345678"));
    }

    #[tokio::test]
    async fn test_disabled_mailer_reports_not_configured() {
        let mailer = Mailer::new(MailSettings::Invalid("no file".to_string()));
        assert!(!mailer.is_enabled());

        let err = mailer.send(&record()).await.unwrap_err();
        assert!(matches!(err, EmailError::NotConfigured(ref r) if r == "no file"));
        assert!(err.is_before_transmission());
    }

    #[tokio::test]
    async fn test_bad_server_uri_disables_mailer() {
        let settings = MailSettings::parse(
            "sender: { email: a@b.c, server: 'not a url', password: x }\nreceiver: { email: c@d.e }\n",
        );
        let mailer = Mailer::new(settings);
        assert!(!mailer.is_enabled());
    }

    #[tokio::test]
    async fn test_bad_address_is_compose_error() {
        let settings = MailSettings::parse(
            "sender: { email: 'not an address', server: 'smtp://127.0.0.1:1', password: x }\nreceiver: { email: c@d.e }\n",
        );
        let mailer = Mailer::new(settings);
        let err = mailer.compose(&record()).unwrap_err();
        assert!(matches!(err, EmailError::Compose(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let mailer = Mailer::new(settings());
        let err = mailer.send(&record()).await.unwrap_err();
        assert!(matches!(err, EmailError::Transport { .. }));
        assert!(!err.is_before_transmission());
    }

    #[tokio::test]
    async fn test_dispatcher_drains_and_stops() {
        let (queue, worker) = spawn_dispatcher(Mailer::new(MailSettings::Invalid("off".into())));
        queue.send(record()).unwrap();
        drop(queue);
        tokio::time::timeout(std::time::Duration::from_secs(2), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
