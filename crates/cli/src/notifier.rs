//! Outbound mail transports.
//!
//! Both transports are fire-and-forget: delivery problems are logged and
//! never reach the scheduler.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use clap::ValueEnum;
use pipeline::Notifier;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Default location of the sendmail-compatible binary.
pub const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";

/// Which transport the binary uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MailerKind {
    /// Write notifications to the log only.
    #[default]
    Log,
    /// Pipe notifications to a sendmail-compatible binary.
    Sendmail,
}

/// Logs each notification instead of sending it.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        info!(to, subject, body, "Notification");
    }
}

/// Pipes an RFC 5322 message to `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    program: PathBuf,
}

impl SendmailNotifier {
    /// Uses the binary at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn deliver(&self, message: &str) -> std::io::Result<std::process::ExitStatus> {
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.as_bytes()).await?;
        }
        child.wait().await
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        match self.deliver(&compose_message(to, subject, body)).await {
            Ok(status) if status.success() => info!(to, subject, "Notification sent"),
            Ok(status) => warn!(to, %status, "Mail transport rejected notification"),
            Err(error) => warn!(
                to,
                %error,
                program = %self.program.display(),
                "Mail transport unavailable"
            ),
        }
    }
}

/// Formats a plain-text message with `To` and `Subject` headers.
pub fn compose_message(to: &str, subject: &str, body: &str) -> String {
    // Header values must stay on one line.
    let one_line = |value: &str| value.replace(['\r', '\n'], " ");
    format!(
        "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{}",
        one_line(to),
        one_line(subject),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_headers_then_body() {
        let message = compose_message("ops@example.com", "[Acme] Done", "line 1\nline 2\n");

        assert_eq!(
            message,
            "To: ops@example.com\r\nSubject: [Acme] Done\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\r\nline 1\nline 2\n"
        );
    }

    #[test]
    fn test_header_injection_is_flattened() {
        let message = compose_message("a@example.com\nBcc: x@example.com", "s", "b");

        assert!(message.starts_with("To: a@example.com Bcc: x@example.com\r\n"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_absorbed() {
        let notifier = SendmailNotifier::new("/nonexistent/sendmail");

        notifier.send("ops@example.com", "subject", "body").await;
    }
}
