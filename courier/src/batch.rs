//! Reading message files and feeding them to a dispatcher.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use courier_common::{Envelope, Message, internal};
use courier_delivery::{Connect, Dispatcher, Totals};

/// Every file, sent to every recipient, from one envelope sender.
#[derive(Debug, Clone)]
pub struct Batch {
    pub sender: String,
    pub recipients: Vec<String>,
    pub files: Vec<PathBuf>,
}

/// Outcome of [`Batch::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Messages handed to the dispatcher
    pub attempted: u64,
    /// Messages for which `send` reported failure
    pub refused: u64,
    /// Final totals of the pooled transfers
    pub totals: Totals,
}

impl Report {
    /// Every failure, whether reported by `send` or found on drain.
    pub const fn failures(&self) -> u64 {
        self.refused + self.totals.failure
    }
}

impl Batch {
    /// Parse every file once per recipient.
    ///
    /// # Errors
    ///
    /// If a file cannot be read, an address is invalid, or a file has no
    /// header/body separator.
    pub async fn messages(&self) -> anyhow::Result<Vec<Message>> {
        let envelopes = self
            .recipients
            .iter()
            .map(|recipient| {
                Envelope::new(&self.sender, recipient)
                    .with_context(|| format!("Invalid envelope {} -> {recipient}", self.sender))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut messages = Vec::with_capacity(self.files.len() * envelopes.len());
        for file in &self.files {
            let raw = read(file).await?;
            for envelope in &envelopes {
                let message = Message::parse(&raw, envelope.clone())
                    .with_context(|| format!("Unable to parse {}", file.display()))?;
                messages.push(message);
            }
        }

        Ok(messages)
    }

    /// Send the whole batch, then drain the dispatcher.
    ///
    /// Messages are only read before anything is sent; once sending starts
    /// the dispatcher is always shut down, and failures are only counted.
    ///
    /// # Errors
    ///
    /// If the messages cannot be built.
    pub async fn run<C: Connect>(&self, dispatcher: Dispatcher<C>) -> anyhow::Result<Report> {
        let messages = self.messages().await?;
        internal!(
            level = INFO,
            files = self.files.len(),
            recipients = self.recipients.len(),
            "Sending {} messages",
            messages.len()
        );

        let ((attempted, refused), totals) = dispatcher
            .scoped(async |dispatcher| {
                let (mut attempted, mut refused) = (0, 0);
                for message in &messages {
                    attempted += 1;
                    if !dispatcher.send(message).await {
                        refused += 1;
                    }
                }
                (attempted, refused)
            })
            .await;

        Ok(Report {
            attempted,
            refused,
            totals,
        })
    }
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
