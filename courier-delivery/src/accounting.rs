//! Success/failure accounting for the concurrent strategy, plus the transfer
//! sequence diagnostic written when the pool drains.

use std::{fmt::Write as _, time::Duration};

use courier_common::tracing;

/// Width, in columns, of the timeline in a rendered transfer sequence.
const TIMELINE_WIDTH: usize = 60;

/// Running totals. Never decrease.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub success: u64,
    pub failure: u64,
}

impl Totals {
    pub const fn total(&self) -> u64 {
        self.success + self.failure
    }
}

/// One consumed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Admission order, starting at 0
    pub sequence: u64,
    pub recipient: String,
    /// HTTP status, or 0 if no response was received
    pub status: u16,
    pub error: Option<String>,
    /// Offset of the transfer start from the first admission
    pub started: Duration,
    /// Offset of the transfer end from the first admission
    pub finished: Duration,
}

impl TransferRecord {
    pub const fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Default)]
pub struct Accounting {
    totals: Totals,
    keep_sequence: bool,
    sequence: Vec<TransferRecord>,
}

impl Accounting {
    /// `keep_sequence` retains every record for [`render_sequence`](Self::render_sequence).
    pub fn new(keep_sequence: bool) -> Self {
        Self {
            keep_sequence,
            ..Default::default()
        }
    }

    /// Count a consumed call.
    pub fn record(&mut self, record: TransferRecord) {
        if record.is_success() {
            self.totals.success += 1;
        } else {
            self.totals.failure += 1;
            tracing::warn!(
                status = record.status,
                recipient = %record.recipient,
                error = record.error.as_deref().unwrap_or_default(),
                "SES status {} email {}",
                record.status,
                record.recipient
            );
        }

        if self.keep_sequence {
            self.sequence.push(record);
        }
    }

    pub const fn totals(&self) -> Totals {
        self.totals
    }

    /// Records in consumption order, if retained.
    pub fn sequence(&self) -> &[TransferRecord] {
        &self.sequence
    }

    /// Forget the retained records; totals are kept.
    pub fn clear_sequence(&mut self) {
        self.sequence.clear();
    }

    /// Render the retained records as an ASCII timeline, one row per call in
    /// consumption order.
    ///
    /// ```text
    /// #0     |=========                   |  200 a@x.com
    /// #1     |  ===                       |  503 b@x.com
    /// ```
    pub fn render_sequence(&self) -> String {
        let span = self
            .sequence
            .iter()
            .map(|record| record.finished)
            .max()
            .unwrap_or_default()
            .max(Duration::from_millis(1));

        let mut out = format!(
            "{} transfers over {} ms, successes: {}, failures: {}\n",
            self.sequence.len(),
            span.as_millis(),
            self.totals.success,
            self.totals.failure
        );

        for record in &self.sequence {
            let start = column(record.started, span).min(TIMELINE_WIDTH - 1);
            let end = column(record.finished, span).clamp(start + 1, TIMELINE_WIDTH);

            let _ = writeln!(
                out,
                "#{:<5} |{}{}{}| {:>4} {}{}",
                record.sequence,
                " ".repeat(start),
                "=".repeat(end - start),
                " ".repeat(TIMELINE_WIDTH - end),
                record.status,
                record.recipient,
                record
                    .error
                    .as_deref()
                    .map_or_else(String::new, |e| format!(" ({e})")),
            );
        }

        out
    }
}

fn column(offset: Duration, span: Duration) -> usize {
    let scaled = offset.as_micros() * TIMELINE_WIDTH as u128 / span.as_micros().max(1);
    usize::try_from(scaled).unwrap_or(TIMELINE_WIDTH)
}
