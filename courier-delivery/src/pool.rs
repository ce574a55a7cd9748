//! The concurrent call pool.
//!
//! A strict sliding window over in-flight requests. Calls are admitted in
//! order into a FIFO; when the window is full the *oldest* call is awaited and
//! accounted for before the new one is admitted. Retirement is always in
//! admission order, never in completion order, so a fast call queued behind a
//! slow one is only accounted for after the slow one.
//!
//! ```text
//! admit ─▶ [ C1 | C2 | .. | Cn ] ─▶ consume_oldest ─▶ Accounting
//!            ▲ back          front ▲
//! ```
//!
//! Every admitted call is consumed exactly once: either to make room for a
//! later admission, or by [`CallPool::drain`].

use std::{collections::VecDeque, path::PathBuf, sync::Arc, time::Instant};

use courier_common::{incoming, internal, outgoing, tracing};
use tokio::task::JoinHandle;

use crate::{
    accounting::{Accounting, Totals, TransferRecord},
    error::DeliveryError,
    request::SignedRequest,
    transport::{TransferResponse, Transport, TransportError},
};

/// Result of one transfer, as produced by its task.
struct Transfer {
    outcome: Result<TransferResponse, TransportError>,
    started: Instant,
    finished: Instant,
}

/// An admitted call that has not been consumed yet.
struct InFlightCall {
    sequence: u64,
    recipient: String,
    epoch: Instant,
    transfer: JoinHandle<Transfer>,
}

/// The transport handle shared by every transfer of one pool lifetime.
struct TransferManager<T> {
    handle: Arc<T>,
    epoch: Instant,
}

/// A bounded FIFO of in-flight transfers sharing one transport handle.
///
/// Started lazily with [`start`](Self::start), filled with
/// [`admit`](Self::admit) and emptied by [`drain`](Self::drain), after which
/// it can be started again. Totals survive restarts.
pub struct CallPool<T> {
    limit: usize,
    calls: VecDeque<InFlightCall>,
    manager: Option<TransferManager<T>>,
    admitted: u64,
    accounting: Accounting,
    sequence_log: Option<PathBuf>,
}

impl<T> CallPool<T>
where
    T: Transport + 'static,
{
    /// A stopped pool holding at most `limit` calls.
    ///
    /// With a `sequence_log` path, every consumed call is retained and the
    /// rendered sequence is written there on drain.
    pub fn new(limit: usize, sequence_log: Option<PathBuf>) -> Self {
        Self {
            limit: limit.max(1),
            calls: VecDeque::with_capacity(limit),
            manager: None,
            admitted: 0,
            accounting: Accounting::new(sequence_log.is_some()),
            sequence_log,
        }
    }

    /// Whether a transfer manager is installed.
    pub const fn is_started(&self) -> bool {
        self.manager.is_some()
    }

    /// Install the transport handle all transfers will share.
    pub fn start(&mut self, handle: T) {
        internal!(level = DEBUG, limit = self.limit, "Starting call pool");
        self.manager = Some(TransferManager {
            handle: Arc::new(handle),
            epoch: Instant::now(),
        });
    }

    /// Admit a call, first retiring the oldest one if the pool is full.
    ///
    /// `build` runs once there is room, so a request signed with the current
    /// time is not left waiting behind the oldest call.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::PoolNotStarted`] if [`start`](Self::start) has not been
    /// called since the last drain.
    pub async fn admit<F>(&mut self, build: F) -> Result<(), DeliveryError>
    where
        F: FnOnce() -> SignedRequest,
    {
        if self.manager.is_none() {
            return Err(DeliveryError::PoolNotStarted);
        }

        if self.calls.len() >= self.limit {
            self.consume_oldest().await;
        }

        let Some(manager) = &self.manager else {
            return Err(DeliveryError::PoolNotStarted);
        };

        let request = build();
        let sequence = self.admitted;
        self.admitted += 1;

        let recipient = request.recipient.clone();
        let handle = Arc::clone(&manager.handle);

        outgoing!(
            level = DEBUG,
            sequence,
            recipient = %recipient,
            in_flight = self.calls.len() + 1,
            "Admitting call"
        );

        let transfer = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = handle.execute(&request).await;
            Transfer {
                outcome,
                started,
                finished: Instant::now(),
            }
        });

        self.calls.push_back(InFlightCall {
            sequence,
            recipient,
            epoch: manager.epoch,
            transfer,
        });

        Ok(())
    }

    /// Wait for the oldest call, account for it and remove it from the pool.
    ///
    /// Returns `None` if the pool is empty.
    pub async fn consume_oldest(&mut self) -> Option<TransferRecord> {
        let call = self.calls.pop_front()?;
        let epoch = call.epoch;

        let record = match call.transfer.await {
            Ok(transfer) => {
                let (status, error) = match transfer.outcome {
                    Ok(response) => (response.status, None),
                    Err(e) => (0, Some(e.to_string())),
                };

                TransferRecord {
                    sequence: call.sequence,
                    recipient: call.recipient,
                    status,
                    error,
                    started: transfer.started.saturating_duration_since(epoch),
                    finished: transfer.finished.saturating_duration_since(epoch),
                }
            }
            Err(e) => {
                let now = Instant::now().saturating_duration_since(epoch);
                TransferRecord {
                    sequence: call.sequence,
                    recipient: call.recipient,
                    status: 0,
                    error: Some(TransportError::Aborted(e.to_string()).to_string()),
                    started: now,
                    finished: now,
                }
            }
        };

        incoming!(
            level = DEBUG,
            sequence = record.sequence,
            recipient = %record.recipient,
            status = record.status,
            "Consumed call"
        );

        self.accounting.record(record.clone());
        Some(record)
    }

    /// Consume every remaining call, report the totals and stop the pool.
    ///
    /// Failed calls never interrupt the drain. Draining a stopped, empty pool
    /// does nothing.
    pub async fn drain(&mut self) -> Totals {
        if self.manager.is_none() && self.calls.is_empty() {
            return self.accounting.totals();
        }

        internal!(level = DEBUG, in_flight = self.calls.len(), "Draining call pool");
        while self.consume_oldest().await.is_some() {}

        if let Some(path) = &self.sequence_log {
            if let Err(e) = tokio::fs::write(path, self.accounting.render_sequence()).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Unable to write transfer sequence"
                );
            }
            self.accounting.clear_sequence();
        }

        let totals = self.accounting.totals();
        internal!(
            level = INFO,
            "SES concurrent successes: {}, failures: {}",
            totals.success,
            totals.failure
        );

        self.manager = None;
        totals
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of calls admitted over the pool's lifetime.
    pub const fn admitted(&self) -> u64 {
        self.admitted
    }

    pub const fn totals(&self) -> Totals {
        self.accounting.totals()
    }

    /// Recipients of the in-flight calls, oldest first.
    pub fn in_flight(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|call| call.recipient.as_str())
    }

    /// Consumed calls retained for the sequence log, in consumption order.
    pub fn consumed(&self) -> &[TransferRecord] {
        self.accounting.sequence()
    }
}
