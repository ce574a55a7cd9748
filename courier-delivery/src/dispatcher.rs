//! Strategy selection between direct and pooled delivery.

use chrono::Utc;
use courier_common::{Message, internal, tracing};

use crate::{
    accounting::Totals,
    config::{DeliveryConfig, DispatchMode},
    error::DeliveryError,
    pool::CallPool,
    request::{self, Credentials},
    transport::{Connect, HttpConnector, Transport},
};

/// How a message was accepted by [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Sent directly and answered with 200.
    Delivered,
    /// Admitted into the call pool; the outcome is only known on drain.
    Queued,
}

/// Sends messages one at a time or through a bounded pool of concurrent
/// transfers, depending on the configured [`DispatchMode`].
///
/// All methods take `&mut self`: a dispatcher is driven by a single caller.
/// Call [`shutdown`](Self::shutdown), or use [`scoped`](Self::scoped), so that
/// queued transfers are accounted for before the dispatcher goes away.
pub struct Dispatcher<C: Connect = HttpConnector> {
    connector: C,
    credentials: Credentials,
    mode: DispatchMode,
    /// Handle reused between sequential sends until one of them fails
    sequential: Option<C::Handle>,
    pool: CallPool<C::Handle>,
}

impl Dispatcher<HttpConnector> {
    /// A dispatcher talking HTTP to the configured endpoint.
    ///
    /// # Errors
    ///
    /// If the credentials or endpoint are invalid.
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        Self::new(config, HttpConnector::new(config))
    }
}

impl<C: Connect> Dispatcher<C> {
    /// # Errors
    ///
    /// If the credentials or endpoint are invalid.
    pub fn new(config: &DeliveryConfig, connector: C) -> Result<Self, DeliveryError> {
        let credentials = config.credentials()?;
        let pool = CallPool::new(config.bounded_concurrency_limit(), config.sequence_log_path());

        internal!(
            level = DEBUG,
            mode = ?config.mode,
            limit = pool.limit(),
            endpoint = %credentials.endpoint(),
            "Dispatcher ready"
        );

        Ok(Self {
            connector,
            credentials,
            mode: config.mode,
            sequential: None,
            pool,
        })
    }

    /// Send a message, reporting any failure through the log.
    ///
    /// In concurrent mode `true` only means the message was queued.
    pub async fn send(&mut self, message: &Message) -> bool {
        match self.dispatch(message).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    recipient = message.envelope().recipient(),
                    error = %e,
                    "Unable to send message"
                );
                false
            }
        }
    }

    /// Send a message with the current strategy.
    ///
    /// # Errors
    ///
    /// If no transport handle can be created, or, in sequential mode, if the
    /// API does not answer with 200.
    pub async fn dispatch(&mut self, message: &Message) -> Result<Acceptance, DeliveryError> {
        match self.mode {
            DispatchMode::Sequential => self.deliver(message).await.map(|()| Acceptance::Delivered),
            DispatchMode::Concurrent => self.enqueue(message).await.map(|()| Acceptance::Queued),
        }
    }

    async fn deliver(&mut self, message: &Message) -> Result<(), DeliveryError> {
        let handle = match self.sequential.take() {
            Some(handle) => handle,
            None => self.connector.connect()?,
        };

        let request = request::build(message, &self.credentials, Utc::now());

        // The handle is only put back after a success; any failure drops it
        // and the next send connects afresh.
        match handle.execute(&request).await {
            Ok(response) if response.is_success() => {
                self.sequential = Some(handle);
                Ok(())
            }
            Ok(response) => Err(DeliveryError::Rejected {
                status: response.status,
                recipient: request.recipient,
                body: strip_tags(&response.body),
            }),
            Err(source) => Err(DeliveryError::Network {
                recipient: request.recipient,
                source,
            }),
        }
    }

    async fn enqueue(&mut self, message: &Message) -> Result<(), DeliveryError> {
        if !self.pool.is_started() {
            self.pool.start(self.connector.connect()?);
        }

        let credentials = &self.credentials;
        self.pool
            .admit(|| request::build(message, credentials, Utc::now()))
            .await
    }

    /// Drain the call pool and return the final totals.
    ///
    /// Later sends use the sequential strategy. Calling this again does
    /// nothing more.
    pub async fn shutdown(&mut self) -> Totals {
        let totals = self.pool.drain().await;
        self.mode = DispatchMode::Sequential;
        totals
    }

    /// Run `f` with this dispatcher, then shut it down.
    pub async fn scoped<F, R>(mut self, f: F) -> (R, Totals)
    where
        F: AsyncFnOnce(&mut Self) -> R,
    {
        let result = f(&mut self).await;
        let totals = self.shutdown().await;
        (result, totals)
    }

    /// Totals of the pooled transfers consumed so far.
    pub const fn totals(&self) -> Totals {
        self.pool.totals()
    }

    /// Number of queued transfers not yet accounted for.
    pub fn in_flight(&self) -> usize {
        self.pool.len()
    }

    pub const fn mode(&self) -> DispatchMode {
        self.mode
    }
}

impl<C: Connect> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        if !self.pool.is_empty() {
            tracing::error!(
                abandoned = self.pool.len(),
                "Dispatcher dropped without shutdown, {} queued transfers will not be accounted for",
                self.pool.len()
            );
        }
    }
}

/// Reduce an HTML/XML response body to its text, for logging.
fn strip_tags(body: &str) -> String {
    let mut text = String::with_capacity(body.len());
    let mut in_tag = false;

    for c in body.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
