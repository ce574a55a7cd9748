//! Mock SES endpoint for exercising the HTTP transport.
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! Speaks just enough HTTP/1.1 to accept a form POST and answer it. Every
//! request is recorded; the status can be set globally or per recipient, and
//! responses can be delayed.
//!
//! ```rust,no_run
//! use support::MockSesServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSesServer::builder()
//!     .with_recipient_status("blocked@example.com", 400)
//!     .build()
//!     .await?;
//!
//! // Point the endpoint at server.endpoint()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use courier_common::tracing;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// A request received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lower-cased
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn form_field(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn recipient(&self) -> Option<String> {
        self.form_field("Destinations.member.1")
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    status: u16,
    recipient_status: HashMap<String, u16>,
    response_delay: Option<Duration>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            status: 200,
            recipient_status: HashMap::new(),
            response_delay: None,
        }
    }
}

impl MockServerConfig {
    fn status_for(&self, request: &ReceivedRequest) -> u16 {
        request
            .recipient()
            .and_then(|recipient| self.recipient_status.get(&recipient).copied())
            .unwrap_or(self.status)
    }
}

/// Mock SES server for testing
pub struct MockSesServer {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<ReceivedRequest>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSesServer {
    #[must_use]
    pub fn builder() -> MockSesServerBuilder {
        MockSesServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Endpoint URL to configure the dispatcher with
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// All requests received so far, in arrival order
    pub async fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        requests: Arc<RwLock<Vec<ReceivedRequest>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let mut request_line = line.split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;

        let request = ReceivedRequest {
            method,
            path,
            headers,
            body: String::from_utf8(body)?,
        };
        tracing::debug!("Mock server received: {:?}", request.recipient());

        let status = config.status_for(&request);
        requests.write().await.push(request);

        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }

        let body = if status == 200 {
            "<SendRawEmailResponse><SendRawEmailResult><MessageId>mock</MessageId></SendRawEmailResult></SendRawEmailResponse>".to_string()
        } else {
            format!("<ErrorResponse><Error><Code>Mock{status}</Code><Message>Rejected by mock</Message></Error></ErrorResponse>")
        };
        let response = format!(
            "HTTP/1.1 {status} Mock\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// Builder for configuring a `MockSesServer`
pub struct MockSesServerBuilder {
    config: MockServerConfig,
}

impl MockSesServerBuilder {
    /// Status for every recipient without an override
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.config.status = status;
        self
    }

    #[must_use]
    pub fn with_recipient_status(mut self, recipient: impl Into<String>, status: u16) -> Self {
        self.config.recipient_status.insert(recipient.into(), status);
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Build and start the mock server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSesServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let requests = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let requests_clone = Arc::clone(&requests);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is noticed
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let requests = Arc::clone(&requests_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSesServer::handle_client(stream, config, requests).await {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSesServer {
            addr,
            requests,
            shutdown,
        })
    }
}
