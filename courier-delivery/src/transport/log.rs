//! Verbose transfer logging to a dated file.

use std::{fmt::Write as _, path::PathBuf, sync::Arc};

use chrono::{NaiveDate, Utc};
use courier_common::tracing;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use super::{TransferResponse, TransportError};
use crate::request::SignedRequest;

/// Appends a record of every request and its outcome to
/// `<dir>/transport_<YYYY-MM-DD>.log`, rolling over at midnight UTC.
///
/// Writing is best effort: failures are reported through tracing and
/// otherwise ignored. Concurrent transfers share the file; each entry is
/// written whole.
#[derive(Debug, Clone)]
pub struct TransferLog {
    dir: PathBuf,
    file: Arc<Mutex<Option<(NaiveDate, File)>>>,
}

impl TransferLog {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            file: Arc::new(Mutex::new(None)),
        }
    }

    /// Path of the log file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("transport_{}.log", date.format("%Y-%m-%d")))
    }

    pub async fn request(&self, request: &SignedRequest) {
        let mut entry = format!("> POST {}\n", request.url);
        for (name, value) in &request.headers {
            let _ = writeln!(entry, "> {name}: {value}");
        }
        let _ = writeln!(
            entry,
            "> ({} byte body for {})",
            request.body.len(),
            request.recipient
        );
        self.write(&entry).await;
    }

    pub async fn response(&self, request: &SignedRequest, response: &TransferResponse) {
        let mut entry = format!("< {} ({})\n", response.status, request.recipient);
        for (name, value) in &response.headers {
            let _ = writeln!(entry, "< {name}: {value}");
        }
        let _ = writeln!(entry, "{}", response.body);
        self.write(&entry).await;
    }

    pub async fn failure(&self, request: &SignedRequest, error: &TransportError) {
        self.write(&format!("* {} ({})\n", error, request.recipient))
            .await;
    }

    async fn write(&self, entry: &str) {
        let now = Utc::now();
        let today = now.date_naive();
        let line = format!("[{}] {entry}", now.to_rfc3339());
        let mut guard = self.file.lock().await;

        if guard.as_ref().is_none_or(|(date, _)| *date != today) {
            let path = self.path_for(today);
            match OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(file) => *guard = Some((today, file)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unable to open transfer log");
                    return;
                }
            }
        }

        if let Some((_, file)) = guard.as_mut() {
            let written = match file.write_all(line.as_bytes()).await {
                Ok(()) => file.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::warn!(error = %e, "Unable to write transfer log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use courier_common::{Envelope, Message};

    use super::*;
    use crate::request::{self, Credentials};

    #[tokio::test]
    async fn test_entries_are_appended_to_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransferLog::new(dir.path().to_path_buf());

        let credentials = Credentials::new("AKID", "secret", "https://email.example.com/").unwrap();
        let message = Message::new(
            ["Subject: hi"],
            "hello",
            Envelope::new("bounce@example.com", "a@x.com").unwrap(),
        );
        let request = request::build(
            &message,
            &credentials,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );

        log.request(&request).await;
        log.response(
            &request,
            &TransferResponse {
                status: 503,
                headers: vec![("x-amzn-requestid".to_string(), "abc".to_string())],
                body: "Throttling".to_string(),
            },
        )
        .await;
        log.failure(&request, &TransportError::Timeout("30s".to_string()))
            .await;

        let contents =
            std::fs::read_to_string(log.path_for(Utc::now().date_naive())).unwrap();
        assert!(contents.contains("> POST https://email.example.com/"));
        assert!(contents.contains("> Host: email.example.com"));
        assert!(contents.contains("< 503 (a@x.com)"));
        assert!(contents.contains("< x-amzn-requestid: abc"));
        assert!(contents.contains("* Transfer timed out: 30s (a@x.com)"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransferLog::new(dir.path().to_path_buf());

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move {
                    let request = SignedRequest {
                        url: url::Url::parse("https://email.example.com/").unwrap(),
                        headers: Vec::new(),
                        body: String::new(),
                        recipient: format!("user{i}@x.com"),
                    };
                    log.failure(&request, &TransportError::Connect("refused".to_string()))
                        .await;
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let contents =
            std::fs::read_to_string(log.path_for(Utc::now().date_naive())).unwrap();
        assert_eq!(contents.lines().count(), 16);
        assert!(
            contents
                .lines()
                .all(|line| line.contains("] * Connection failed: refused (user"))
        );
        for i in 0..16 {
            assert!(contents.contains(&format!("(user{i}@x.com)")));
        }
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_ignored() {
        let log = TransferLog::new(PathBuf::from("/nonexistent/courier/logs"));
        log.failure(
            &SignedRequest {
                url: url::Url::parse("https://email.example.com/").unwrap(),
                headers: Vec::new(),
                body: String::new(),
                recipient: "a@x.com".to_string(),
            },
            &TransportError::Http("boom".to_string()),
        )
        .await;
    }
}
