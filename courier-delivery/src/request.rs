//! Building signed `SendRawEmail` requests.
//!
//! SES accepts the legacy `AWS3-HTTPS` scheme for its query API: the `Date`
//! header is signed with HMAC-SHA256 under the secret key and the signature is
//! carried in `X-Amzn-Authorization`.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use courier_common::Message;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

pub const ACTION: &str = "SendRawEmail";
pub const ALGORITHM: &str = "HmacSHA256";
pub const AUTHORIZATION_HEADER: &str = "X-Amzn-Authorization";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Access key, keyed signer and endpoint for the API.
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    signer: HmacSha256,
    endpoint: Url,
    host: String,
}

impl Credentials {
    /// # Errors
    ///
    /// Returns an error if a key is empty, or the endpoint is not an absolute
    /// `http`/`https` URL with a host.
    pub fn new(access_key: &str, secret_key: &str, endpoint: &str) -> Result<Self, ConfigError> {
        if access_key.is_empty() {
            return Err(ConfigError::MissingField("access_key"));
        }
        if secret_key.is_empty() {
            return Err(ConfigError::MissingField("secret_key"));
        }

        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidConfiguration {
            field: "endpoint",
            reason: e.to_string(),
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidConfiguration {
                field: "endpoint",
                reason: format!("unsupported scheme {}", endpoint.scheme()),
            });
        }

        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConfigError::InvalidConfiguration {
                    field: "endpoint",
                    reason: "no host".to_string(),
                });
            }
        };

        let signer = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|e| {
            ConfigError::InvalidConfiguration {
                field: "secret_key",
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            access_key: access_key.to_string(),
            signer,
            endpoint,
            host,
        })
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Value of the `Host` header, including a non-default port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Base64 HMAC-SHA256 of `date` keyed by the secret key.
    pub fn sign(&self, date: &str) -> String {
        let mut mac = self.signer.clone();
        mac.update(date.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// A request ready for the transport. Built per attempt and then dropped.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: Url,
    /// Headers in the order they are sent
    pub headers: Vec<(&'static str, String)>,
    /// `application/x-www-form-urlencoded` payload
    pub body: String,
    /// Recipient, kept for diagnostics
    pub recipient: String,
}

impl SignedRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decode one field of the form body.
    pub fn form_field(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Build the signed `SendRawEmail` request for `message` at `timestamp`.
pub fn build(message: &Message, credentials: &Credentials, timestamp: DateTime<Utc>) -> SignedRequest {
    let envelope = message.envelope();
    let raw_message = STANDARD.encode(message.to_raw());

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("Action", ACTION)
        .append_pair("Source", envelope.sender())
        .append_pair("Destinations.member.1", envelope.recipient())
        .append_pair("RawMessage.Data", &raw_message)
        .finish();

    let date = timestamp.to_rfc2822();
    let authorization = format!(
        "AWS3-HTTPS AWSAccessKeyId={},Algorithm={ALGORITHM},Signature={}",
        credentials.access_key(),
        credentials.sign(&date),
    );

    SignedRequest {
        url: credentials.endpoint().clone(),
        headers: vec![
            ("Host", credentials.host().to_string()),
            ("Content-Type", FORM_CONTENT_TYPE.to_string()),
            ("Date", date),
            (AUTHORIZATION_HEADER, authorization),
        ],
        body,
        recipient: envelope.recipient().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use courier_common::Envelope;
    use pretty_assertions::assert_eq;

    use super::*;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

    fn credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", SECRET, "https://email.eu-west-1.amazonaws.com/").unwrap()
    }

    fn message(headers: &[&str]) -> Message {
        Message::new(
            headers.iter().copied(),
            "hello",
            Envelope::new("bounce@example.com", "a@x.com").unwrap(),
        )
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn decoded_raw_message(request: &SignedRequest) -> String {
        let data = request.form_field("RawMessage.Data").unwrap();
        String::from_utf8(STANDARD.decode(data).unwrap()).unwrap()
    }

    #[test]
    fn test_signature_matches_known_value() {
        assert_eq!(
            credentials().sign("Thu, 01 Jan 2026 00:00:00 +0000"),
            "40Qpqoh1kNNpZLyWDQ5Mwa4R6oHDWEbh9oqK59jnVHI="
        );
    }

    #[test]
    fn test_raw_message_round_trip() {
        let request = build(&message(&["To: a@x.com", "Subject: hi"]), &credentials(), timestamp());

        assert_eq!(
            request.form_field("RawMessage.Data").unwrap(),
            "VG86IGFAeC5jb20NClN1YmplY3Q6IGhpDQoNCmhlbGxv"
        );
        assert_eq!(
            decoded_raw_message(&request),
            "To: a@x.com\r\nSubject: hi\r\n\r\nhello"
        );
    }

    #[test]
    fn test_raw_message_ignores_trailing_separator() {
        let request = build(
            &message(&["To: a@x.com", "Subject: hi\r\n"]),
            &credentials(),
            timestamp(),
        );

        assert_eq!(
            decoded_raw_message(&request),
            "To: a@x.com\r\nSubject: hi\r\n\r\nhello"
        );
    }

    #[test]
    fn test_form_fields() {
        let request = build(&message(&["Subject: hi"]), &credentials(), timestamp());

        assert_eq!(request.form_field("Action").as_deref(), Some("SendRawEmail"));
        assert_eq!(
            request.form_field("Source").as_deref(),
            Some("bounce@example.com")
        );
        assert_eq!(
            request.form_field("Destinations.member.1").as_deref(),
            Some("a@x.com")
        );
        assert!(request.body.starts_with("Action=SendRawEmail&Source=bounce%40example.com&"));
        assert_eq!(request.recipient, "a@x.com");
    }

    #[test]
    fn test_signed_headers() {
        let credentials = credentials();
        let request = build(&message(&["Subject: hi"]), &credentials, timestamp());
        let date = timestamp().to_rfc2822();

        assert_eq!(request.header("host"), Some("email.eu-west-1.amazonaws.com"));
        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.header("Date"), Some(date.as_str()));
        assert_eq!(
            request.header(AUTHORIZATION_HEADER).unwrap(),
            format!(
                "AWS3-HTTPS AWSAccessKeyId=AKIDEXAMPLE,Algorithm=HmacSHA256,Signature={}",
                credentials.sign(&date)
            )
        );
        assert_eq!(request.url.as_str(), "https://email.eu-west-1.amazonaws.com/");
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let credentials = Credentials::new("AKID", "secret", "http://127.0.0.1:4566/").unwrap();
        assert_eq!(credentials.host(), "127.0.0.1:4566");
    }

    #[test]
    fn test_invalid_endpoints() {
        for endpoint in ["not a url", "ftp://email.example.com/", "/relative"] {
            assert!(
                matches!(
                    Credentials::new("AKID", "secret", endpoint),
                    Err(ConfigError::InvalidConfiguration {
                        field: "endpoint",
                        ..
                    })
                ),
                "{endpoint} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("AKIDEXAMPLE"));
    }
}
