//! The outbound message handed to the dispatcher.

use std::sync::Arc;

use mailparse::MailAddr;

use crate::error::MessageParseError;

/// Line separator used between header lines and before the body.
pub const LINE_ENDING: &str = "\r\n";

/// Envelope sender and the single recipient a message is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipient: String,
}

impl Envelope {
    /// Build an envelope, checking that both sides are a single mailbox.
    ///
    /// Display names are dropped, only the bare address is kept.
    ///
    /// # Errors
    ///
    /// Returns [`MessageParseError::InvalidAddress`] if either address does not
    /// parse as exactly one mailbox.
    pub fn new(sender: &str, recipient: &str) -> Result<Self, MessageParseError> {
        Ok(Self {
            sender: single_address("sender", sender)?,
            recipient: single_address("recipient", recipient)?,
        })
    }

    /// Returns the envelope sender for this message
    #[inline]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns the recipient for this message
    #[inline]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

fn single_address(field: &'static str, raw: &str) -> Result<String, MessageParseError> {
    let parsed = mailparse::addrparse(raw).map_err(|e| MessageParseError::InvalidAddress {
        field,
        reason: e.to_string(),
    })?;

    match parsed.as_slice() {
        [MailAddr::Single(info)] => Ok(info.addr.clone()),
        _ => Err(MessageParseError::InvalidAddress {
            field,
            reason: format!("expected a single mailbox, got {raw:?}"),
        }),
    }
}

/// A fully formatted message: header lines, an opaque body and its envelope.
///
/// Messages are immutable once built and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    headers: Vec<String>,
    body: Arc<[u8]>,
    envelope: Envelope,
}

impl Message {
    pub fn new<I, H>(headers: I, body: impl Into<Vec<u8>>, envelope: Envelope) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            body: Arc::from(body.into()),
            envelope,
        }
    }

    ///
    /// Split a raw RFC 5322 buffer into its header lines and body.
    ///
    /// Folded header lines stay attached to the header they continue. Both
    /// CRLF and bare LF separated input is accepted; the body is kept
    /// byte-for-byte.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no blank line ending the header block, or
    /// the header block is not UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_common::{Envelope, Message};
    ///
    /// let envelope = Envelope::new("bounce@example.com", "a@x.com").unwrap();
    /// let message = Message::parse(b"To: a@x.com\r\nSubject: hi\r\n\r\nhello", envelope).unwrap();
    ///
    /// assert_eq!(message.headers(), ["To: a@x.com", "Subject: hi"]);
    /// assert_eq!(message.body(), b"hello");
    /// ```
    pub fn parse(raw: &[u8], envelope: Envelope) -> Result<Self, MessageParseError> {
        let (header_end, body_start) = find_header_end(raw)?;
        let block = std::str::from_utf8(&raw[..header_end])?;

        let mut headers: Vec<String> = Vec::new();
        for line in block.lines() {
            match headers.last_mut() {
                Some(previous) if line.starts_with([' ', '\t']) => {
                    previous.push_str(LINE_ENDING);
                    previous.push_str(line);
                }
                _ => headers.push(line.to_string()),
            }
        }

        Ok(Self::new(headers, &raw[body_start..], envelope))
    }

    /// Returns the header lines, in order
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Returns the message body
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the [`Envelope`] for this message
    #[inline]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Header lines joined with CRLF.
    ///
    /// A single trailing separator is removed so that the block never ends in
    /// a doubled line ending, however the caller terminated its last header.
    pub fn header_block(&self) -> String {
        let mut block = self.headers.join(LINE_ENDING);
        if block.ends_with(LINE_ENDING) {
            block.truncate(block.len() - LINE_ENDING.len());
        }
        block
    }

    /// The complete message as sent on the wire: header block, a blank line,
    /// then the body.
    pub fn to_raw(&self) -> Vec<u8> {
        let block = self.header_block();
        let mut raw = Vec::with_capacity(block.len() + 2 * LINE_ENDING.len() + self.body.len());
        raw.extend_from_slice(block.as_bytes());
        raw.extend_from_slice(LINE_ENDING.as_bytes());
        raw.extend_from_slice(LINE_ENDING.as_bytes());
        raw.extend_from_slice(&self.body);
        raw
    }
}

/// Locate the first empty line, ending the header block.
///
/// Returns the end of the header block (without its final line terminator)
/// and the start of the body. Lines may end in CRLF or a bare LF.
fn find_header_end(raw: &[u8]) -> Result<(usize, usize), MessageParseError> {
    let mut line_start = 0;

    while let Some(len) = raw[line_start..].iter().position(|&b| b == b'\n') {
        let line = &raw[line_start..line_start + len];

        if line.is_empty() || line == b"\r" {
            let header_end = match line_start {
                0 => 0,
                n if n >= 2 && raw[n - 2] == b'\r' => n - 2,
                n => n - 1,
            };
            return Ok((header_end, line_start + len + 1));
        }

        line_start += len + 1;
    }

    Err(MessageParseError::EndOfHeadersNotFound)
}
