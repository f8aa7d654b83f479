use crate::std_ext::str::{line_count, word_count};

use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "reqwest")] {
        use crate::error::FuzzError;
        use tracing::{error, instrument};
    }
}

/// the server's answer to an [`HttpMessage`]
///
/// [`HttpMessage`]: super::HttpMessage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub struct HttpResponse {
    status_code: u16,
    reason: String,
    version: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    elapsed: Duration,
    content_length: usize,
    line_count: usize,
    word_count: usize,
}

impl HttpResponse {
    /// create a new response from its parts; the body-derived counts are
    /// computed here
    #[must_use]
    pub fn new(status_code: u16, headers: Vec<(String, String)>, body: Vec<u8>, elapsed: Duration) -> Self {
        Self {
            status_code,
            reason: String::new(),
            version: String::from("HTTP/1.1"),
            headers,
            content_length: body.len(),
            line_count: line_count(&body),
            word_count: word_count(&body),
            body,
            elapsed,
        }
    }

    /// builder-style setter for the status-line reason phrase
    #[must_use]
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    /// Create an [`HttpResponse`] from a [`reqwest::blocking::Response`] and the time
    /// it took to arrive
    ///
    /// # Errors
    ///
    /// This function returns an error if there is a problem while reading the
    /// response body
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    #[instrument(skip(resp, elapsed), level = "trace")]
    pub fn try_from_reqwest_response(
        resp: reqwest::blocking::Response,
        elapsed: Duration,
    ) -> Result<Self, FuzzError> {
        let status = resp.status();
        let version = format!("{:?}", resp.version());

        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = resp.bytes().map_err(|source| {
            error!(?source, "could not read response body");
            FuzzError::ResponseReadError { source }
        })?;

        let mut response = Self::new(status.as_u16(), headers, body.to_vec(), elapsed);
        response.version = version;
        response.reason = status.canonical_reason().unwrap_or_default().to_string();

        Ok(response)
    }

    /// get the status code
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// `true` for any 3xx status code
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        self.status_code >= 300 && self.status_code < 400
    }

    /// get the header fields
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// the value of the first header named `name`, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// get the raw body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// the body, lossily decoded as utf-8
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// status-line and header fields rendered the way they appeared on the wire
    #[must_use]
    pub fn header_text(&self) -> String {
        let mut text = format!("{} {} {}\r\n", self.version, self.status_code, self.reason);

        for (name, value) in &self.headers {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push_str("\r\n");
        }

        text.push_str("\r\n");
        text
    }

    /// how long the round-trip took
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// get the number of bytes in the body
    #[must_use]
    pub const fn content_length(&self) -> usize {
        self.content_length
    }

    /// get the number of non-empty lines in the body
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.line_count
    }

    /// get the number of whitespace-separated words in the body
    #[must_use]
    pub const fn word_count(&self) -> usize {
        self.word_count
    }
}
