use super::{HttpResponse, MessageSection};
use crate::error::FuzzError;
use crate::history::HistoryId;

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use url::Url;

const CRLF: &str = "\r\n";

/// an http request kept in its raw textual form, along with the response it
/// produced (once sent)
///
/// the request is stored as header text and body text so that fuzz locations
/// can address it by offset; the request-line and header fields are parsed
/// on demand
///
/// # Examples
///
/// ```
/// # use locfuzz::messages::HttpMessage;
/// # use locfuzz::error::FuzzError;
/// # fn main() -> Result<(), FuzzError> {
/// let message = HttpMessage::get("http://localhost:8000/login?user=admin")?
///     .with_header("Cookie", "session=1234")
///     .with_body("user=admin&password=hunter2");
///
/// assert_eq!(message.method(), "GET");
/// assert_eq!(message.header("cookie"), Some("session=1234"));
/// assert_eq!(message.url()?.path(), "/login");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HttpMessage {
    request_header: String,
    request_body: String,
    response: Option<HttpResponse>,
    history_id: Option<HistoryId>,
}

impl HttpMessage {
    /// create a new message from raw request header text and a body
    ///
    /// the header must start with a `METHOD URI VERSION` request-line; a
    /// missing trailing blank line is added
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidRequestHeader`] if the request-line is
    /// malformed, or [`FuzzError::InvalidUrl`] when the target can't be
    /// resolved to a url
    #[instrument(skip_all, level = "trace")]
    pub fn new<H, B>(request_header: H, request_body: B) -> Result<Self, FuzzError>
    where
        H: AsRef<str>,
        B: Into<String>,
    {
        let trimmed = request_header.as_ref().trim_end_matches(['\r', '\n']);

        let mut header = String::with_capacity(trimmed.len() + 4);
        header.push_str(trimmed);
        header.push_str(CRLF);
        header.push_str(CRLF);

        let message = Self {
            request_header: header,
            request_body: request_body.into(),
            response: None,
            history_id: None,
        };

        message.validate()?;

        Ok(message)
    }

    /// create a simple `GET` message for the given url, with a `Host` header
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidUrl`] if the url can't be parsed or has no host
    pub fn get(url: &str) -> Result<Self, FuzzError> {
        let parsed = Url::parse(url).map_err(|source| {
            error!(%url, %source, "could not parse the given url");
            FuzzError::InvalidUrl {
                source,
                url: url.to_string(),
            }
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| FuzzError::InvalidUrl {
                source: url::ParseError::EmptyHost,
                url: url.to_string(),
            })?
            .to_string();

        let host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };

        Self::new(format!("GET {parsed} HTTP/1.1{CRLF}Host: {host}"), "")
    }

    /// builder-style wrapper around [`HttpMessage::set_header`]
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// builder-style wrapper around [`HttpMessage::set_request_body`]
    #[must_use]
    pub fn with_body<B>(mut self, body: B) -> Self
    where
        B: Into<String>,
    {
        self.set_request_body(body);
        self
    }

    fn validate(&self) -> Result<(), FuzzError> {
        let mut parts = self.request_line().split_whitespace();

        let (Some(method), Some(_), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(FuzzError::InvalidRequestHeader {
                reason: format!("malformed request-line `{}`", self.request_line()),
            });
        };

        if !method.bytes().all(|byte| byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)) {
            return Err(FuzzError::InvalidRequestHeader {
                reason: format!("invalid method `{method}`"),
            });
        }

        if !version.starts_with("HTTP/") {
            return Err(FuzzError::InvalidRequestHeader {
                reason: format!("invalid version `{version}`"),
            });
        }

        self.url().map(|_| ())
    }

    /// the raw request header text, including the trailing blank line
    #[must_use]
    pub fn request_header(&self) -> &str {
        &self.request_header
    }

    /// the raw request body text
    #[must_use]
    pub fn request_body(&self) -> &str {
        &self.request_body
    }

    /// replace the request header text wholesale
    ///
    /// no validation is performed; a malformed header surfaces as an error
    /// when the message is sent
    pub fn set_request_header<H>(&mut self, header: H)
    where
        H: Into<String>,
    {
        self.request_header = header.into();
    }

    /// replace the request body text
    pub fn set_request_body<B>(&mut self, body: B)
    where
        B: Into<String>,
    {
        self.request_body = body.into();
    }

    fn header_lines(&self) -> impl Iterator<Item = &str> {
        self.request_header
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .take_while(|line| !line.is_empty())
    }

    /// the first line of the request header
    #[must_use]
    pub fn request_line(&self) -> &str {
        self.header_lines().next().unwrap_or_default()
    }

    /// the request method, i.e. `GET`
    #[must_use]
    pub fn method(&self) -> &str {
        self.request_line()
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }

    /// the request target, exactly as written in the request-line
    #[must_use]
    pub fn request_target(&self) -> &str {
        self.request_line()
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
    }

    /// the http version, i.e. `HTTP/1.1`
    #[must_use]
    pub fn version(&self) -> &str {
        self.request_line()
            .split_whitespace()
            .nth(2)
            .unwrap_or_default()
    }

    /// resolve the request target into a full url
    ///
    /// origin-form targets (`/path?query`) are resolved against the `Host` header
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidUrl`] if the target can't be parsed, or
    /// [`FuzzError::InvalidRequestHeader`] when an origin-form target has no `Host`
    pub fn url(&self) -> Result<Url, FuzzError> {
        let target = self.request_target();

        let absolute = if target.starts_with('/') {
            let host = self
                .header("host")
                .ok_or_else(|| FuzzError::InvalidRequestHeader {
                    reason: format!("origin-form target `{target}` requires a Host header"),
                })?;

            Cow::Owned(format!("http://{host}{target}"))
        } else {
            Cow::Borrowed(target)
        };

        Url::parse(&absolute).map_err(|source| FuzzError::InvalidUrl {
            source,
            url: absolute.to_string(),
        })
    }

    /// all header fields, in the order they appear
    #[must_use]
    pub fn headers(&self) -> Vec<(&str, &str)> {
        self.header_lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
            .collect()
    }

    /// the value of the first header named `name`, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// set the header `name` to `value`, replacing every existing occurrence
    ///
    /// the header text is rebuilt with `\r\n` line endings
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.rebuild_header(name, Some(value));
    }

    /// remove every header named `name`; a missing header is a no-op
    pub fn remove_header(&mut self, name: &str) {
        self.rebuild_header(name, None);
    }

    fn rebuild_header(&mut self, name: &str, value: Option<&str>) {
        let mut rebuilt = String::with_capacity(self.request_header.len() + 32);
        rebuilt.push_str(self.request_line());
        rebuilt.push_str(CRLF);

        for line in self.header_lines().skip(1) {
            let matches = line
                .split_once(':')
                .map_or(false, |(key, _)| key.trim().eq_ignore_ascii_case(name));

            if !matches {
                rebuilt.push_str(line);
                rebuilt.push_str(CRLF);
            }
        }

        if let Some(value) = value {
            rebuilt.push_str(name);
            rebuilt.push_str(": ");
            rebuilt.push_str(value);
            rebuilt.push_str(CRLF);
        }

        rebuilt.push_str(CRLF);
        self.request_header = rebuilt;
    }

    /// the response received for this message, if it was sent
    #[must_use]
    pub const fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    /// attach the response received for this message
    pub fn set_response(&mut self, response: HttpResponse) {
        self.response = Some(response);
    }

    /// drop any response attached to this message
    pub fn clear_response(&mut self) {
        self.response = None;
    }

    /// reference into the history store, once persisted
    #[must_use]
    pub const fn history_id(&self) -> Option<HistoryId> {
        self.history_id
    }

    /// record where this message was persisted
    pub fn set_history_id(&mut self, id: HistoryId) {
        self.history_id = Some(id);
    }

    /// the text of one section of the message
    ///
    /// response sections are empty when no response is attached
    #[must_use]
    pub fn text_for(&self, section: MessageSection) -> Cow<'_, str> {
        match section {
            MessageSection::RequestHeader => Cow::Borrowed(&self.request_header),
            MessageSection::RequestBody => Cow::Borrowed(&self.request_body),
            MessageSection::ResponseHeader => self
                .response
                .as_ref()
                .map_or(Cow::Borrowed(""), |response| Cow::Owned(response.header_text())),
            MessageSection::ResponseBody => self
                .response
                .as_ref()
                .map_or(Cow::Borrowed(""), HttpResponse::text),
        }
    }

    pub(crate) fn text_mut(&mut self, section: MessageSection) -> Option<&mut String> {
        match section {
            MessageSection::RequestHeader => Some(&mut self.request_header),
            MessageSection::RequestBody => Some(&mut self.request_body),
            MessageSection::ResponseHeader | MessageSection::ResponseBody => None,
        }
    }
}

impl Display for HttpMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.request_header, self.request_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// a header without the trailing blank line is normalized on construction
    #[test]
    fn new_appends_trailing_blank_line() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::new("POST http://example.com/ HTTP/1.1\r\nHost: example.com", "a=b")?;

        assert!(message.request_header().ends_with("\r\n\r\n"));
        assert_eq!(message.method(), "POST");
        assert_eq!(message.version(), "HTTP/1.1");
        assert_eq!(message.request_body(), "a=b");
        Ok(())
    }

    /// malformed request-lines are rejected
    #[test]
    fn new_rejects_malformed_request_lines() {
        assert!(HttpMessage::new("GET\r\n", "").is_err());
        assert!(HttpMessage::new("GET / HTTP/1.1 extra\r\n", "").is_err());
        assert!(HttpMessage::new("G(T http://example.com/ HTTP/1.1\r\n", "").is_err());
        assert!(HttpMessage::new("GET http://example.com/ SPDY/3\r\n", "").is_err());
        // origin-form with no Host header
        assert!(HttpMessage::new("GET /index HTTP/1.1\r\n", "").is_err());
    }

    /// origin-form targets resolve against the Host header
    #[test]
    fn url_resolves_origin_form_against_host() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::new("GET /search?q=1 HTTP/1.1\nHost: localhost:8080\n\n", "")?;

        assert_eq!(message.url()?.as_str(), "http://localhost:8080/search?q=1");
        Ok(())
    }

    /// setting an existing header replaces it, setting a new one appends it,
    /// and removing a missing one changes nothing
    #[test]
    fn set_and_remove_headers() -> Result<(), Box<dyn std::error::Error>> {
        let mut message = HttpMessage::get("http://example.com/")?
            .with_header("X-Token", "one")
            .with_header("Accept", "*/*");

        message.set_header("x-token", "two");
        assert_eq!(message.header("X-Token"), Some("two"));
        assert_eq!(message.headers().len(), 3);

        let before = message.request_header().to_string();
        message.remove_header("X-Missing");
        assert_eq!(message.request_header(), before);

        message.remove_header("accept");
        assert_eq!(message.header("Accept"), None);
        assert!(message.request_header().ends_with("\r\n\r\n"));
        Ok(())
    }

    /// response sections are empty until a response is attached
    #[test]
    fn text_for_response_sections_without_response() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::get("http://example.com/")?;

        assert_eq!(message.text_for(MessageSection::ResponseHeader), "");
        assert_eq!(message.text_for(MessageSection::ResponseBody), "");
        assert!(message
            .text_for(MessageSection::RequestHeader)
            .starts_with("GET http://example.com/ HTTP/1.1"));
        Ok(())
    }
}
