use std::time::{Duration, Instant};

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{self, Method, Version};
use tracing::{error, instrument};

use super::utils::{parse_version, reqwest_to_fuzz_error};
use super::HttpSender;
use crate::error::FuzzError;
use crate::messages::{HttpMessage, HttpResponse};

/// headers the transport derives from the body itself; sending the
/// message's own copy could contradict the body actually written
const TRANSPORT_MANAGED_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

/// concrete implementation of an [`HttpSender`] using a pair of underlying
/// [`reqwest::blocking::Client`]s: one that follows redirects and one that doesn't
///
/// reqwest performs no retries of its own, which keeps the task-level retry
/// loop the only one in play
///
/// # Warning
///
/// the HTTP version (HTTP/1.1, etc) cannot be fuzzed by `BlockingClient` due to
/// limitations imposed by [`reqwest`]
#[derive(Clone, Debug)]
pub struct BlockingClient {
    following: reqwest::blocking::Client,
    direct: reqwest::blocking::Client,
}

impl BlockingClient {
    /// create a new client that follows at most `max_redirects` redirects
    /// (when asked to) and gives up on any single request after `timeout`
    ///
    /// # Errors
    ///
    /// returns an error if the underlying TLS backend can't be initialized
    pub fn new(max_redirects: usize, timeout: Duration) -> Result<Self, FuzzError> {
        let following = reqwest::blocking::Client::builder()
            .redirect(Policy::limited(max_redirects))
            .timeout(timeout)
            .build()
            .map_err(reqwest_to_fuzz_error)?;

        let direct = reqwest::blocking::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(reqwest_to_fuzz_error)?;

        Ok(Self { following, direct })
    }

    /// bring your own clients
    ///
    /// `following` is used when redirects should be followed and `direct` when
    /// they shouldn't; the caller is responsible for their redirect policies
    ///
    /// # Examples
    ///
    /// ```
    /// # use reqwest;
    /// # use reqwest::redirect::Policy;
    /// # use locfuzz::client::{BlockingClient, HttpSender};
    /// # use locfuzz::messages::HttpMessage;
    /// use httpmock::prelude::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let server = MockServer::start();
    /// let mocked = server.mock(|when, then| {
    ///     when.method(GET)
    ///         .path("/doctest");
    ///     then.status(200).body("hello");
    /// });
    ///
    /// let following = reqwest::blocking::Client::builder().build()?;
    /// let direct = reqwest::blocking::Client::builder().redirect(Policy::none()).build()?;
    ///
    /// let client = BlockingClient::with_clients(following, direct);
    ///
    /// let mut message = HttpMessage::get(&server.url("/doctest"))?;
    /// client.send(&mut message, false)?;
    ///
    /// assert_eq!(mocked.hits(), 1);
    /// assert_eq!(message.response().map(|r| r.status_code()), Some(200));
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub const fn with_clients(
        following: reqwest::blocking::Client,
        direct: reqwest::blocking::Client,
    ) -> Self {
        Self { following, direct }
    }

    const fn client(&self, follow_redirects: bool) -> &reqwest::blocking::Client {
        if follow_redirects {
            &self.following
        } else {
            &self.direct
        }
    }

    /// restructure a raw [`HttpMessage`] into a [`reqwest::blocking::Request`] that
    /// can be sent over the wire
    #[instrument(skip_all, level = "trace")]
    fn build_request(
        &self,
        version: Version,
        message: &HttpMessage,
        follow_redirects: bool,
    ) -> Result<reqwest::blocking::Request, FuzzError> {
        let method = Method::from_bytes(message.method().as_bytes()).map_err(|source| {
            error!(
                method = message.method(),
                %source,
                "could not parse the given http method; must be a valid http method when using a reqwest client"
            );

            FuzzError::MethodParseError {
                method: message.method().to_string(),
            }
        })?;

        let mut builder = self
            .client(follow_redirects)
            .request(method, message.url()?)
            .version(version);

        for (name, value) in message.headers() {
            if TRANSPORT_MANAGED_HEADERS
                .iter()
                .any(|managed| name.eq_ignore_ascii_case(managed))
            {
                continue;
            }

            let header_name = HeaderName::from_bytes(name.as_bytes());
            let header_value = HeaderValue::from_str(value);

            let (Ok(header_name), Ok(header_value)) = (header_name, header_value) else {
                error!(%name, "header can't be represented on the wire");

                return Err(FuzzError::MalformedHeader {
                    name: name.to_string(),
                });
            };

            builder = builder.header(header_name, header_value);
        }

        if !message.request_body().is_empty() {
            builder = builder.body(message.request_body().to_string());
        }

        builder.build().map_err(reqwest_to_fuzz_error)
    }
}

impl HttpSender for BlockingClient {
    #[instrument(skip_all, level = "trace")]
    fn send(&self, message: &mut HttpMessage, follow_redirects: bool) -> Result<(), FuzzError> {
        // http version cannot be fuzzed via reqwest client due to the use of a Version
        // enum as its input type for that part of the request
        let parsed_version = parse_version(message.version())?;

        let reqwest_request = self.build_request(parsed_version, message, follow_redirects)?;

        let now = Instant::now();

        let reqwest_response = self
            .client(follow_redirects)
            .execute(reqwest_request)
            .map_err(reqwest_to_fuzz_error)?;

        let response = HttpResponse::try_from_reqwest_response(reqwest_response, now.elapsed())?;

        message.set_response(response);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    /// the request header fields and body make it onto the wire and the
    /// response is attached to the message
    #[test]
    fn send_attaches_response() -> Result<(), Box<dyn std::error::Error>> {
        let srv = MockServer::start();

        let mock = srv.mock(|when, then| {
            when.method(POST)
                .path("/login")
                .header("x-fuzz", "yes")
                .body("user=admin");
            then.status(201).header("x-reply", "ok").body("created\n");
        });

        let client = BlockingClient::new(10, Duration::from_secs(5))?;

        let mut message = HttpMessage::new(
            format!("POST {} HTTP/1.1\r\nContent-Length: 999\r\nX-Fuzz: yes", srv.url("/login")),
            "user=admin",
        )?;

        client.send(&mut message, false)?;

        mock.assert_hits(1);

        let response = message.response().ok_or("no response")?;
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.header("X-Reply"), Some("ok"));
        assert_eq!(response.text(), "created\n");
        assert_eq!(response.line_count(), 1);
        Ok(())
    }

    /// redirects are only followed when asked to
    #[test]
    fn send_follows_redirects_on_request() -> Result<(), Box<dyn std::error::Error>> {
        let srv = MockServer::start();

        let redirect = srv.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(302).header("Location", "/new");
        });

        let target = srv.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("landed");
        });

        let client = BlockingClient::new(10, Duration::from_secs(5))?;

        let mut message = HttpMessage::get(&srv.url("/old"))?;
        client.send(&mut message, false)?;
        assert_eq!(message.response().map(HttpResponse::status_code), Some(302));
        target.assert_hits(0);

        client.send(&mut message, true)?;
        assert_eq!(message.response().map(HttpResponse::status_code), Some(200));

        redirect.assert_hits(2);
        target.assert_hits(1);
        Ok(())
    }

    /// a refused connection maps onto a transient request error
    #[test]
    fn send_maps_connection_failures() -> Result<(), Box<dyn std::error::Error>> {
        let client = BlockingClient::new(0, Duration::from_secs(2))?;

        // port 9 (discard) is essentially never listening on a test box
        let mut message = HttpMessage::get("http://127.0.0.1:9/")?;

        let error = client.send(&mut message, false).err().ok_or("expected an error")?;

        assert!(matches!(error, FuzzError::RequestError { .. }));
        assert!(error.is_transient());
        assert!(message.response().is_none());
        Ok(())
    }

    /// a message with a header that can't go on the wire fails without a retryable error
    #[test]
    fn send_rejects_malformed_headers() -> Result<(), Box<dyn std::error::Error>> {
        let client = BlockingClient::new(0, Duration::from_secs(2))?;

        let mut message = HttpMessage::get("http://127.0.0.1:9/")?;
        message.set_header("Bad Name", "value");

        let error = client.send(&mut message, false).err().ok_or("expected an error")?;

        assert!(matches!(error, FuzzError::MalformedHeader { .. }));
        assert!(!error.is_transient());
        Ok(())
    }
}
