use std::any::Any;

use regex::{Captures, Regex};
use tracing::{debug, error, instrument};
use url::form_urlencoded::byte_serialize;

use super::Processor;

use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::HttpMessage;
use crate::std_ext::any::{AsAny, Named};

/// fetches a fresh anti-csrf token before every message and writes it into
/// the outgoing request
///
/// the token is read from the response to a separate source message, usually
/// the page hosting the form. By default the token is looked up as the value of
/// an html `input` whose name is the token name; [`with_pattern`] replaces that
/// lookup with any expression whose first capture group is the token.
///
/// the token is substituted wherever `name=value` appears in the request
/// body or in the query of the request-line. A token that can't be fetched
/// counts as an error against the task and the message is sent unchanged.
///
/// [`with_pattern`]: AntiCsrfTokenRefresher::with_pattern
#[derive(Clone, Debug)]
pub struct AntiCsrfTokenRefresher {
    token_name: String,
    source: HttpMessage,
    extractor: Regex,
    parameter: Regex,
}

impl AntiCsrfTokenRefresher {
    /// refresh the token named `token_name` by sending `source`
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidParameter`] if `token_name` is empty
    pub fn new(token_name: &str, source: HttpMessage) -> Result<Self, FuzzError> {
        if token_name.is_empty() {
            error!("anti-csrf token name can't be empty");

            return Err(FuzzError::InvalidParameter {
                param: String::from("token_name"),
                message: "anti-csrf token name can't be empty",
            });
        }

        let name = regex::escape(token_name);

        let extractor = compile(&format!(
            r#"(?is)<input[^>]*?name=["']?{name}["'\s][^>]*?value=["']([^"']*)["']|<input[^>]*?value=["']([^"']*)["'][^>]*?name=["']?{name}["'\s/>]"#
        ))?;

        let parameter = compile(&format!(r"(^|[?&]){name}=[^&\s#]*"))?;

        Ok(Self {
            token_name: token_name.to_string(),
            source,
            extractor,
            parameter,
        })
    }

    /// look the token up with `pattern` instead of the default html lookup
    ///
    /// the first capture group that participates in a match is taken as the token
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidRegex`] if `pattern` doesn't compile
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, FuzzError> {
        self.extractor = compile(pattern)?;
        Ok(self)
    }

    /// name of the refreshed parameter
    #[must_use]
    pub fn token_name(&self) -> &str {
        &self.token_name
    }

    fn extract(&self, body: &str) -> Option<String> {
        let captures = self.extractor.captures(body)?;

        captures
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map(|group| group.as_str().to_string())
    }

    fn substitute(&self, text: &str, token: &str) -> Option<String> {
        if !self.parameter.is_match(text) {
            return None;
        }

        let encoded: String = byte_serialize(token.as_bytes()).collect();

        let replaced = self.parameter.replace_all(text, |captures: &Captures<'_>| {
            format!("{}{}={encoded}", &captures[1], self.token_name)
        });

        Some(replaced.into_owned())
    }

    fn apply(&self, message: &mut HttpMessage, token: &str) {
        if let Some(body) = self.substitute(message.request_body(), token) {
            message.set_request_body(body);
        }

        let header = message.request_header();
        let (line, rest) = header.split_once("\r\n").unwrap_or((header, ""));

        let Some((target_start, target_end)) = query_span(line) else {
            return;
        };

        if let Some(query) = self.substitute(&line[target_start..target_end], token) {
            let updated = format!(
                "{}{query}{}\r\n{rest}",
                &line[..target_start],
                &line[target_end..]
            );

            message.set_request_header(updated);
        }
    }
}

/// byte range of the query (including the leading `?`) within a request-line
fn query_span(line: &str) -> Option<(usize, usize)> {
    let target_start = line.find(' ')? + 1;
    let target_end = target_start + line[target_start..].find(' ')?;

    let query_start = target_start + line[target_start..target_end].find('?')?;

    Some((query_start, target_end))
}

fn compile(pattern: &str) -> Result<Regex, FuzzError> {
    Regex::new(pattern).map_err(|source| {
        error!(%pattern, %source, "could not compile anti-csrf pattern");

        FuzzError::InvalidRegex {
            source,
            pattern: pattern.to_string(),
        }
    })
}

impl Processor for AntiCsrfTokenRefresher {
    #[instrument(skip_all, fields(task_id = utils.task_id(), token = %self.token_name), level = "trace")]
    fn process_message(
        &mut self,
        utils: &mut TaskUtils<'_>,
        message: &mut HttpMessage,
    ) -> Result<(), FuzzError> {
        let mut source = self.source.clone();
        source.clear_response();

        if !utils.send_message(&mut source, true) {
            utils.increase_error_count(&format!(
                "could not send the message holding anti-csrf token `{}`",
                self.token_name
            ));
            return Ok(());
        }

        let token = source
            .response()
            .and_then(|response| self.extract(&response.text()));

        let Some(token) = token else {
            utils.increase_error_count(&format!(
                "anti-csrf token `{}` not found in the source response",
                self.token_name
            ));
            return Ok(());
        };

        debug!(task_id = utils.task_id(), token = %self.token_name, "anti-csrf token refreshed");

        self.apply(message, &token);

        Ok(())
    }
}

impl Named for AntiCsrfTokenRefresher {
    fn name(&self) -> &str {
        "AntiCsrfTokenRefresher"
    }
}

impl AsAny for AntiCsrfTokenRefresher {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::state::SharedState;

    const FORM: &str = r#"<form><input type="hidden" name="csrf" value="f00 b&r"><input name="user"></form>"#;

    /// the token lands in both the body and the request-line query
    #[test]
    fn token_replaces_body_and_query_values() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default().route("/form", 200, &[], FORM);
        let original = HttpMessage::get("http://localhost/login")?;
        let mut utils = TaskUtils::new(4, &state, &sender, &original, Vec::new());

        let mut refresher =
            AntiCsrfTokenRefresher::new("csrf", HttpMessage::get("http://localhost/form")?)?;

        let mut message = HttpMessage::new(
            "POST http://localhost/login?csrf=old&x=1 HTTP/1.1\r\nHost: localhost\r\n",
            "user=admin&csrf=old",
        )?;

        refresher.process_message(&mut utils, &mut message)?;

        assert_eq!(message.request_body(), "user=admin&csrf=f00+b%26r");
        assert_eq!(
            message.request_line(),
            "POST http://localhost/login?csrf=f00+b%26r&x=1 HTTP/1.1"
        );
        assert_eq!(message.header("host"), Some("localhost"));
        assert_eq!(state.error_count(), 0);
        Ok(())
    }

    /// missing tokens and unreachable sources count as errors and leave the message alone
    #[test]
    fn failures_count_errors() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default().route("/form", 200, &[], "<p>no form here</p>");
        let original = HttpMessage::get("http://localhost/login")?;
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());

        let mut message = HttpMessage::new("POST http://localhost/login HTTP/1.1\r\nHost: localhost\r\n", "csrf=old")?;

        AntiCsrfTokenRefresher::new("csrf", HttpMessage::get("http://localhost/form")?)?
            .process_message(&mut utils, &mut message)?;

        AntiCsrfTokenRefresher::new("csrf", HttpMessage::get("http://localhost/down")?)?
            .process_message(&mut utils, &mut message)?;

        assert_eq!(message.request_body(), "csrf=old");
        assert_eq!(state.error_count(), 2);
        assert_eq!(state.errors()[0].source, "processor");
        Ok(())
    }

    /// a custom pattern reads the token from anywhere in the response
    #[test]
    fn custom_pattern_extracts_token() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default().route("/token", 200, &[], r#"{"token":"abc123"}"#);
        let original = HttpMessage::get("http://localhost/")?;
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());

        let mut refresher = AntiCsrfTokenRefresher::new("t", HttpMessage::get("http://localhost/token")?)?
            .with_pattern(r#""token":"([^"]+)""#)?;

        let mut message = HttpMessage::get("http://localhost/api?t=0")?;
        refresher.process_message(&mut utils, &mut message)?;

        assert_eq!(message.request_line(), "GET http://localhost/api?t=abc123 HTTP/1.1");
        assert!(AntiCsrfTokenRefresher::new("", HttpMessage::get("http://localhost/")?).is_err());
        Ok(())
    }
}
