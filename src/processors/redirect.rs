use std::any::Any;

use tracing::{debug, instrument};

use super::Processor;

use crate::actions::Action;
use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::{HttpMessage, HttpResponse};
use crate::results::{FuzzResult, REDIRECT};
use crate::std_ext::any::{AsAny, Named};

/// request headers that only describe the body; dropped when a redirect turns
/// the request into a body-less `GET`
const BODY_HEADERS: [&str; 3] = ["content-length", "content-type", "transfer-encoding"];

/// follows the redirects of fuzzed messages that were sent without following them,
/// recording each hop as its own `"Redirect"` result
///
/// the task's own result keeps the 3xx response
///
/// # Examples
///
/// ```
/// # use locfuzz::processors::{ProcessorChain, RedirectFollower};
/// let chain = ProcessorChain::default();
/// chain.push(RedirectFollower::new(5));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RedirectFollower {
    max_redirects: usize,
}

impl RedirectFollower {
    /// create a `RedirectFollower` that follows at most `max_redirects` hops per result
    #[must_use]
    pub const fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }

    /// build the request for the hop `response` points at; `None` when the
    /// response has no `Location` header
    fn next_hop(current: &HttpMessage, response: &HttpResponse) -> Result<Option<HttpMessage>, FuzzError> {
        let Some(location) = response.header("location") else {
            return Ok(None);
        };

        let target = current.url()?.join(location).map_err(|source| FuzzError::InvalidUrl {
            source,
            url: location.to_string(),
        })?;

        // 307/308 repeat the request as-is, everything else becomes a GET
        let keep_body = matches!(response.status_code(), 307 | 308);

        let (method, body) = if keep_body {
            (current.method(), current.request_body())
        } else {
            ("GET", "")
        };

        let mut hop = HttpMessage::new(format!("{method} {target} {}", current.version()), body)?;

        for (name, value) in current.headers() {
            if name.eq_ignore_ascii_case("host")
                || (!keep_body && BODY_HEADERS.iter().any(|header| name.eq_ignore_ascii_case(header)))
            {
                continue;
            }

            hop.set_header(name, value);
        }

        if let Some(host) = target.host_str() {
            let host = target
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));

            hop.set_header("Host", &host);
        }

        Ok(Some(hop))
    }
}

impl Default for RedirectFollower {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Processor for RedirectFollower {
    #[instrument(skip_all, fields(task_id = utils.task_id()), level = "trace")]
    fn process_result(
        &mut self,
        utils: &mut TaskUtils<'_>,
        result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        let mut current = result.message().clone();

        for hop in 1..=self.max_redirects {
            let Some(response) = current.response().filter(|response| response.is_redirect()) else {
                break;
            };

            let Some(mut next) = Self::next_hop(&current, response)? else {
                break;
            };

            if !utils.send_message(&mut next, false) {
                debug!(task_id = utils.task_id(), %hop, "redirect could not be followed");
                break;
            }

            utils.add_message_to_results(REDIRECT, next.clone(), None);

            current = next;
        }

        Ok(Action::Keep)
    }
}

impl Named for RedirectFollower {
    fn name(&self) -> &str {
        "RedirectFollower"
    }
}

impl AsAny for RedirectFollower {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
