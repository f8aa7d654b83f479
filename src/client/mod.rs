//! Blocking http transport trait, with an optional implementation using [`reqwest`]
use cfg_if::cfg_if;

use crate::error::FuzzError;
use crate::messages::HttpMessage;

use std::fmt::Debug;

cfg_if! {
    if #[cfg(feature = "reqwest")] {
        mod blocking_client;
        mod utils; // parses http versions into reqwest::Version, maps reqwest errors to FuzzError
        pub use self::blocking_client::BlockingClient;
    }
}

/// the outbound side of a fuzz session
///
/// a single sender is shared by every worker thread, so implementors must
/// be safe for concurrent use
///
/// implementors must never retry on their own; bounded retries happen one
/// level up, in the fuzz task
pub trait HttpSender: Debug + Send + Sync {
    /// send the request held by `message`, attaching the response to it
    ///
    /// when `follow_redirects` is set, redirects are followed up to the
    /// sender's configured limit and the final response is attached
    ///
    /// # Errors
    ///
    /// implementors return [`FuzzError::RequestError`] for network-level
    /// failures and a descriptive variant when the message can't be put on
    /// the wire
    fn send(&self, message: &mut HttpMessage, follow_redirects: bool) -> Result<(), FuzzError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::HttpSender;
    use crate::error::{FuzzError, RequestErrorKind};
    use crate::messages::{HttpMessage, HttpResponse};

    type Route = (u16, Vec<(String, String)>, String);

    /// answers from a fixed table keyed by url path; unknown paths get an
    /// empty 200, and paths starting with `/down` fail to connect
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedSender {
        routes: HashMap<String, Route>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedSender {
        pub(crate) fn route(mut self, path: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
            let headers = headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect();

            self.routes
                .insert(path.to_string(), (status, headers, body.to_string()));
            self
        }

        /// the url of every message sent so far, successful or not
        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
        }
    }

    impl HttpSender for ScriptedSender {
        fn send(&self, message: &mut HttpMessage, _follow_redirects: bool) -> Result<(), FuzzError> {
            let url = message.url()?;

            if let Ok(mut guard) = self.sent.lock() {
                guard.push(url.to_string());
            }

            if url.path().starts_with("/down") {
                return Err(FuzzError::RequestError {
                    kind: RequestErrorKind::Connect(None),
                    message: String::from("connection refused"),
                });
            }

            let (status, headers, body) = self
                .routes
                .get(url.path())
                .cloned()
                .unwrap_or_else(|| (200, Vec::new(), String::new()));

            message.set_response(HttpResponse::new(status, headers, body.into_bytes(), Duration::ZERO));

            Ok(())
        }
    }
}
