use std::any::Any;

use super::Processor;

use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::HttpMessage;
use crate::std_ext::any::{AsAny, Named};

/// keeps the `Content-Length` header in step with a fuzzed body
///
/// messages without a body and without a `Content-Length` header are left
/// alone
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequestContentLengthUpdater;

impl RequestContentLengthUpdater {
    /// create a new `RequestContentLengthUpdater`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Processor for RequestContentLengthUpdater {
    fn process_message(
        &mut self,
        _utils: &mut TaskUtils<'_>,
        message: &mut HttpMessage,
    ) -> Result<(), FuzzError> {
        let length = message.request_body().len();

        if length > 0 || message.header("content-length").is_some() {
            message.set_header("Content-Length", &length.to_string());
        }

        Ok(())
    }
}

impl Named for RequestContentLengthUpdater {
    fn name(&self) -> &str {
        "RequestContentLengthUpdater"
    }
}

impl AsAny for RequestContentLengthUpdater {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::state::SharedState;

    #[test]
    fn content_length_tracks_body() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let original = HttpMessage::get("http://localhost/")?;
        let sender = ScriptedSender::default();
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());

        let mut updater = RequestContentLengthUpdater::new();

        let mut post = HttpMessage::new("POST http://localhost/ HTTP/1.1\r\nContent-Length: 3", "user=admin")?;
        updater.process_message(&mut utils, &mut post)?;
        assert_eq!(post.header("content-length"), Some("10"));

        let mut get = HttpMessage::get("http://localhost/")?;
        updater.process_message(&mut utils, &mut get)?;
        assert_eq!(get.header("content-length"), None);
        Ok(())
    }
}
