use std::any::Any;

use super::Processor;

use crate::actions::Action;
use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::MessageSection;
use crate::results::FuzzResult;
use crate::std_ext::any::{AsAny, Named};

/// custom-state key set on results whose response reflects a payload
pub const REFLECTED_STATE: &str = "reflected";

/// marks results whose response (header or body) contains one of the task's payloads
///
/// the custom state holds the reflected payloads, comma separated
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PayloadReflectionDetector;

impl PayloadReflectionDetector {
    /// create a new `PayloadReflectionDetector`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Processor for PayloadReflectionDetector {
    fn process_result(
        &mut self,
        _utils: &mut TaskUtils<'_>,
        result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        let message = result.message();
        let header = message.text_for(MessageSection::ResponseHeader);
        let body = message.text_for(MessageSection::ResponseBody);

        let reflected: Vec<&str> = result
            .payloads()
            .iter()
            .map(|payload| payload.as_str())
            .filter(|payload| !payload.is_empty())
            .filter(|payload| header.contains(payload) || body.contains(payload))
            .collect();

        if !reflected.is_empty() {
            let joined = reflected.join(",");
            result.add_custom_state(REFLECTED_STATE, &joined);
        }

        Ok(Action::Keep)
    }
}

impl Named for PayloadReflectionDetector {
    fn name(&self) -> &str {
        "PayloadReflectionDetector"
    }
}

impl AsAny for PayloadReflectionDetector {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::messages::{HttpMessage, HttpResponse};
    use crate::payloads::Payload;
    use crate::results::RESULT;
    use crate::state::SharedState;
    use std::time::Duration;

    #[test]
    fn reflected_payloads_are_marked() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default();
        let original = HttpMessage::get("http://localhost/")?;
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());

        let mut message = HttpMessage::get("http://localhost/?q=<b>")?;
        message.set_response(HttpResponse::new(
            200,
            vec![(String::from("X-Echo"), String::from("token"))],
            b"you searched for <b>".to_vec(),
            Duration::ZERO,
        ));

        let payloads = vec![Payload::from("<b>"), Payload::from("token"), Payload::from("absent")];
        let mut result = FuzzResult::new(1, RESULT, message.clone(), payloads);

        PayloadReflectionDetector::new().process_result(&mut utils, &mut result)?;
        assert_eq!(result.custom_state(REFLECTED_STATE), Some("<b>,token"));

        let mut quiet = FuzzResult::new(2, RESULT, message, vec![Payload::from("absent")]);
        PayloadReflectionDetector::new().process_result(&mut utils, &mut quiet)?;
        assert_eq!(quiet.custom_state(REFLECTED_STATE), None);
        Ok(())
    }
}
