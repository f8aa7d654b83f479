use std::any::Any;

use regex::Regex;
use tracing::{error, trace};

use super::Processor;

use crate::actions::Action;
use crate::error::FuzzError;
use crate::findings::Alert;
use crate::fuzzers::TaskUtils;
use crate::results::FuzzResult;
use crate::std_ext::any::{AsAny, Named};

/// raises an [`Alert`] whenever a response body matches a regular expression
///
/// each raised alert is a copy of the template with the matched text as its
/// evidence and the task's payloads as its attack
///
/// # Examples
///
/// ```
/// # use locfuzz::findings::{Alert, Confidence, Risk};
/// # use locfuzz::processors::RegexAlertProcessor;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let template = Alert::new(Risk::Medium, Confidence::Low, "Application Error Disclosure")
///     .with_rule_id(90022);
///
/// let processor = RegexAlertProcessor::new(r"(?i)stack trace", template)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RegexAlertProcessor {
    pattern: Regex,
    template: Alert,
}

impl RegexAlertProcessor {
    /// create a processor raising copies of `template` on matches of `pattern`
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidRegex`] if `pattern` doesn't compile
    pub fn new(pattern: &str, template: Alert) -> Result<Self, FuzzError> {
        let pattern = Regex::new(pattern).map_err(|source| {
            error!(%pattern, %source, "could not compile alert pattern");

            FuzzError::InvalidRegex {
                source,
                pattern: pattern.to_string(),
            }
        })?;

        Ok(Self { pattern, template })
    }

    /// the alert copied for every match
    #[must_use]
    pub const fn template(&self) -> &Alert {
        &self.template
    }
}

impl Processor for RegexAlertProcessor {
    fn process_result(
        &mut self,
        utils: &mut TaskUtils<'_>,
        result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        let evidence = {
            let Some(response) = result.message().response() else {
                return Ok(Action::Keep);
            };

            let body = response.text();

            match self.pattern.find(&body) {
                Some(found) => found.as_str().to_string(),
                None => return Ok(Action::Keep),
            }
        };

        let attack = result
            .payloads()
            .iter()
            .map(|payload| payload.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        trace!(task_id = result.task_id(), %evidence, "alert pattern matched");

        let alert = self.template.clone().with_evidence(&evidence).with_attack(&attack);

        utils.raise_alert(result, alert);

        Ok(Action::Keep)
    }
}

impl Named for RegexAlertProcessor {
    fn name(&self) -> &str {
        "RegexAlertProcessor"
    }
}

impl AsAny for RegexAlertProcessor {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::findings::{Confidence, Risk};
    use crate::messages::{HttpMessage, HttpResponse};
    use crate::payloads::Payload;
    use crate::results::RESULT;
    use crate::state::SharedState;
    use std::time::Duration;

    fn result_with_body(task_id: usize, body: &str, payload: &str) -> Result<FuzzResult, FuzzError> {
        let mut message = HttpMessage::get(&format!("http://localhost/item?id={payload}"))?;
        message.set_response(HttpResponse::new(500, Vec::new(), body.as_bytes().to_vec(), Duration::ZERO));

        Ok(FuzzResult::new(task_id, RESULT, message, vec![Payload::from(payload)]))
    }

    /// matches are raised once per unique alert, misses raise nothing
    #[test]
    fn matching_responses_raise_alerts() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default();
        let original = HttpMessage::get("http://localhost/item?id=1")?;

        let template = Alert::new(Risk::High, Confidence::Medium, "SQL Injection").with_rule_id(40018);
        let mut processor = RegexAlertProcessor::new(r"SQL syntax[^.]*", template)?;

        let mut hit = result_with_body(1, "error: SQL syntax near 'x'. bye", "'")?;
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());
        assert_eq!(processor.process_result(&mut utils, &mut hit)?, Action::Keep);

        assert_eq!(hit.alerts().len(), 1);
        assert_eq!(hit.alerts()[0].evidence, "SQL syntax near 'x'");
        assert_eq!(hit.alerts()[0].attack, "'");
        assert_eq!(hit.alerts()[0].method, "GET");
        assert!(hit.alerts()[0].history_id.is_some());

        let mut miss = result_with_body(2, "all good", "1")?;
        let mut utils = TaskUtils::new(2, &state, &sender, &original, Vec::new());
        processor.process_result(&mut utils, &mut miss)?;
        assert!(miss.alerts().is_empty());

        assert_eq!(state.findings().unique_count(), 1);
        Ok(())
    }
}
