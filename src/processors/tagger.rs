use std::any::Any;

use regex::Regex;
use tracing::error;

use super::Processor;

use crate::actions::Action;
use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::MessageSection;
use crate::results::FuzzResult;
use crate::std_ext::any::{AsAny, Named};

/// custom-state key holding the tags of a result, comma separated
pub const TAGS_STATE: &str = "tags";

/// adds a tag to every result whose response matches a regular expression
///
/// several taggers may share the same result; tags accumulate under
/// [`TAGS_STATE`] without repeats
///
/// # Examples
///
/// ```
/// # use locfuzz::processors::MessageTagger;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tagger = MessageTagger::new("sql-error", r"(?i)sql syntax")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MessageTagger {
    tag: String,
    pattern: Regex,
}

impl MessageTagger {
    /// create a tagger applying `tag` when `pattern` matches the response
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidRegex`] if `pattern` doesn't compile
    pub fn new(tag: &str, pattern: &str) -> Result<Self, FuzzError> {
        let pattern = Regex::new(pattern).map_err(|source| {
            error!(%pattern, %source, "could not compile tagger pattern");

            FuzzError::InvalidRegex {
                source,
                pattern: pattern.to_string(),
            }
        })?;

        Ok(Self {
            tag: tag.to_string(),
            pattern,
        })
    }
}

impl Processor for MessageTagger {
    fn process_result(
        &mut self,
        _utils: &mut TaskUtils<'_>,
        result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        let matched = [MessageSection::ResponseHeader, MessageSection::ResponseBody]
            .into_iter()
            .any(|section| self.pattern.is_match(&result.message().text_for(section)));

        if !matched {
            return Ok(Action::Keep);
        }

        let tags = match result.custom_state(TAGS_STATE) {
            Some(existing) if existing.split(',').any(|tag| tag == self.tag) => return Ok(Action::Keep),
            Some(existing) => format!("{existing},{}", self.tag),
            None => self.tag.clone(),
        };

        result.add_custom_state(TAGS_STATE, &tags);

        Ok(Action::Keep)
    }
}

impl Named for MessageTagger {
    fn name(&self) -> &str {
        "MessageTagger"
    }
}

impl AsAny for MessageTagger {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::messages::{HttpMessage, HttpResponse};
    use crate::results::RESULT;
    use crate::state::SharedState;
    use std::time::Duration;

    #[test]
    fn tags_accumulate_without_repeats() -> Result<(), Box<dyn std::error::Error>> {
        let state = SharedState::default();
        let sender = ScriptedSender::default();
        let original = HttpMessage::get("http://localhost/")?;
        let mut utils = TaskUtils::new(1, &state, &sender, &original, Vec::new());

        let mut message = HttpMessage::get("http://localhost/")?;
        message.set_response(HttpResponse::new(
            500,
            Vec::new(),
            b"You have an error in your SQL syntax; stack trace follows".to_vec(),
            Duration::ZERO,
        ));

        let mut result = FuzzResult::new(1, RESULT, message, Vec::new());

        let mut sql = MessageTagger::new("sql", r"(?i)sql syntax")?;
        let mut trace = MessageTagger::new("trace", "stack trace")?;
        let mut absent = MessageTagger::new("php", r"\.php")?;

        sql.process_result(&mut utils, &mut result)?;
        trace.process_result(&mut utils, &mut result)?;
        sql.process_result(&mut utils, &mut result)?;
        absent.process_result(&mut utils, &mut result)?;

        assert_eq!(result.custom_state(TAGS_STATE), Some("sql,trace"));
        assert!(MessageTagger::new("bad", "(").is_err());
        Ok(())
    }
}
