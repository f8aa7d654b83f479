use super::{FuzzLocation, LocationSet};
use crate::error::FuzzError;
use crate::messages::HttpMessage;
use crate::payloads::Payload;

use tracing::{instrument, trace};

/// round-robin over every location's payloads: round `k` substitutes the
/// `k`th payload of each location at the same time
///
/// sources of different lengths are allowed; once a location's source is
/// exhausted, that location keeps its original template text for the
/// remaining rounds and contributes nothing to the payload tuple
///
/// # Examples
///
/// given the locations and payloads
///
/// user: ["user1", "user2", "user3"]
/// pass: ["pass1", "pass2"]
///
/// the messages are produced in the order
///
///   user1: pass1
///   user2: pass2
///   user3: (original)
#[derive(Clone, Debug)]
pub struct BreadthFirstReplacer {
    set: LocationSet,
    lengths: Vec<usize>,
    round: usize,
    total: usize,
}

impl BreadthFirstReplacer {
    /// create a new breadth-first replacer over `locations` of `template`
    ///
    /// # Errors
    ///
    /// see [`Replacer::new`](super::Replacer::new)
    pub fn new(template: &HttpMessage, locations: Vec<FuzzLocation>) -> Result<Self, FuzzError> {
        let set = LocationSet::new(template, locations)?;

        let lengths: Vec<usize> = set.lengths().collect();
        let total = lengths.iter().copied().max().unwrap_or_default();

        Ok(Self {
            set,
            lengths,
            round: 0,
            total,
        })
    }

    /// the number of messages produced in total; the length of the longest
    /// payload source
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// the number of messages produced so far
    #[must_use]
    pub const fn produced(&self) -> usize {
        self.round
    }
}

impl Iterator for BreadthFirstReplacer {
    type Item = (HttpMessage, Vec<Payload>);

    #[instrument(skip(self), fields(round = self.round), level = "trace")]
    fn next(&mut self) -> Option<Self::Item> {
        if self.round >= self.total {
            trace!("breadth-first replacer has run to completion");
            return None;
        }

        let round = self.round;

        let choices: Vec<Option<usize>> = self
            .lengths
            .iter()
            .map(|length| (round < *length).then_some(round))
            .collect();

        self.round += 1;

        Some(self.set.render(&choices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::{MessageLocation, MessageSection};
    use crate::payloads::Wordlist;

    /// each round advances every location at once; exhausted locations fall
    /// back to the template text
    #[test]
    fn breadth_first_is_round_robin() -> Result<(), Box<dyn std::error::Error>> {
        let template = HttpMessage::get("http://localhost/")?.with_body("user=U&pass=P");

        let user = MessageLocation::locate(&template, MessageSection::RequestBody, "U")?;
        let pass = MessageLocation::locate(&template, MessageSection::RequestBody, "P")?;

        let replacer = BreadthFirstReplacer::new(
            &template,
            vec![
                FuzzLocation::new(user, Wordlist::with_words(["u1", "u2", "u3"]).name("users").build()),
                FuzzLocation::new(pass, Wordlist::with_words(["p1", "p2"]).name("passwords").build()),
            ],
        )?;

        assert_eq!(replacer.total(), 3);

        let produced: Vec<(String, Vec<Payload>)> = replacer
            .map(|(message, payloads)| (message.request_body().to_string(), payloads))
            .collect();

        assert_eq!(produced.len(), 3);
        assert_eq!(produced[0].0, "user=u1&pass=p1");
        assert_eq!(produced[1].0, "user=u2&pass=p2");
        assert_eq!(produced[2].0, "user=u3&pass=P");
        assert_eq!(produced[2].1, ["u3"]);
        Ok(())
    }
}
