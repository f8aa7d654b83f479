use super::{FuzzLocation, LocationSet};
use crate::error::FuzzError;
use crate::messages::HttpMessage;
use crate::payloads::Payload;

use tracing::{instrument, trace};

/// private bookkeeping for one location's position in the nested loops
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct PayloadIndex {
    // number of payloads in the location's source
    length: usize,

    // number of messages produced between two advances of this index, i.e.
    // the product of the lengths of every location after it
    //
    // example:
    //
    // given the lengths `[4, 3, 2]`, the strides are `[6, 2, 1]`
    stride: usize,
}

impl PayloadIndex {
    #[inline]
    const fn at(self, produced: usize) -> usize {
        (produced / self.stride) % self.length
    }
}

/// Cartesian product of every location's payloads, roughly equivalent to
/// nested for-loops where the last location (in location order) is the
/// innermost loop
///
/// # Examples
///
/// given the locations and payloads
///
/// user: ["user1", "user2"]
/// pass: ["pass1", "pass2", "pass3"]
///
/// the messages are produced in the order
///
///   user1: pass1
///   user1: pass2
///   user1: pass3
///   user2: pass1
///   user2: pass2
///   user2: pass3
#[derive(Clone, Debug)]
pub struct DepthFirstReplacer {
    set: LocationSet,
    indices: Vec<PayloadIndex>,
    produced: usize,
    total: usize,
}

impl DepthFirstReplacer {
    /// create a new depth-first replacer over `locations` of `template`
    ///
    /// # Errors
    ///
    /// see [`Replacer::new`](super::Replacer::new)
    pub fn new(template: &HttpMessage, locations: Vec<FuzzLocation>) -> Result<Self, FuzzError> {
        let set = LocationSet::new(template, locations)?;

        let lengths: Vec<usize> = set.lengths().collect();

        let mut indices = vec![PayloadIndex::default(); lengths.len()];
        let mut stride = 1_usize;

        for (index, length) in indices.iter_mut().zip(&lengths).rev() {
            index.length = *length;
            index.stride = stride;
            stride = stride.saturating_mul(*length);
        }

        Ok(Self {
            set,
            indices,
            produced: 0,
            total: stride,
        })
    }

    /// the number of messages produced in total; the product of every
    /// location's payload count
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// the number of messages produced so far
    #[must_use]
    pub const fn produced(&self) -> usize {
        self.produced
    }
}

impl Iterator for DepthFirstReplacer {
    type Item = (HttpMessage, Vec<Payload>);

    #[instrument(skip(self), fields(produced = self.produced), level = "trace")]
    fn next(&mut self) -> Option<Self::Item> {
        if self.produced >= self.total {
            trace!("depth-first replacer has run to completion");
            return None;
        }

        let choices: Vec<Option<usize>> = self
            .indices
            .iter()
            .map(|index| Some(index.at(self.produced)))
            .collect();

        self.produced += 1;

        Some(self.set.render(&choices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::{MessageLocation, MessageSection};
    use crate::payloads::Wordlist;

    /// the last location varies fastest and every combination appears exactly once
    #[test]
    fn depth_first_is_nested_loops() -> Result<(), Box<dyn std::error::Error>> {
        let template = HttpMessage::get("http://localhost/")?.with_body("A-B-C");

        let location = |needle: &str| MessageLocation::locate(&template, MessageSection::RequestBody, needle);

        let replacer = DepthFirstReplacer::new(
            &template,
            vec![
                FuzzLocation::new(location("C")?, Wordlist::with_words(["5", "6"]).name("c").build()),
                FuzzLocation::new(location("A")?, Wordlist::with_words(["1", "2"]).name("a").build()),
                FuzzLocation::new(location("B")?, Wordlist::with_words(["3", "4"]).name("b").build()),
            ],
        )?;

        assert_eq!(replacer.total(), 8);

        let bodies: Vec<String> = replacer
            .map(|(message, _)| message.request_body().to_string())
            .collect();

        assert_eq!(
            bodies,
            ["1-3-5", "1-3-6", "1-4-5", "1-4-6", "2-3-5", "2-3-6", "2-4-5", "2-4-6"]
        );
        Ok(())
    }

    /// the payload tuple follows location order
    #[test]
    fn depth_first_reports_payloads_in_location_order() -> Result<(), Box<dyn std::error::Error>> {
        let template = HttpMessage::get("http://localhost/")?.with_body("X Y");

        let x = MessageLocation::locate(&template, MessageSection::RequestBody, "X")?;
        let y = MessageLocation::locate(&template, MessageSection::RequestBody, "Y")?;

        let mut replacer = DepthFirstReplacer::new(
            &template,
            vec![
                FuzzLocation::new(x, Wordlist::with_words(["x1"]).name("x").build()),
                FuzzLocation::new(y, Wordlist::with_words(["y1", "y2"]).name("y").build()),
            ],
        )?;

        assert_eq!(replacer.next().map(|(_, payloads)| payloads), Some(vec!["x1".into(), "y1".into()]));
        assert_eq!(replacer.next().map(|(_, payloads)| payloads), Some(vec!["x1".into(), "y2".into()]));
        assert!(replacer.next().is_none());
        assert!(replacer.next().is_none());
        assert_eq!(replacer.produced(), 2);
        Ok(())
    }
}
