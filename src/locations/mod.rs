//! Fuzz locations and the strategies that combine their payloads into concrete messages
#![allow(clippy::use_self)] // clippy false-positive on ReplacementStrategy, doesn't want to apply directly to the enums that derive Serialize
mod breadth_first;
mod depth_first;

pub use self::breadth_first::BreadthFirstReplacer;
pub use self::depth_first::DepthFirstReplacer;
pub use crate::messages::MessageSection;

use crate::error::FuzzError;
use crate::messages::HttpMessage;
use crate::payloads::{Named, Payload, PayloadGenerator, PayloadSource};
use crate::std_ext::ops::Len;

use std::fmt::{self, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// a substitutable region of a message template, addressed by byte offsets
/// into one of the request sections
///
/// locations order by section first (header before body), then by offset
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MessageLocation {
    section: MessageSection,
    start: usize,
    end: usize,
}

impl MessageLocation {
    /// create a location spanning `start..end` of the given request section
    ///
    /// an empty range (`start == end`) is an insertion point
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidLocation`] when the section isn't a request
    /// section or `start > end`
    pub fn new(section: MessageSection, start: usize, end: usize) -> Result<Self, FuzzError> {
        if !section.is_request() {
            return Err(FuzzError::InvalidLocation {
                section,
                start,
                end,
                reason: "only request sections can be fuzzed",
            });
        }

        if start > end {
            return Err(FuzzError::InvalidLocation {
                section,
                start,
                end,
                reason: "start is after end",
            });
        }

        Ok(Self {
            section,
            start,
            end,
        })
    }

    /// create a location covering the first occurrence of `needle` within
    /// `section` of `message`
    ///
    /// # Examples
    ///
    /// ```
    /// # use locfuzz::locations::{MessageLocation, MessageSection};
    /// # use locfuzz::messages::HttpMessage;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let message = HttpMessage::get("http://localhost/")?.with_body("user=admin&pass=secret");
    ///
    /// let location = MessageLocation::locate(&message, MessageSection::RequestBody, "secret")?;
    ///
    /// assert_eq!(location.value_in(&message), Some("secret"));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// returns [`FuzzError::InvalidLocation`] when `needle` isn't present
    pub fn locate(message: &HttpMessage, section: MessageSection, needle: &str) -> Result<Self, FuzzError> {
        let text = message.text_for(section);

        let start = text.find(needle).ok_or(FuzzError::InvalidLocation {
            section,
            start: 0,
            end: 0,
            reason: "text not found in message",
        })?;

        Self::new(section, start, start + needle.len())
    }

    /// the section this location points into
    #[must_use]
    pub const fn section(&self) -> MessageSection {
        self.section
    }

    /// inclusive start offset
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// exclusive end offset
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    /// the text this location currently covers in `message`, or `None` when
    /// it doesn't fit
    #[must_use]
    pub fn value_in<'m>(&self, message: &'m HttpMessage) -> Option<&'m str> {
        let text = match self.section {
            MessageSection::RequestHeader => message.request_header(),
            MessageSection::RequestBody => message.request_body(),
            MessageSection::ResponseHeader | MessageSection::ResponseBody => return None,
        };

        text.get(self.start..self.end)
    }

    /// `true` when both locations cover at least one shared byte of the same
    /// section, or sit at the same insertion point
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        if !matches!(
            (self.section, other.section),
            (MessageSection::RequestHeader, MessageSection::RequestHeader)
                | (MessageSection::RequestBody, MessageSection::RequestBody)
        ) {
            return false;
        }

        if self.start == other.start {
            return true;
        }

        self.start < other.end && other.start < self.end
    }

    fn validate_against(&self, message: &HttpMessage) -> Result<(), FuzzError> {
        if self.value_in(message).is_none() {
            error!(%self, "fuzz location doesn't fit the message template");

            return Err(FuzzError::InvalidLocation {
                section: self.section,
                start: self.start,
                end: self.end,
                reason: "out of bounds or not on a character boundary",
            });
        }

        Ok(())
    }
}

impl Display for MessageLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.section, self.start, self.end)
    }
}

/// a [`MessageLocation`] bound to the [`PayloadSource`] that feeds it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuzzLocation {
    location: MessageLocation,
    payloads: PayloadSource,
}

impl FuzzLocation {
    /// bind `payloads` to `location`
    #[must_use]
    pub const fn new(location: MessageLocation, payloads: PayloadSource) -> Self {
        Self { location, payloads }
    }

    /// where payloads are substituted
    #[must_use]
    pub const fn location(&self) -> &MessageLocation {
        &self.location
    }

    /// what gets substituted
    #[must_use]
    pub const fn payloads(&self) -> &PayloadSource {
        &self.payloads
    }
}

/// the order in which payloads of multiple locations are combined
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum ReplacementStrategy {
    /// nested loops; the last location varies fastest
    #[default]
    DepthFirst,

    /// round-robin; round `k` uses the `k`th payload of every location
    BreadthFirst,
}

/// the validated template and locations shared by both replacers
#[derive(Clone, Debug)]
struct LocationSet {
    template: HttpMessage,
    locations: Vec<FuzzLocation>,
    originals: Vec<String>,
}

impl LocationSet {
    #[instrument(skip_all, level = "trace")]
    fn new(template: &HttpMessage, mut locations: Vec<FuzzLocation>) -> Result<Self, FuzzError> {
        if locations.is_empty() {
            error!("a message replacer needs at least one fuzz location");
            return Err(FuzzError::NoFuzzLocations);
        }

        locations.sort_by_key(|fuzz_location| fuzz_location.location);

        for fuzz_location in &locations {
            fuzz_location.location.validate_against(template)?;

            if fuzz_location.payloads.is_empty() {
                error!(name = fuzz_location.payloads.name(), "payload source is empty");

                return Err(FuzzError::EmptyPayloads {
                    name: fuzz_location.payloads.name().to_string(),
                });
            }
        }

        for pair in locations.windows(2) {
            if pair[0].location.overlaps(&pair[1].location) {
                return Err(FuzzError::OverlappingLocations {
                    first: pair[0].location.to_string(),
                    second: pair[1].location.to_string(),
                });
            }
        }

        let originals = locations
            .iter()
            .map(|fuzz_location| {
                fuzz_location
                    .location
                    .value_in(template)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();

        // generated messages never inherit the template's response
        let mut template = template.clone();
        template.clear_response();

        Ok(Self {
            template,
            locations,
            originals,
        })
    }

    fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.locations.iter().map(|fuzz_location| fuzz_location.payloads.len())
    }

    /// build one message; `choices[i]` is the payload index for location `i`,
    /// or `None` to leave the location's original text in place
    ///
    /// the payload tuple holds the substituted payloads, in location order
    fn render(&self, choices: &[Option<usize>]) -> (HttpMessage, Vec<Payload>) {
        let mut message = self.template.clone();
        let mut payloads = Vec::with_capacity(choices.len());

        for (fuzz_location, choice) in self.locations.iter().zip(choices) {
            if let Some(payload) = choice.and_then(|index| fuzz_location.payloads.get(index)) {
                payloads.push(payload.clone());
            }
        }

        // substituting from the highest offset down keeps every lower offset valid
        for (index, fuzz_location) in self.locations.iter().enumerate().rev() {
            let location = &fuzz_location.location;

            let replacement = choices
                .get(index)
                .copied()
                .flatten()
                .and_then(|choice| fuzz_location.payloads.get(choice))
                .map_or(self.originals[index].as_str(), Payload::as_str);

            if let Some(text) = message.text_mut(location.section) {
                text.replace_range(location.start..location.end, replacement);
            }
        }

        (message, payloads)
    }
}

/// forward-only source of fuzzed messages, paired with the payloads that
/// produced each one
///
/// # Examples
///
/// ```
/// # use locfuzz::locations::{FuzzLocation, MessageLocation, MessageSection, ReplacementStrategy, Replacer};
/// # use locfuzz::messages::HttpMessage;
/// # use locfuzz::payloads::Wordlist;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let template = HttpMessage::get("http://localhost/")?.with_body("user=USER&pass=PASS");
///
/// let user = MessageLocation::locate(&template, MessageSection::RequestBody, "USER")?;
/// let pass = MessageLocation::locate(&template, MessageSection::RequestBody, "PASS")?;
///
/// let locations = vec![
///     FuzzLocation::new(user, Wordlist::with_words(["admin", "root"]).name("users").build()),
///     FuzzLocation::new(pass, Wordlist::with_words(["x", "y"]).name("passwords").build()),
/// ];
///
/// let replacer = Replacer::new(ReplacementStrategy::DepthFirst, &template, locations)?;
/// assert_eq!(replacer.total(), 4);
///
/// let bodies: Vec<String> = replacer.map(|(message, _)| message.request_body().to_string()).collect();
///
/// assert_eq!(
///     bodies,
///     ["user=admin&pass=x", "user=admin&pass=y", "user=root&pass=x", "user=root&pass=y"]
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Replacer {
    /// [`DepthFirstReplacer`] wrapper
    DepthFirst(DepthFirstReplacer),

    /// [`BreadthFirstReplacer`] wrapper
    BreadthFirst(BreadthFirstReplacer),
}

impl Replacer {
    /// create the replacer for `strategy`
    ///
    /// locations are put in location order before use
    ///
    /// # Errors
    ///
    /// returns an error when there are no locations, a location doesn't fit
    /// the template, two locations overlap, or a payload source is empty
    pub fn new(
        strategy: ReplacementStrategy,
        template: &HttpMessage,
        locations: Vec<FuzzLocation>,
    ) -> Result<Self, FuzzError> {
        let replacer = match strategy {
            ReplacementStrategy::DepthFirst => {
                Self::DepthFirst(DepthFirstReplacer::new(template, locations)?)
            }
            ReplacementStrategy::BreadthFirst => {
                Self::BreadthFirst(BreadthFirstReplacer::new(template, locations)?)
            }
        };

        Ok(replacer)
    }

    /// the number of messages this replacer produces in total
    #[must_use]
    pub fn total(&self) -> usize {
        match self {
            Self::DepthFirst(replacer) => replacer.total(),
            Self::BreadthFirst(replacer) => replacer.total(),
        }
    }

    /// the number of messages produced so far
    #[must_use]
    pub fn produced(&self) -> usize {
        match self {
            Self::DepthFirst(replacer) => replacer.produced(),
            Self::BreadthFirst(replacer) => replacer.produced(),
        }
    }
}

impl Iterator for Replacer {
    type Item = (HttpMessage, Vec<Payload>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::DepthFirst(replacer) => replacer.next(),
            Self::BreadthFirst(replacer) => replacer.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.produced());
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::Wordlist;

    fn template() -> Result<HttpMessage, FuzzError> {
        Ok(HttpMessage::get("http://localhost/")?.with_body("a=AAA&b=BBB"))
    }

    /// locations can't point outside the template or split a character
    #[test]
    fn locations_are_validated_against_the_template() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::get("http://localhost/")?.with_body("é=1");

        let out_of_bounds = MessageLocation::new(MessageSection::RequestBody, 2, 99)?;
        assert!(out_of_bounds.validate_against(&message).is_err());

        // the 'é' is two bytes wide
        let split_char = MessageLocation::new(MessageSection::RequestBody, 1, 2)?;
        assert!(split_char.validate_against(&message).is_err());

        assert!(MessageLocation::new(MessageSection::ResponseBody, 0, 1).is_err());
        assert!(MessageLocation::new(MessageSection::RequestBody, 3, 1).is_err());
        Ok(())
    }

    /// overlapping locations are rejected, adjacent ones aren't
    #[test]
    fn overlapping_locations_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let message = template()?;
        let words = || Wordlist::with_words(["x"]).name("w").build();

        let first = MessageLocation::new(MessageSection::RequestBody, 2, 5)?;
        let overlapping = MessageLocation::new(MessageSection::RequestBody, 4, 6)?;
        let adjacent = MessageLocation::new(MessageSection::RequestBody, 5, 6)?;
        let in_header = MessageLocation::new(MessageSection::RequestHeader, 4, 6)?;

        assert!(first.overlaps(&overlapping));
        assert!(!first.overlaps(&adjacent));
        assert!(!first.overlaps(&in_header));

        let result = Replacer::new(
            ReplacementStrategy::DepthFirst,
            &message,
            vec![FuzzLocation::new(first, words()), FuzzLocation::new(overlapping, words())],
        );
        assert!(matches!(result, Err(FuzzError::OverlappingLocations { .. })));

        let result = Replacer::new(
            ReplacementStrategy::DepthFirst,
            &message,
            vec![FuzzLocation::new(first, words()), FuzzLocation::new(adjacent, words())],
        );
        assert!(result.is_ok());
        Ok(())
    }

    /// no locations, or an empty payload source, is an error
    #[test]
    fn replacer_requires_locations_with_payloads() -> Result<(), Box<dyn std::error::Error>> {
        let message = template()?;

        let result = Replacer::new(ReplacementStrategy::BreadthFirst, &message, Vec::new());
        assert!(matches!(result, Err(FuzzError::NoFuzzLocations)));

        let location = MessageLocation::locate(&message, MessageSection::RequestBody, "AAA")?;
        let empty = Wordlist::with_words(Vec::<&str>::new()).name("empty").build();

        let result = Replacer::new(
            ReplacementStrategy::BreadthFirst,
            &message,
            vec![FuzzLocation::new(location, empty)],
        );
        assert!(matches!(result, Err(FuzzError::EmptyPayloads { .. })));
        Ok(())
    }

    /// substitutions of different lengths don't disturb each other, and the
    /// template's response is never carried over
    #[test]
    fn render_substitutes_every_location() -> Result<(), Box<dyn std::error::Error>> {
        let mut message = template()?;
        message.set_response(crate::messages::HttpResponse::default());

        let a = MessageLocation::locate(&message, MessageSection::RequestBody, "AAA")?;
        let b = MessageLocation::locate(&message, MessageSection::RequestBody, "BBB")?;
        let path = MessageLocation::locate(&message, MessageSection::RequestHeader, "/ HTTP")?;
        let path = MessageLocation::new(MessageSection::RequestHeader, path.start() + 1, path.start() + 1)?;

        let mut replacer = Replacer::new(
            ReplacementStrategy::DepthFirst,
            &message,
            vec![
                FuzzLocation::new(b, Wordlist::with_words(["2"]).name("b").build()),
                FuzzLocation::new(a, Wordlist::with_words(["a much longer value"]).name("a").build()),
                FuzzLocation::new(path, Wordlist::with_words(["admin"]).name("path").build()),
            ],
        )?;

        let (fuzzed, payloads) = replacer.next().ok_or("no message")?;

        assert_eq!(fuzzed.request_body(), "a=a much longer value&b=2");
        assert_eq!(fuzzed.request_target(), "http://localhost/admin");
        assert!(fuzzed.response().is_none());
        // header location sorts before body locations
        assert_eq!(payloads, ["admin", "a much longer value", "2"]);
        assert!(replacer.next().is_none());
        Ok(())
    }
}
