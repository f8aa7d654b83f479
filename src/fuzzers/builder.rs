// clippy complains of missing const, but we can't use const because of the typestate
// needing to run the destructor of self as it moves through the states
#![allow(clippy::missing_const_for_fn)]
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{error, instrument};

#[allow(clippy::wildcard_imports)]
use super::typestate::*;
use super::HttpFuzzer;
use crate::client::HttpSender;
use crate::error::FuzzError;
use crate::history::{HistoryStore, InMemoryHistory};
use crate::locations::{FuzzLocation, Replacer};
use crate::messages::HttpMessage;
use crate::options::FuzzerOptions;
use crate::processors::{Processor, ProcessorChain};
use crate::state::SharedState;

// SS - sender state
// MS - message state
// LS - locations state
/// create a new [`FuzzerBuilder`] that, when finalized with [`FuzzerBuilder::build`],
/// will create an [`HttpFuzzer`]
///
/// mandatory build methods:
/// - [`FuzzerBuilder::sender`]
/// - [`FuzzerBuilder::message`]
/// - [`FuzzerBuilder::location`] or [`FuzzerBuilder::locations`]
///
/// optional build methods:
/// - [`FuzzerBuilder::options`]
/// - [`FuzzerBuilder::processor`]
/// - [`FuzzerBuilder::history`]
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use locfuzz::client::BlockingClient;
/// # use locfuzz::fuzzers::HttpFuzzer;
/// # use locfuzz::locations::{FuzzLocation, MessageLocation};
/// # use locfuzz::messages::{HttpMessage, MessageSection};
/// # use locfuzz::options::FuzzerOptions;
/// # use locfuzz::payloads::Wordlist;
/// # use locfuzz::processors::RequestContentLengthUpdater;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = FuzzerOptions::default().with_thread_count(4);
/// let client = BlockingClient::new(options.max_redirects(), options.request_timeout())?;
///
/// let message = HttpMessage::new(
///     "POST http://localhost/login HTTP/1.1\r\nHost: localhost\r\n",
///     "user=admin&pass=FUZZ",
/// )?;
///
/// let location = MessageLocation::locate(&message, MessageSection::RequestBody, "FUZZ")?;
/// let passwords = Wordlist::with_words(["123456", "password"]).name("passwords").build();
///
/// let fuzzer = HttpFuzzer::builder()
///     .sender(Arc::new(client))
///     .message(message)
///     .location(FuzzLocation::new(location, passwords))
///     .options(options)
///     .processor(RequestContentLengthUpdater::new())
///     .build()?;
///
/// assert_eq!(fuzzer.maximum(), 2);
/// # Ok(())
/// # }
/// ```
pub struct FuzzerBuilder<SS, MS, LS>
where
    SS: FuzzerBuildState,
    MS: FuzzerBuildState,
    LS: FuzzerBuildState,
{
    sender: Option<Arc<dyn HttpSender>>,
    message: Option<HttpMessage>,
    locations: Vec<FuzzLocation>,
    options: FuzzerOptions,
    processors: Vec<Box<dyn Processor>>,
    history: Option<Arc<dyn HistoryStore>>,

    _sender_state: PhantomData<SS>,
    _message_state: PhantomData<MS>,
    _locations_state: PhantomData<LS>,
}

impl FuzzerBuilder<NoSender, NoMessage, NoLocations> {
    /// create a new, empty [`FuzzerBuilder`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            sender: None,
            message: None,
            locations: Vec::new(),
            options: FuzzerOptions::default(),
            processors: Vec::new(),
            history: None,
            _sender_state: PhantomData,
            _message_state: PhantomData,
            _locations_state: PhantomData,
        }
    }
}

impl Default for FuzzerBuilder<NoSender, NoMessage, NoLocations> {
    fn default() -> Self {
        Self::new()
    }
}

impl<SS, MS, LS> FuzzerBuilder<SS, MS, LS>
where
    SS: FuzzerBuildState,
    MS: FuzzerBuildState,
    LS: FuzzerBuildState,
{
    /// the transport every message of the session is sent with
    pub fn sender(self, sender: Arc<dyn HttpSender>) -> FuzzerBuilder<HasSender, MS, LS> {
        FuzzerBuilder {
            sender: Some(sender),
            message: self.message,
            locations: self.locations,
            options: self.options,
            processors: self.processors,
            history: self.history,
            _sender_state: PhantomData,
            _message_state: PhantomData,
            _locations_state: PhantomData,
        }
    }

    /// the message template; sent as-is as the baseline when it has no response
    pub fn message(self, message: HttpMessage) -> FuzzerBuilder<SS, HasMessage, LS> {
        FuzzerBuilder {
            sender: self.sender,
            message: Some(message),
            locations: self.locations,
            options: self.options,
            processors: self.processors,
            history: self.history,
            _sender_state: PhantomData,
            _message_state: PhantomData,
            _locations_state: PhantomData,
        }
    }

    /// add one fuzz location; may be called repeatedly
    pub fn location(mut self, location: FuzzLocation) -> FuzzerBuilder<SS, MS, HasLocations> {
        self.locations.push(location);

        FuzzerBuilder {
            sender: self.sender,
            message: self.message,
            locations: self.locations,
            options: self.options,
            processors: self.processors,
            history: self.history,
            _sender_state: PhantomData,
            _message_state: PhantomData,
            _locations_state: PhantomData,
        }
    }

    /// add several fuzz locations at once
    pub fn locations<I>(mut self, locations: I) -> FuzzerBuilder<SS, MS, HasLocations>
    where
        I: IntoIterator<Item = FuzzLocation>,
    {
        self.locations.extend(locations);

        FuzzerBuilder {
            sender: self.sender,
            message: self.message,
            locations: self.locations,
            options: self.options,
            processors: self.processors,
            history: self.history,
            _sender_state: PhantomData,
            _message_state: PhantomData,
            _locations_state: PhantomData,
        }
    }

    /// engine options; defaults to [`FuzzerOptions::default`]
    pub fn options(mut self, options: FuzzerOptions) -> Self {
        self.options = options;
        self
    }

    /// append a processor to the chain; processors run in the order they're added
    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// where messages with alerts are persisted; defaults to an [`InMemoryHistory`]
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }
}

impl FuzzerBuilder<HasSender, HasMessage, HasLocations> {
    /// finalize the builder
    ///
    /// # Errors
    ///
    /// returns an error if the options are invalid, or if the locations can't
    /// be used with the message (see [`Replacer::new`])
    #[instrument(skip_all, level = "trace")]
    pub fn build(self) -> Result<HttpFuzzer, FuzzError> {
        self.options.validate()?;

        let (Some(sender), Some(message)) = (self.sender, self.message) else {
            error!("fuzzer builder is missing its sender or message");

            return Err(FuzzError::InvalidParameter {
                param: String::from("sender/message"),
                message: "a fuzzer needs both a sender and a message",
            });
        };

        let replacer = Replacer::new(self.options.strategy(), &message, self.locations)?;

        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));

        let state = SharedState::new(&self.options, history);

        Ok(HttpFuzzer::new(
            self.options,
            state,
            sender,
            message,
            replacer,
            ProcessorChain::new(self.processors),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::ScriptedSender;
    use crate::locations::{MessageLocation, ReplacementStrategy};
    use crate::messages::MessageSection;
    use crate::payloads::Wordlist;
    use crate::processors::{PayloadReflectionDetector, RequestContentLengthUpdater};

    fn location(message: &HttpMessage, needle: &str, words: &[&str]) -> Result<FuzzLocation, FuzzError> {
        let location = MessageLocation::locate(message, MessageSection::RequestBody, needle)?;
        Ok(FuzzLocation::new(location, Wordlist::with_words(words.to_vec()).name(needle).build()))
    }

    /// totals follow the configured strategy, processors keep their order
    #[test]
    fn build_with_strategy_and_processors() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::new(
            "POST http://localhost/login HTTP/1.1\r\nHost: localhost\r\n",
            "user=USER&pass=PASS",
        )?;

        let fuzzer = FuzzerBuilder::new()
            .sender(Arc::new(ScriptedSender::default()))
            .message(message.clone())
            .location(location(&message, "USER", &["a", "b", "c"])?)
            .location(location(&message, "PASS", &["1", "2"])?)
            .options(FuzzerOptions::default().with_strategy(ReplacementStrategy::BreadthFirst))
            .processor(RequestContentLengthUpdater::new())
            .processor(PayloadReflectionDetector::new())
            .build()?;

        assert_eq!(fuzzer.maximum(), 3);
        assert_eq!(
            fuzzer.processors().names(),
            vec!["RequestContentLengthUpdater", "PayloadReflectionDetector"]
        );

        let depth_first = HttpFuzzer::builder()
            .sender(Arc::new(ScriptedSender::default()))
            .message(message.clone())
            .locations([
                location(&message, "USER", &["a", "b", "c"])?,
                location(&message, "PASS", &["1", "2"])?,
            ])
            .build()?;

        assert_eq!(depth_first.maximum(), 6);
        Ok(())
    }

    /// invalid options and unusable locations fail the build
    #[test]
    fn build_rejects_bad_configuration() -> Result<(), Box<dyn std::error::Error>> {
        let message = HttpMessage::new("POST http://localhost/ HTTP/1.1\r\nHost: localhost\r\n", "a=FUZZ")?;
        let fuzz = location(&message, "FUZZ", &["x"])?;

        let zero_threads = HttpFuzzer::builder()
            .sender(Arc::new(ScriptedSender::default()))
            .message(message.clone())
            .location(fuzz.clone())
            .options(FuzzerOptions::default().with_thread_count(0))
            .build();
        assert!(zero_threads.is_err());

        let shorter = HttpMessage::new("POST http://localhost/ HTTP/1.1\r\nHost: localhost\r\n", "a")?;
        let out_of_bounds = HttpFuzzer::builder()
            .sender(Arc::new(ScriptedSender::default()))
            .message(shorter)
            .location(fuzz)
            .build();
        assert!(out_of_bounds.is_err());
        Ok(())
    }
}
