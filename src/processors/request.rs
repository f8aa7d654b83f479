use std::any::Any;
use std::fmt::{self, Debug, Formatter};

use super::Processor;

use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::messages::HttpMessage;
use crate::std_ext::any::{AsAny, Named};

use tracing::instrument;

/// a `RequestProcessor` hands the message that is about to be sent to a
/// user-supplied closure, along with the task's [`TaskUtils`]. The closure
/// may rewrite the message and the task's payloads.
///
/// # Examples
///
/// ```
/// # use locfuzz::processors::{ProcessorChain, RequestProcessor};
/// let add_token = RequestProcessor::new("add-token", |_utils, message| {
///     message.set_header("X-Token", "1234");
///     Ok(())
/// });
///
/// let chain = ProcessorChain::default();
/// chain.push(add_token);
///
/// assert_eq!(chain.names(), vec!["add-token"]);
/// ```
#[derive(Clone)]
pub struct RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    name: String,
    processor: F,
}

impl<F> RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    /// create a new `RequestProcessor` named `name` that calls `processor` in
    /// its `process_message` method. Since `processor` receives an
    /// [`HttpMessage`] as input, the implication is that it only makes sense
    /// to make `process_message` available.
    pub fn new(name: &str, processor: F) -> Self {
        Self {
            name: name.to_string(),
            processor,
        }
    }
}

impl<F> Processor for RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    #[instrument(skip_all, fields(name = %self.name), level = "trace")]
    fn process_message(
        &mut self,
        utils: &mut TaskUtils<'_>,
        message: &mut HttpMessage,
    ) -> Result<(), FuzzError> {
        (self.processor)(utils, message)
    }
}

impl<F> Debug for RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestProcessor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Named for RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> AsAny for RequestProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut HttpMessage) -> Result<(), FuzzError> + Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}
