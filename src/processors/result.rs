use std::any::Any;
use std::fmt::{self, Debug, Formatter};

use super::Processor;

use crate::actions::Action;
use crate::error::FuzzError;
use crate::fuzzers::TaskUtils;
use crate::results::FuzzResult;
use crate::std_ext::any::{AsAny, Named};

use tracing::instrument;

/// a `ResultProcessor` hands each task's [`FuzzResult`] to a user-supplied
/// closure, which decides whether the result is kept. The closure may attach
/// custom state, raise alerts through [`TaskUtils::raise_alert`], or inject
/// additional results.
///
/// # Examples
///
/// ```
/// # use locfuzz::actions::Action;
/// # use locfuzz::processors::ResultProcessor;
/// // keep only results whose response isn't a 404
/// let drop_not_found = ResultProcessor::new("drop-404", |_utils, result| {
///     let status = result.message().response().map(|response| response.status_code());
///     Ok(Action::from(status != Some(404)))
/// });
/// ```
#[derive(Clone)]
pub struct ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    name: String,
    processor: F,
}

impl<F> ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    /// create a new `ResultProcessor` named `name` that calls `processor` in its
    /// `process_result` method
    pub fn new(name: &str, processor: F) -> Self {
        Self {
            name: name.to_string(),
            processor,
        }
    }
}

impl<F> Processor for ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    #[instrument(skip_all, fields(name = %self.name), level = "trace")]
    fn process_result(
        &mut self,
        utils: &mut TaskUtils<'_>,
        result: &mut FuzzResult,
    ) -> Result<Action, FuzzError> {
        (self.processor)(utils, result)
    }
}

impl<F> Debug for ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultProcessor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Named for ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> AsAny for ResultProcessor<F>
where
    F: Fn(&mut TaskUtils<'_>, &mut FuzzResult) -> Result<Action, FuzzError> + Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}
