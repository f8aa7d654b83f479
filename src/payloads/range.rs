use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;

use super::typestate::{HasItems, HasName, NoItems, NoName, PayloadBuildState};
use super::{Named, Payload, PayloadGenerator, PayloadSource};
use crate::error::FuzzError;
use crate::std_ext::ops::Len;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::error;

/// an implementor of the [`PayloadGenerator`] trait that produces a range of
/// integers, i.e. for fuzzing ids
#[derive(Clone, Debug, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangePayloads {
    start: i64,
    stop: i64,
    step: i64,
    items: Vec<Payload>,
    source_name: String,
}

impl Display for RangePayloads {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RangePayloads::{{start={}, stop={}, step={}}}",
            self.start, self.stop, self.step
        )
    }
}

impl RangePayloads {
    /// create a new/empty `RangeBuilder`
    ///
    /// # Note
    ///
    /// `RangeBuilder::build` can only be called after `RangeBuilder::name` and
    /// `RangeBuilder::stop` have been called. `start` defaults to `0` and `step` to `1`;
    /// `stop` is exclusive.
    ///
    /// # Examples
    ///
    /// ```
    /// # use locfuzz::payloads::RangePayloads;
    /// # use locfuzz::Len;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let ids = RangePayloads::new().name("ids").stop(10).build()?;
    ///
    /// assert_eq!(ids.len(), 10);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub const fn new() -> RangeBuilder<NoItems, NoName> {
        RangeBuilder {
            start: None,
            stop: None,
            step: None,
            source_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    /// create a new `RangeBuilder` with the given `stop` value
    ///
    /// # Examples
    ///
    /// ```
    /// # use locfuzz::payloads::{PayloadGenerator, RangePayloads};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let evens = RangePayloads::with_stop(10).name("evens").step(2).build()?;
    ///
    /// assert_eq!(evens.items(), &["0", "2", "4", "6", "8"]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub const fn with_stop(stop: i64) -> RangeBuilder<HasItems, NoName> {
        RangeBuilder {
            start: None,
            stop: Some(stop),
            step: None,
            source_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl Named for RangePayloads {
    fn name(&self) -> &str {
        &self.source_name
    }
}

impl PayloadGenerator for RangePayloads {
    fn get(&self, index: usize) -> Option<&Payload> {
        self.items.get(index)
    }

    fn items(&self) -> &[Payload] {
        &self.items
    }
}

impl Len for RangePayloads {
    fn len(&self) -> usize {
        self.items.len()
    }
}

/// typestate builder for [`RangePayloads`]
pub struct RangeBuilder<IS, NS>
where
    IS: PayloadBuildState,
    NS: PayloadBuildState,
{
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    source_name: Option<String>,
    _item_state: PhantomData<IS>,
    _name_state: PhantomData<NS>,
}

impl<IS> RangeBuilder<IS, NoName>
where
    IS: PayloadBuildState,
{
    /// name the range
    pub fn name(self, source_name: &str) -> RangeBuilder<IS, HasName> {
        RangeBuilder {
            start: self.start,
            stop: self.stop,
            step: self.step,
            source_name: Some(source_name.to_string()),
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl<IS, NS> RangeBuilder<IS, NS>
where
    IS: PayloadBuildState,
    NS: PayloadBuildState,
{
    /// first value of the range (inclusive)
    #[allow(clippy::missing_const_for_fn)]
    pub fn start(self, start: i64) -> Self {
        Self {
            start: Some(start),
            ..self
        }
    }

    /// end of the range (exclusive)
    #[allow(clippy::missing_const_for_fn)]
    pub fn stop(self, stop: i64) -> RangeBuilder<HasItems, NS> {
        RangeBuilder {
            start: self.start,
            stop: Some(stop),
            step: self.step,
            source_name: self.source_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    /// distance between consecutive values; may be negative for a descending range
    #[allow(clippy::missing_const_for_fn)]
    pub fn step(self, step: i64) -> Self {
        Self {
            step: Some(step),
            ..self
        }
    }
}

impl RangeBuilder<HasItems, HasName> {
    /// # Errors
    ///
    /// returns an error when
    /// - `start` and `stop` are equal values
    /// - `step` is 0
    /// - `step` points away from `stop`
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(self) -> Result<PayloadSource, FuzzError> {
        let start = self.start.unwrap_or(0);
        let stop = self.stop.unwrap_or_default();
        let step = self.step.unwrap_or(1);

        if step == 0 {
            error!(%start, %stop, %step, "RangePayloads step cannot be 0");

            return Err(FuzzError::InvalidParameter {
                param: step.to_string(),
                message: "RangePayloads can't have a step of 0",
            });
        }

        if start == stop {
            error!(%start, %stop, %step, "RangePayloads start and stop cannot be equal");

            return Err(FuzzError::InvalidParameter {
                param: stop.to_string(),
                message: "RangePayloads with equal start and stop values would be empty",
            });
        }

        if (step.is_negative() && stop > start) || (step.is_positive() && stop < start) {
            error!(%start, %stop, %step, "RangePayloads step points away from `stop`");

            return Err(FuzzError::InvalidParameter {
                param: step.to_string(),
                message: "RangePayloads step must move `start` towards `stop`",
            });
        }

        let items = if step.is_negative() {
            ((stop + 1)..=start)
                .rev()
                .step_by(step.unsigned_abs() as usize)
                .map(|i| Payload::from(i.to_string()))
                .collect()
        } else {
            (start..stop)
                .step_by(step as usize)
                .map(|i| Payload::from(i.to_string()))
                .collect()
        };

        Ok(PayloadSource::Range(RangePayloads {
            start,
            stop,
            step,
            items,
            source_name: self.source_name.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// hit the different ok/err branches of the builder
    #[test]
    fn range_payloads_with_variations_on_constructor() {
        assert!(RangePayloads::new().name("range").stop(1).step(0).build().is_err());
        assert!(RangePayloads::new().name("range").start(1).stop(1).build().is_err());
        assert!(RangePayloads::new().name("range").stop(10).step(-1).build().is_err());
        assert!(RangePayloads::new().name("range").start(10).stop(0).build().is_err());
        assert!(RangePayloads::new().name("range").start(10).stop(0).step(-1).build().is_ok());
    }

    /// descending ranges exclude `stop`, same as ascending ones
    #[test]
    fn descending_range_excludes_stop() -> Result<(), FuzzError> {
        let range = RangePayloads::with_stop(0).start(6).step(-2).name("down").build()?;

        assert_eq!(range.items(), &["6", "4", "2"]);
        assert_eq!(range.name(), "down");
        Ok(())
    }
}
