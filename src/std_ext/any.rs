use std::any::Any;

/// an implementor of this trait can be cast to [`Any`] as part of a
/// dynamic dispatch system
pub trait AsAny {
    /// return the implementing type as `Any`
    ///
    /// the normal implementation of this is to return `self`
    fn as_any(&self) -> &dyn Any;
}

/// We need fixed names for many parts of this lib.
pub trait Named {
    /// Provide the name of this element.
    fn name(&self) -> &str;
}
