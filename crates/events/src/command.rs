use core::any::Any;

/// Upcast to [`Any`] so a type-erased command can be downcast to its concrete type.
///
/// Blanket-implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A request to change exactly one aggregate.
///
/// Commands represent **intent**; they are transient and are turned into events
/// (which are persisted) by the handler registered under [`Command::command_name`].
///
/// Multi-tenancy is not part of the command: the tenant travels in the
/// `RequestContext` handed to the command bus next to it.
pub trait Command: AsAny + core::fmt::Debug + Send + Sync {
    /// Routing key; exactly one handler is registered per name.
    fn command_name(&self) -> &'static str;
}
