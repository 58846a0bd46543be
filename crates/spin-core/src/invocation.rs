//! Reified method calls
//!
//! An [`Invocation`] captures everything needed to perform one call later,
//! possibly on another thread: the target object, a [`Method`] descriptor,
//! the [`Arguments`], and a call thunk that knows the target's concrete
//! type. Its outcome slot is written exactly once, either by
//! [`Invocation::evaluate`] or by a stage that short-circuits the call.

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Failure, SpinError, SpinResult};
use crate::evaluator::Chain;
use crate::proxy::{spin_over_listener, StandIn};

/// A call's return value, type-erased
pub type Value = Box<dyn Any + Send>;

/// Outcome slot contents: the returned value XOR the failure
pub type Outcome = Result<Value, Failure>;

/// Thunk that performs the real call against the target
pub type Call = Box<dyn FnOnce(&Target, Arguments) -> Outcome + Send>;

/// Rewrites a listener argument into a stand-in routed through `chain`
pub type Rewrap = fn(Value, &Chain) -> SpinResult<Value>;

/// Identity of a wrapped object (its address)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Identity of the object behind `object`
    #[inline]
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:#x})", self.0)
    }
}

/// The real object a call is aimed at, with its concrete type erased
#[derive(Clone)]
pub struct Target {
    object: Arc<dyn Any + Send + Sync>,
    id: ObjectId,
    type_name: &'static str,
}

impl Target {
    pub fn new<T>(object: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = ObjectId::of(&object);
        Self {
            object: Arc::new(object),
            id,
            type_name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn identity(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed handle, if `T` is the wrapped type
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.object.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .finish()
    }
}

/// Selector plus parameter/return shape of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    name: &'static str,
    parameters: &'static [&'static str],
    returns: &'static str,
}

impl Method {
    pub const fn new(
        name: &'static str,
        parameters: &'static [&'static str],
        returns: &'static str,
    ) -> Self {
        Self {
            name,
            parameters,
            returns,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn parameters(&self) -> &'static [&'static str] {
        self.parameters
    }

    #[inline]
    pub fn returns(&self) -> &'static str {
        self.returns
    }

    /// Whether callers expect a value back (anything but `()`)
    pub fn returns_value(&self) -> bool {
        self.returns.trim() != "()"
    }

    /// `add_*_listener` / `remove_*_listener`
    pub fn is_listener_registration(&self) -> bool {
        self.name.ends_with("_listener")
            && (self.name.starts_with("add_") || self.name.starts_with("remove_"))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.parameters.join(", "))?;
        if self.returns_value() {
            write!(f, " -> {}", self.returns)?;
        }
        Ok(())
    }
}

/// One call argument
pub struct Argument {
    value: Value,
    type_name: &'static str,
    rewrap: Option<Rewrap>,
}

impl Argument {
    /// A plain argument, passed through untouched
    pub fn value<V: Send + 'static>(value: V) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<V>(),
            rewrap: None,
        }
    }

    /// A callback object that should itself be spun over when registered
    pub fn listener<S: StandIn>(object: Arc<S::Target>) -> Self {
        Self {
            value: Box::new(object),
            type_name: type_name::<Arc<S::Target>>(),
            rewrap: Some(spin_over_listener::<S>),
        }
    }

    #[inline]
    pub fn is_listener(&self) -> bool {
        self.rewrap.is_some()
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn get<V: 'static>(&self) -> Option<&V> {
        self.value.downcast_ref::<V>()
    }

    /// Swap in a new value (argument-rewriting stages)
    pub fn replace<V: Send + 'static>(&mut self, value: V) -> Value {
        self.type_name = type_name::<V>();
        self.rewrap = None;
        std::mem::replace(&mut self.value, Box::new(value))
    }

    /// Replace a listener argument with a stand-in routed through `chain`
    ///
    /// Returns `false` for plain arguments. A rewritten argument is no
    /// longer marked as a listener, so it is never wrapped twice.
    pub fn spin_over(&mut self, chain: &Chain) -> SpinResult<bool> {
        let Some(rewrap) = self.rewrap.take() else {
            return Ok(false);
        };
        let value = std::mem::replace(&mut self.value, Box::new(()));
        self.value = rewrap(value, chain)?;
        Ok(true)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("type", &self.type_name)
            .field("listener", &self.is_listener())
            .finish()
    }
}

/// Ordered argument list, mutable in place
#[derive(Debug, Default)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, argument: Argument) {
        self.0.push(argument);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Argument> {
        self.0.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Argument> {
        self.0.iter_mut()
    }

    /// Consume the arguments in order
    pub fn into_cursor(self, method: &'static str) -> ArgumentCursor {
        ArgumentCursor {
            method,
            index: 0,
            inner: self.0.into_iter(),
        }
    }
}

impl From<Vec<Argument>> for Arguments {
    fn from(arguments: Vec<Argument>) -> Self {
        Self(arguments)
    }
}

/// Typed, in-order reader over consumed arguments
pub struct ArgumentCursor {
    method: &'static str,
    index: usize,
    inner: std::vec::IntoIter<Argument>,
}

impl ArgumentCursor {
    /// Next argument as a `V`
    pub fn next<V: 'static>(&mut self) -> Result<V, Failure> {
        let (method, index) = (self.method, self.index);
        self.index += 1;
        let mismatch = || {
            Failure::error(SpinError::ArgumentType {
                method,
                index,
                expected: type_name::<V>(),
            })
        };
        let argument = self.inner.next().ok_or_else(mismatch)?;
        argument
            .value
            .downcast::<V>()
            .map(|value| *value)
            .map_err(|_| mismatch())
    }
}

/// A reified call with a write-once outcome slot
pub struct Invocation {
    target: Target,
    method: Method,
    arguments: Arguments,
    call: Option<Call>,
    outcome: Option<Outcome>,
}

impl Invocation {
    pub fn new(target: Target, method: Method, arguments: Arguments, call: Call) -> Self {
        Self {
            target,
            method,
            arguments,
            call: Some(call),
            outcome: None,
        }
    }

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    #[inline]
    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    #[inline]
    pub fn has_outcome(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Perform the real call on the current thread
    ///
    /// A panic in the callee is caught and stored as `Failure::Panic`.
    pub fn evaluate(&mut self) -> SpinResult<()> {
        let call = self.call.take().ok_or(SpinError::AlreadyEvaluated {
            method: self.method.name,
        })?;
        let arguments = std::mem::take(&mut self.arguments);
        let target = &self.target;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(target, arguments)))
            .unwrap_or_else(|payload| Err(Failure::panic(payload)));
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Short-circuit with a value; the real call will never run
    pub fn set_result(&mut self, value: Value) -> SpinResult<()> {
        self.settle(Ok(value))
    }

    /// Short-circuit with a failure; the real call will never run
    pub fn set_failure(&mut self, failure: Failure) -> SpinResult<()> {
        self.settle(Err(failure))
    }

    fn settle(&mut self, outcome: Outcome) -> SpinResult<()> {
        if self.outcome.is_some() {
            return Err(SpinError::AlreadyEvaluated {
                method: self.method.name,
            });
        }
        self.call = None;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Move the outcome out for the original caller
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    /// Hand the whole invocation off by ownership
    ///
    /// Leaves a vacant shell (same target and method, no arguments, no
    /// call) in place; the caller overwrites it with the invocation when it
    /// comes back.
    pub fn take(&mut self) -> Invocation {
        let shell = Invocation {
            target: self.target.clone(),
            method: self.method,
            arguments: Arguments::new(),
            call: None,
            outcome: None,
        };
        std::mem::replace(self, shell)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("target", &self.target)
            .field("method", &self.method.name)
            .field("arguments", &self.arguments.len())
            .field("pending", &self.call.is_some())
            .field("outcome", &self.outcome.as_ref().map(|o| o.is_ok()))
            .finish()
    }
}
