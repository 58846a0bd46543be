//! Stand-ins and the proxy factory contract
//!
//! A stand-in implements the same trait as the real object and turns
//! every method call into an [`Invocation`] fed to its evaluator chain.
//! Stand-ins compare equal exactly when they wrap the same object, no
//! matter which chain or factory call produced them.

use std::any::{type_name, Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Failure, SpinError, SpinResult};
use crate::evaluator::Chain;
use crate::invocation::{Arguments, Call, Invocation, Method, ObjectId, Target, Value};

/// A `(real object, evaluator chain)` pair
#[derive(Clone)]
pub struct Proxy {
    target: Target,
    chain: Chain,
}

impl Proxy {
    pub fn new<T>(object: Arc<T>, chain: Chain) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            target: Target::new(object),
            chain,
        }
    }

    #[inline]
    pub fn identity(&self) -> ObjectId {
        self.target.identity()
    }

    #[inline]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline]
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Reify a call and run it through the chain
    pub fn invoke(&self, method: Method, arguments: Arguments, call: Call) -> SpinResult<Value> {
        let mut invocation = Invocation::new(self.target.clone(), method, arguments, call);
        self.chain.evaluate(&mut invocation)?;
        match invocation.take_outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(SpinError::Failed(failure)),
            None => Err(SpinError::Unevaluated {
                method: method.name(),
            }),
        }
    }

    /// Typed form of [`invoke`](Self::invoke)
    ///
    /// `call` receives the real object as a `&T` on whichever thread the
    /// chain decides to run it.
    pub fn call<T, R, F>(&self, method: Method, arguments: Arguments, call: F) -> SpinResult<R>
    where
        T: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
        F: FnOnce(&T, Arguments) -> Result<R, Failure> + Send + 'static,
    {
        let thunk: Call = Box::new(move |target: &Target, arguments: Arguments| {
            let object = target.downcast::<T>().ok_or_else(|| {
                Failure::error(SpinError::ArgumentType {
                    method: method.name(),
                    index: 0,
                    expected: type_name::<T>(),
                })
            })?;
            let value = call(object.as_ref(), arguments)?;
            Ok(Box::new(value) as Value)
        });
        let value = self.invoke(method, arguments, thunk)?;
        value
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| SpinError::ReturnType {
                method: method.name(),
                expected: type_name::<R>(),
            })
    }

    /// [`call`](Self::call) for infallible trait methods
    ///
    /// A propagated panic resumes with its original payload on this thread;
    /// any other failure or bridge error panics with its message.
    pub fn call_or_raise<T, R, F>(&self, method: Method, arguments: Arguments, call: F) -> R
    where
        T: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
        F: FnOnce(&T, Arguments) -> Result<R, Failure> + Send + 'static,
    {
        match self.call(method, arguments, call) {
            Ok(value) => value,
            Err(SpinError::Failed(failure)) => failure.raise(),
            Err(err) => panic!("{}: {}", method.name(), err),
        }
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy").field("target", &self.target).finish()
    }
}

/// The call surface a stand-in exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    name: &'static str,
    methods: &'static [Method],
}

impl Surface {
    pub const fn new(name: &'static str, methods: &'static [Method]) -> Self {
        Self { name, methods }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn methods(&self) -> &'static [Method] {
        self.methods
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.methods.iter().copied().find(|m| m.name() == name)
    }

    /// Check the surface can be intercepted by name
    ///
    /// Calls are reified by method name, so an empty surface has nothing to
    /// intercept and overloaded names cannot be told apart.
    pub fn validate(&self) -> SpinResult<()> {
        if self.methods.is_empty() {
            return Err(SpinError::ProxyCreation {
                surface: self.name,
                reason: "surface declares no methods".to_string(),
            });
        }
        for (i, method) in self.methods.iter().enumerate() {
            if self.methods[..i].iter().any(|m| m.name() == method.name()) {
                return Err(SpinError::ProxyCreation {
                    surface: self.name,
                    reason: format!("method `{}` is declared more than once", method.name()),
                });
            }
        }
        Ok(())
    }
}

/// A generated stand-in for `dyn Target`
///
/// Usually produced by [`stand_in!`](crate::stand_in).
pub trait StandIn: Send + Sync + Sized + 'static {
    /// The trait object the stand-in impersonates
    type Target: ?Sized + Send + Sync + 'static;

    const SURFACE: Surface;

    fn from_proxy(proxy: Proxy) -> Self;

    fn proxy(&self) -> &Proxy;

    /// Erase into the impersonated trait object
    fn into_target(self) -> Arc<Self::Target>;
}

/// Rewrap function stored in listener arguments
pub(crate) fn spin_over_listener<S: StandIn>(value: Value, chain: &Chain) -> SpinResult<Value> {
    let object = value
        .downcast::<Arc<S::Target>>()
        .map_err(|_| SpinError::ArgumentType {
            method: S::SURFACE.name(),
            index: 0,
            expected: type_name::<Arc<S::Target>>(),
        })?;
    S::SURFACE.validate()?;
    let stand_in = S::from_proxy(Proxy::new(*object, Arc::clone(chain)));
    Ok(Box::new(stand_in.into_target()))
}

/// Produces stand-ins
pub trait ProxyFactory: Send + Sync {
    /// Wrap `object` so that every call goes through `chain`
    fn create_proxy<S: StandIn>(&self, object: Arc<S::Target>, chain: Chain) -> SpinResult<S>;

    /// Whether `candidate` is a stand-in (or bare proxy) from this factory
    fn is_proxy(&self, candidate: &dyn Any) -> bool;
}

/// Default factory for trait-object stand-ins
///
/// Remembers the stand-in types it produced so that `is_proxy` can
/// recognize them behind `&dyn Any`.
#[derive(Default)]
pub struct TraitProxyFactory {
    generated: Mutex<HashSet<TypeId>>,
}

impl TraitProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProxyFactory for TraitProxyFactory {
    fn create_proxy<S: StandIn>(&self, object: Arc<S::Target>, chain: Chain) -> SpinResult<S> {
        S::SURFACE.validate()?;
        self.generated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<S>());
        Ok(S::from_proxy(Proxy::new(object, chain)))
    }

    fn is_proxy(&self, candidate: &dyn Any) -> bool {
        if candidate.is::<Proxy>() {
            return true;
        }
        self.generated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&Any::type_id(candidate))
    }
}

impl fmt::Debug for TraitProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generated = self.generated.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("TraitProxyFactory")
            .field("generated", &generated)
            .finish()
    }
}
