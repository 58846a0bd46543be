//! Stand-in generator
//!
//! ```ignore
//! pub trait Canvas: Send + Sync {
//!     fn resize(&self, width: u32, height: u32) -> bool;
//!     fn add_paint_listener(&self, listener: Arc<dyn PaintListener>);
//! }
//!
//! stand_in! {
//!     pub struct CanvasStandIn for dyn Canvas {
//!         fn resize(&self, width: u32, height: u32) -> bool;
//!         fn add_paint_listener(&self, #[listener(PaintListenerStandIn)] listener: Arc<dyn PaintListener>);
//!     }
//! }
//! ```
//!
//! The trait must be `Send + Sync`, and every parameter type must be owned
//! (`Send + 'static`). Methods whose name is declared twice are rejected
//! when the stand-in is created.

/// Generate a stand-in struct for `dyn Trait`
///
/// See the [module docs](crate::macros).
#[macro_export]
macro_rules! stand_in {
    (@ret) => { () };
    (@ret $ret:ty) => { $ret };

    (@returns) => { "()" };
    (@returns $ret:ty) => { stringify!($ret) };

    (@argument $arg:ident) => { $crate::Argument::value($arg) };
    (@argument $arg:ident, $listener:ty) => {
        $crate::Argument::listener::<$listener>($arg)
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident for dyn $trait:ident {
            $(
                fn $method:ident(&self $(, $(#[listener($listener:ty)])? $arg:ident : $ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            proxy: $crate::Proxy,
        }

        impl $crate::StandIn for $name {
            type Target = dyn $trait;

            const SURFACE: $crate::Surface = $crate::Surface::new(
                stringify!($trait),
                &[$(
                    $crate::Method::new(
                        stringify!($method),
                        &[$(stringify!($ty)),*],
                        $crate::stand_in!(@returns $($ret)?),
                    )
                ),*],
            );

            fn from_proxy(proxy: $crate::Proxy) -> Self {
                Self { proxy }
            }

            fn proxy(&self) -> &$crate::Proxy {
                &self.proxy
            }

            fn into_target(self) -> ::std::sync::Arc<dyn $trait> {
                ::std::sync::Arc::new(self)
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.proxy == other.proxy
            }
        }

        impl ::std::cmp::Eq for $name {}

        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&self.proxy, state)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("target", self.proxy.target())
                    .finish()
            }
        }

        impl $trait for $name {
            $(
                fn $method(&self $(, $arg: $ty)*) -> $crate::stand_in!(@ret $($ret)?) {
                    const METHOD: $crate::Method = $crate::Method::new(
                        stringify!($method),
                        &[$(stringify!($ty)),*],
                        $crate::stand_in!(@returns $($ret)?),
                    );
                    let arguments = $crate::Arguments::from(::std::vec![
                        $($crate::stand_in!(@argument $arg $(, $listener)?)),*
                    ]);
                    self.proxy.call_or_raise::<dyn $trait, _, _>(
                        METHOD,
                        arguments,
                        |target, arguments| {
                            #[allow(unused_mut, unused_variables)]
                            let mut cursor = arguments.into_cursor(METHOD.name());
                            $(let $arg: $ty = cursor.next()?;)*
                            Ok(target.$method($($arg),*))
                        },
                    )
                }
            )*
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::error::{SpinError, SpinResult};
    use crate::evaluator::{terminal, Chain, Evaluator};
    use crate::invocation::Invocation;
    use crate::proxy::{ProxyFactory, StandIn, TraitProxyFactory};
    use std::panic;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub trait Ledger: Send + Sync {
        fn deposit(&self, amount: u64, memo: String) -> u64;
        fn balance(&self) -> u64;
        fn close(&self);
        fn add_audit_listener(&self, listener: Arc<dyn AuditListener>);
        fn remove_audit_listener(&self, listener: Arc<dyn AuditListener>);
    }

    pub trait AuditListener: Send + Sync {
        fn audited(&self, amount: u64);
    }

    crate::stand_in! {
        /// Ledger stand-in used by the tests
        pub struct LedgerStandIn for dyn Ledger {
            fn deposit(&self, amount: u64, memo: String) -> u64;
            fn balance(&self) -> u64;
            fn close(&self);
            fn add_audit_listener(&self, #[listener(AuditStandIn)] listener: Arc<dyn AuditListener>);
            fn remove_audit_listener(&self, #[listener(AuditStandIn)] listener: Arc<dyn AuditListener>);
        }
    }

    crate::stand_in! {
        struct AuditStandIn for dyn AuditListener {
            fn audited(&self, amount: u64);
        }
    }

    #[derive(Default)]
    struct Book {
        total: Mutex<u64>,
        memos: Mutex<Vec<String>>,
        listeners: Mutex<Vec<Arc<dyn AuditListener>>>,
    }

    impl Ledger for Book {
        fn deposit(&self, amount: u64, memo: String) -> u64 {
            let mut total = self.total.lock().unwrap();
            *total += amount;
            self.memos.lock().unwrap().push(memo);
            for listener in self.listeners.lock().unwrap().iter() {
                listener.audited(amount);
            }
            *total
        }

        fn balance(&self) -> u64 {
            *self.total.lock().unwrap()
        }

        fn close(&self) {
            panic!("ledger closed");
        }

        fn add_audit_listener(&self, listener: Arc<dyn AuditListener>) {
            self.listeners.lock().unwrap().push(listener);
        }

        fn remove_audit_listener(&self, listener: Arc<dyn AuditListener>) {
            let ptr = Arc::as_ptr(&listener) as *const ();
            self.listeners
                .lock()
                .unwrap()
                .retain(|l| Arc::as_ptr(l) as *const () != ptr);
        }
    }

    #[derive(Default)]
    struct Tally(AtomicUsize);

    impl AuditListener for Tally {
        fn audited(&self, amount: u64) {
            self.0.fetch_add(amount as usize, Ordering::SeqCst);
        }
    }

    fn counting(hops: &Arc<AtomicUsize>) -> Chain {
        let hops = Arc::clone(hops);
        let next = terminal();
        Arc::new(move |invocation: &mut Invocation| {
            hops.fetch_add(1, Ordering::SeqCst);
            next.evaluate(invocation)
        })
    }

    #[test]
    fn test_surface_matches_declaration() {
        let surface = LedgerStandIn::SURFACE;
        assert_eq!(surface.name(), "Ledger");
        assert_eq!(surface.methods().len(), 5);

        let deposit = surface.method("deposit").unwrap();
        assert_eq!(deposit.parameters(), &["u64", "String"]);
        assert_eq!(deposit.returns(), "u64");
        assert!(!surface.method("close").unwrap().returns_value());
        assert!(surface
            .method("add_audit_listener")
            .unwrap()
            .is_listener_registration());
        assert!(surface.validate().is_ok());
    }

    #[test]
    fn test_calls_are_reified_and_forwarded() {
        let hops = Arc::new(AtomicUsize::new(0));
        let book = Arc::new(Book::default());
        let ledger = TraitProxyFactory::new()
            .create_proxy::<LedgerStandIn>(book.clone(), counting(&hops))
            .unwrap()
            .into_target();

        assert_eq!(ledger.deposit(5, "first".into()), 5);
        assert_eq!(ledger.deposit(7, "second".into()), 12);
        assert_eq!(ledger.balance(), 12);
        assert_eq!(hops.load(Ordering::SeqCst), 3);
        assert_eq!(*book.memos.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_panic_resumes_with_original_payload() {
        let ledger = TraitProxyFactory::new()
            .create_proxy::<LedgerStandIn>(Arc::new(Book::default()), terminal())
            .unwrap();

        let payload = panic::catch_unwind(panic::AssertUnwindSafe(|| ledger.close())).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"ledger closed"));
    }

    #[test]
    fn test_listener_arguments_are_marked() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain: Chain = {
            let seen = Arc::clone(&seen);
            Arc::new(move |invocation: &mut Invocation| -> SpinResult<()> {
                let flags: Vec<bool> = invocation.arguments().iter().map(|a| a.is_listener()).collect();
                seen.lock().unwrap().push((invocation.method().name(), flags));
                invocation.evaluate()
            })
        };
        let ledger = TraitProxyFactory::new()
            .create_proxy::<LedgerStandIn>(Arc::new(Book::default()), chain)
            .unwrap();

        ledger.add_audit_listener(Arc::new(Tally::default()));
        ledger.deposit(1, String::new());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("add_audit_listener", vec![true]));
        assert_eq!(seen[1], ("deposit", vec![false, false]));
    }

    #[test]
    fn test_listener_rewrapped_through_chain() {
        let callback_hops = Arc::new(AtomicUsize::new(0));
        let over = counting(&callback_hops);

        // Rewrap listeners on registration, then perform the call
        let chain: Chain = Arc::new(move |invocation: &mut Invocation| -> SpinResult<()> {
            if invocation.method().is_listener_registration() {
                for argument in invocation.arguments_mut().iter_mut() {
                    argument.spin_over(&over)?;
                }
            }
            invocation.evaluate()
        });

        let book = Arc::new(Book::default());
        let ledger = TraitProxyFactory::new()
            .create_proxy::<LedgerStandIn>(book.clone(), chain)
            .unwrap();

        let tally = Arc::new(Tally::default());
        ledger.add_audit_listener(tally.clone());
        ledger.deposit(4, "a".into());
        ledger.deposit(6, "b".into());

        assert_eq!(tally.0.load(Ordering::SeqCst), 10);
        assert_eq!(callback_hops.load(Ordering::SeqCst), 2);

        // The book holds the stand-in, not the tally itself
        let registered = book.listeners.lock().unwrap()[0].clone();
        assert_ne!(
            Arc::as_ptr(&registered) as *const (),
            Arc::as_ptr(&tally) as *const ()
        );
    }

    #[test]
    fn test_chain_error_panics_with_message() {
        let refusing: Chain =
            Arc::new(|_: &mut Invocation| -> SpinResult<()> { Err(SpinError::OwnerUnavailable) });
        let ledger = TraitProxyFactory::new()
            .create_proxy::<LedgerStandIn>(Arc::new(Book::default()), refusing)
            .unwrap();

        let payload = panic::catch_unwind(panic::AssertUnwindSafe(|| ledger.balance())).unwrap_err();
        let message = payload.downcast_ref::<String>().cloned().unwrap_or_default();
        assert!(message.contains("balance"));
        assert!(message.contains("not accepting tasks"));
    }
}
