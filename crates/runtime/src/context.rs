//! Thread-scoped binding of the invocation an evaluation runs for.
//!
//! Extension functions only receive their arguments and the XPath dynamic context, so the
//! message they read from is published here for the duration of one evaluation. Each
//! worker thread has its own slot; concurrent evaluations never see each other's messages.
use std::cell::RefCell;
use std::marker::PhantomData;

use crate::message::Invocation;

thread_local! {
    static CURRENT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

/// Per-evaluation state visible to extension functions.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    invocation: Invocation,
}

impl ExecutionContext {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Publishes this context on the calling thread until the guard is dropped.
    #[must_use = "the context is removed again when the guard is dropped"]
    pub fn install(self) -> ContextGuard {
        let installed = self.invocation.clone();
        let previous = CURRENT.with(|slot| slot.replace(Some(self)));
        ContextGuard { installed, previous, _not_send: PhantomData }
    }

    /// The context installed on the calling thread, if any.
    pub fn current() -> Option<ExecutionContext> {
        CURRENT.with(|slot| slot.borrow().clone())
    }

    /// Runs `f` against the installed context without cloning it. `f` must not install
    /// another context.
    pub fn with_current<R>(f: impl FnOnce(Option<&ExecutionContext>) -> R) -> R {
        CURRENT.with(|slot| f(slot.borrow().as_ref()))
    }
}

/// Restores the previously installed context on drop. Bound to the installing thread.
pub struct ContextGuard {
    installed: Invocation,
    previous: Option<ExecutionContext>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let matched = CURRENT.try_with(|slot| {
            slot.replace(previous).is_some_and(|current| current.invocation.ptr_eq(&self.installed))
        });
        // Err: the thread-local is already gone during thread teardown.
        if let Ok(false) = matched {
            tracing::error!("execution context was replaced during evaluation");
            debug_assert!(std::thread::panicking(), "execution context leaked between evaluations");
        }
    }
}
