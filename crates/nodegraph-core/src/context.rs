//! Per-call cancellation, deadlines and operation names.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;

/// The context every query and mutation runs under.
///
/// A context is cheap to clone. Cancelling a parent cancels every context
/// derived from it; a derived context may add its own cancel flag or a
/// tighter deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    flags: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    op: Option<&'static str>,
}

/// Cancels the context it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancellable context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let mut ctx = self.clone();
        ctx.flags.push(flag.clone());
        (ctx, CancelHandle(flag))
    }

    /// Derive a context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        ctx
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tag the context with the name of the running operation.
    pub fn with_op(&self, op: &'static str) -> Self {
        let mut ctx = self.clone();
        ctx.op = Some(op);
        ctx
    }

    /// Name of the running operation, e.g. `"All"` or `"Only"`.
    pub fn op(&self) -> Option<&'static str> {
        self.op
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// Fail if the context was cancelled or its deadline passed.
    pub fn err(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
