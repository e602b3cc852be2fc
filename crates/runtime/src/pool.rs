//! Pool of interchangeable instances of one compiled expression.
//!
//! An [`XPathExpression`] keeps an evaluation stack and a call-site cache, so one instance
//! can only serve one evaluation at a time. The pool hands instances out through the
//! [`PooledExpression`] guard, which puts them back when dropped, whatever way the
//! evaluation ended. The pool never blocks: a miss instantiates a new expression.
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::queue::SegQueue;
use relay_xpath::compiler::ir::CompiledXPath;
use relay_xpath::{SimpleNode, XPathCompiler, XPathExpression, compile_xpath_with_context};

use crate::error::EvaluatorError;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub idle: usize,
    pub checked_out: usize,
    pub created: usize,
    pub high_water: usize,
}

pub struct ExpressionPool {
    source: String,
    compiler: XPathCompiler<SimpleNode>,
    program: OnceLock<Arc<CompiledXPath>>,
    idle: SegQueue<XPathExpression<SimpleNode>>,
    max_idle: Option<usize>,
    closed: AtomicBool,
    checked_out: AtomicUsize,
    created: AtomicUsize,
    high_water: AtomicUsize,
}

impl ExpressionPool {
    /// Nothing is compiled until the first [`acquire`](Self::acquire).
    pub fn new(source: impl Into<String>, compiler: XPathCompiler<SimpleNode>) -> Self {
        Self {
            source: source.into(),
            compiler,
            program: OnceLock::new(),
            idle: SegQueue::new(),
            max_idle: None,
            closed: AtomicBool::new(false),
            checked_out: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Caps the number of idle instances kept; further released instances are dropped.
    #[must_use]
    pub fn with_max_idle(mut self, max_idle: Option<usize>) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Checks out an idle instance, or creates one when none is idle.
    pub fn acquire(&self) -> Result<PooledExpression<'_>, EvaluatorError> {
        if self.is_shutdown() {
            return Err(EvaluatorError::Shutdown { expression: self.source.clone() });
        }
        let expr = match self.idle.pop() {
            Some(expr) => {
                tracing::trace!(expression = %self.source, "pool hit");
                expr
            }
            None => self.create()?,
        };
        let checked_out = self.checked_out.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(checked_out, Ordering::AcqRel);
        Ok(PooledExpression { pool: self, expr: Some(expr) })
    }

    fn create(&self) -> Result<XPathExpression<SimpleNode>, EvaluatorError> {
        let program = match self.program.get() {
            Some(program) => Arc::clone(program),
            None => {
                let compiled = compile_xpath_with_context(&self.source, self.compiler.static_context())
                    .map_err(|source| EvaluatorError::Configuration { expression: self.source.clone(), source })?;
                Arc::clone(self.program.get_or_init(|| Arc::new(compiled)))
            }
        };
        let created = self.created.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(expression = %self.source, created, "pool miss, new expression instance");
        Ok(self.compiler.instantiate(program))
    }

    /// Whether a released instance should go back to the idle queue.
    fn has_room(&self) -> bool {
        !self.is_shutdown() && self.max_idle.is_none_or(|max| self.idle.len() < max)
    }

    fn release(&self, expr: XPathExpression<SimpleNode>) {
        self.idle.push(expr);
        tracing::trace!(expression = %self.source, "expression released");
        // Shutdown may have drained the queue between the room check and the push.
        if self.is_shutdown() {
            self.drain();
        }
    }

    fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.idle.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Drops all idle instances and refuses further checkouts. Instances still checked out
    /// are dropped when their guards are.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = self.drain();
        tracing::debug!(expression = %self.source, dropped, "expression pool shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            checked_out: self.checked_out.load(Ordering::Acquire),
            created: self.created.load(Ordering::Acquire),
            high_water: self.high_water.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for ExpressionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionPool")
            .field("source", &self.source)
            .field("max_idle", &self.max_idle)
            .field("stats", &self.stats())
            .field("closed", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

/// Exclusive use of one pooled expression; returns it to the pool on drop.
pub struct PooledExpression<'a> {
    pool: &'a ExpressionPool,
    // Some until drop hands the instance back.
    expr: Option<XPathExpression<SimpleNode>>,
}

impl fmt::Debug for PooledExpression<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledExpression").finish_non_exhaustive()
    }
}

impl Deref for PooledExpression<'_> {
    type Target = XPathExpression<SimpleNode>;

    fn deref(&self) -> &Self::Target {
        self.expr.as_ref().expect("pooled expression is present until dropped")
    }
}

impl DerefMut for PooledExpression<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.expr.as_mut().expect("pooled expression is present until dropped")
    }
}

impl Drop for PooledExpression<'_> {
    fn drop(&mut self) {
        if let Some(expr) = self.expr.take() {
            if self.pool.has_room() {
                self.pool.release(expr);
            } else {
                tracing::trace!(expression = %self.pool.source, "expression dropped instead of pooled");
            }
        }
        // An instance on its way back to the queue still counts as checked out.
        self.pool.checked_out.fetch_sub(1, Ordering::AcqRel);
    }
}
