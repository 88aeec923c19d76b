//! Profiling shim
//!
//! Named-range instrumentation as a trait with a null-object default,
//! selected when the manager is configured rather than at compile time.
//! Observational only: tracers must not affect execution.

/// Push/pop named ranges and name the calling thread for a profiler
pub trait ScopeTracer: Send + Sync + std::fmt::Debug {
    fn push_range(&self, name: &str);
    fn pop_range(&self);
    fn name_thread(&self, name: &str);
}

/// Default tracer: every operation is a no-op
#[derive(Debug, Default)]
pub struct NoopTracer;

impl ScopeTracer for NoopTracer {
    fn push_range(&self, _name: &str) {}
    fn pop_range(&self) {}
    fn name_thread(&self, _name: &str) {}
}

/// Tracer that mirrors ranges into the `tracing` log stream.
///
/// Useful when no external profiler is attached; range boundaries show up
/// as trace-level events.
#[derive(Debug, Default)]
pub struct LogTracer;

impl ScopeTracer for LogTracer {
    fn push_range(&self, name: &str) {
        tracing::trace!(target: "hipmux::trace", "range push: {}", name);
    }

    fn pop_range(&self) {
        tracing::trace!(target: "hipmux::trace", "range pop");
    }

    fn name_thread(&self, name: &str) {
        tracing::trace!(target: "hipmux::trace", "thread named: {}", name);
    }
}

/// RAII guard: pushes a range on creation, pops it on drop
pub struct TraceScope<'a> {
    tracer: &'a dyn ScopeTracer,
}

impl<'a> TraceScope<'a> {
    pub fn new(tracer: &'a dyn ScopeTracer, name: &str) -> Self {
        tracer.push_range(name);
        TraceScope { tracer }
    }
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        self.tracer.pop_range();
    }
}
