//! `TIMER_DEBUG`-gated profiling spans (spec.md §6, SPEC_FULL.md §4.10).
//!
//! Constructing a [`tracing`] span is always cheap even with no
//! subscriber installed; what this module gates is whether call sites
//! bother recording fine-grained timing fields at all. Structured
//! warnings for recoverable per-doc failures are emitted unconditionally
//! via plain `tracing::warn!`/`tracing::debug!` and are not affected by
//! this flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static TIMER_DEBUG: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

/// Reads `TIMER_DEBUG` from the environment once and caches the result.
/// Idempotent; safe to call from multiple threads or multiple times.
pub fn init() {
    INIT.call_once(|| {
        let enabled = std::env::var("TIMER_DEBUG")
            .map(|v| v == "1")
            .unwrap_or(false);
        TIMER_DEBUG.store(enabled, Ordering::Relaxed);
    });
}

/// Whether fine-grained timing spans should record their duration
/// fields. Call [`init`] at least once before relying on this; it is
/// also safe to call before `init()`, in which case it reads as `false`.
pub fn timer_debug_enabled() -> bool {
    TIMER_DEBUG.load(Ordering::Relaxed)
}

/// RAII guard that records elapsed time into a `tracing` span field
/// named `elapsed_us` when `TIMER_DEBUG=1`, and is otherwise a no-op
/// beyond the span's own (cheap) lifetime.
pub struct TimerGuard {
    span: tracing::Span,
    start: std::time::Instant,
    record: bool,
}

impl TimerGuard {
    pub fn start(span: tracing::Span) -> Self {
        Self {
            span,
            start: std::time::Instant::now(),
            record: timer_debug_enabled(),
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if self.record {
            let elapsed_us = self.start.elapsed().as_micros() as u64;
            self.span.record("elapsed_us", elapsed_us);
        }
    }
}
