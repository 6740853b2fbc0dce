//! Lifecycle and streaming hooks for pipeline runs.
//!
//! A run emits an event when a step starts, for every streamed token, when a
//! step ends, and before each transport retry. Implement [`EventHandler`] to
//! drive progress output or a streaming UI.

use std::sync::Arc;

/// Events emitted while a pipeline runs.
#[derive(Debug, Clone)]
pub enum Event {
    /// A step is about to call the provider.
    StepStart {
        /// Step name.
        name: String,
        /// 0-based position among the enabled steps.
        index: usize,
        /// Number of enabled steps.
        total: usize,
    },
    /// A token was received during streaming.
    Token {
        /// Step producing this token.
        name: String,
        /// The token text.
        chunk: String,
    },
    /// A step has finished.
    StepEnd {
        /// Step name.
        name: String,
        /// Whether the step produced an output.
        ok: bool,
    },
    /// A transport-level retry after a transient provider error.
    TransportRetry {
        /// Step being retried.
        name: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Delay before this attempt in milliseconds.
        delay_ms: u64,
        /// Error that triggered the retry.
        reason: String,
    },
}

/// Handler for run lifecycle events.
///
/// Entirely optional; pipelines run the same without one.
///
/// # Example
///
/// ```
/// use crew_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::Token { chunk, .. } => print!("{}", chunk),
///             Event::StepStart { name, index, total } => {
///                 println!("[{}/{}] {}", index + 1, total, name)
///             }
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// ```
/// use crew_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::Token { chunk, .. } = event {
///         print!("{}", chunk);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
