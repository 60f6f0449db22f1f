// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Severity of a point-in-time event emitted through [`record_event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventLevel {
	/// Protocol bookkeeping (renewal joined, replay issued).
	Debug,
	/// Notable state transitions (renewal settled, session invalidated).
	Info,
	/// Failures that are handled locally and not surfaced to the caller.
	Warn,
}

/// A span builder used by session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a structured event for `kind` (when tracing is enabled).
///
/// Callers pass already-redacted values; secrets must never reach this function.
pub fn record_event(kind: FlowKind, level: EventLevel, message: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		match level {
			EventLevel::Debug => tracing::debug!(flow = kind.as_str(), "{message}"),
			EventLevel::Info => tracing::info!(flow = kind.as_str(), "{message}"),
			EventLevel::Warn => tracing::warn!(flow = kind.as_str(), "{message}"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, level, message);
	}
}
