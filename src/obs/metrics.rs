// self
use crate::obs::{FlowKind, FlowOutcome};

/// Increments `session_broker_flow_total{flow, outcome}` (when metrics are enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_broker_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how many queued requests a settled renewal released, as the
/// `session_broker_renewal_waiters` histogram (when metrics are enabled).
pub fn record_renewal_waiters(waiters: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("session_broker_renewal_waiters").record(waiters as f64);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = waiters;
	}
}
