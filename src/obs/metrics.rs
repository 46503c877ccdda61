// self
use crate::{
	forwarder::ForwardStage,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"iam_gateway_flow_total",
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

/// Records the stage a forwarded request terminated in (when enabled).
pub fn record_forward_stage(stage: ForwardStage) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("iam_gateway_forward_stage_total", "stage" => stage.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = stage;
	}
}
