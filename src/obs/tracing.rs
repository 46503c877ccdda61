// self
use crate::{_prelude::*, forwarder::ForwardStage, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by gateway flows.
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
			let span = tracing::info_span!("iam_gateway.flow", flow = kind.as_str(), stage);

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

/// Emits a debug event for a forwarding state transition.
pub fn trace_stage(stage: ForwardStage) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(stage = stage.as_str(), "forward stage reached");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = stage;
	}
}

/// Installs the process-wide `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_logging() {
	#[cfg(feature = "tracing")]
	{
		use tracing_subscriber::EnvFilter;

		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
		let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn logging_init_is_idempotent() {
		init_logging();
		init_logging();
		trace_stage(ForwardStage::Start);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
