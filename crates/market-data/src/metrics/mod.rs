//! Call outcome recording for observability.
//!
//! Every facade call produces one [`CallRecord`]. The recorder keeps the most
//! recent ones in a ring buffer and maintains totals that survive eviction.

mod record;
mod recorder;

pub use record::{CallFilter, CallOutcome, CallRecord};
pub use recorder::{LatencyPercentiles, MetricsRecorder, MetricsSummary};
