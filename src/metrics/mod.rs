//! Fire-and-forget metrics.
//!
//! Sinks receive numeric datapoints once per invocation; a sink must
//! never surface a failure to the caller, so `record` is infallible by
//! contract and implementations swallow their own errors.

use tracing::debug;

/// Unit of a datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
    Seconds,
}

/// One numeric measurement.
#[derive(Debug, Clone)]
pub struct Datapoint {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
}

impl Datapoint {
    pub fn count(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value,
            unit: Unit::Count,
        }
    }

    pub fn seconds(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value,
            unit: Unit::Seconds,
        }
    }
}

/// Seam to the metrics backend.
pub trait MetricsSink: Send + Sync {
    fn record(&self, datapoints: &[Datapoint]);
}

/// Default sink: datapoints land in the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&self, datapoints: &[Datapoint]) {
        for dp in datapoints {
            debug!(metric = dp.name, value = dp.value, unit = ?dp.unit, "datapoint");
        }
    }
}

/// Sink that drops everything; useful under test.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _datapoints: &[Datapoint]) {}
}
