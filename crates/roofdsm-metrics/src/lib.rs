//! Metric declarations for the roof measurement pipeline.
//!
//! Every metric the pipeline records is declared once in [`metric_defs`], so
//! names are never retyped at call sites. Installing a recorder or exporter
//! is left to the embedding service.
//!
//! ```rust
//! use roofdsm_metrics::{metric_defs, describe_metrics};
//!
//! describe_metrics();
//! metrics::counter!(metric_defs::PIPELINE_RUNS.name, "provider" => "footprint_dsm").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_histogram, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
}

/// A metric declaration.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub description: &'static str,
}

impl Metric {
    pub const fn counter(name: &'static str, unit: Unit, description: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            unit,
            description,
        }
    }

    pub const fn histogram(name: &'static str, unit: Unit, description: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            unit,
            description,
        }
    }

    /// Register this metric's description with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metrics recorded by the pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels: provider (footprint_dsm, dsm_mask, dsm_heuristic)
    pub const PIPELINE_RUNS: Metric = Metric::counter(
        "roofdsm.pipeline.runs",
        Unit::Count,
        "Measurements completed",
    );

    /// Labels: stage (geocode, layers, footprint, elevation, mask, ...)
    pub const PIPELINE_FAILURES: Metric = Metric::counter(
        "roofdsm.pipeline.failures",
        Unit::Count,
        "Measurements aborted by a fatal error",
    );

    /// Labels: kind (footprint_unavailable, mask_unavailable, ...)
    pub const PIPELINE_FALLBACKS: Metric = Metric::counter(
        "roofdsm.pipeline.fallbacks",
        Unit::Count,
        "Stage failures absorbed by a documented fallback",
    );

    pub const PIPELINE_DURATION: Metric = Metric::histogram(
        "roofdsm.pipeline.duration_ms",
        Unit::Milliseconds,
        "Measurement duration in milliseconds",
    );

    /// Labels: layer (elevation, mask, true_color)
    pub const RASTER_BYTES: Metric = Metric::counter(
        "roofdsm.raster.bytes_fetched",
        Unit::Bytes,
        "Raster bytes downloaded",
    );

    pub const ROOF_PIXELS: Metric = Metric::histogram(
        "roofdsm.analysis.roof_pixels",
        Unit::Count,
        "Pixels classified as roof per measurement",
    );

    pub const ALL: &[Metric] = &[
        PIPELINE_RUNS,
        PIPELINE_FAILURES,
        PIPELINE_FALLBACKS,
        PIPELINE_DURATION,
        RASTER_BYTES,
        ROOF_PIXELS,
    ];
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
