//! Metrics declarations for DEM coregistration.
//!
//! Every metric emitted while fitting and applying coregistration
//! estimators, declared as [`Metric`] constants in [`metric_defs`].
//!
//! # Example
//!
//! ```rust,ignore
//! use demreg_metrics::{metric_defs, describe_metrics, FitLabels};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! let labels = FitLabels::new("NuthKaab", "points");
//! metrics::counter!(metric_defs::COREG_FITS.name, &labels.to_labels()).increment(1);
//! ```
//!
//! Metrics are emitted through the `metrics` facade, so nothing is recorded
//! unless the application installs a recorder.

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name, kind and metadata of one metric, buildable in `const` context.
///
/// ```rust
/// use demreg_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FITS: Metric = Metric::counter("demreg.coreg.fits")
///     .with_description("Completed fits")
///     .with_unit(Unit::Count)
///     .with_labels(&["method"]);
///
/// assert_eq!(FITS.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys the metric is recorded with.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        let unit = self.unit.unwrap_or(Unit::Count);
        match (self.kind, self.unit.is_some()) {
            (MetricKind::Counter, true) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, false) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, true) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, false) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, true) => describe_histogram!(self.name, unit, self.description),
            (MetricKind::Histogram, false) => describe_histogram!(self.name, self.description),
        }
    }
}

/// Metric definitions for all coregistration metrics.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label keys attached to every fit metric. Fits run inside a pipeline
    /// also carry `step`.
    pub const FIT_LABELS: &[&str] = &["method", "reference"];

    // Fitting

    pub const COREG_FITS: Metric = Metric::counter("demreg.coreg.fits")
        .with_description("Completed estimator fits")
        .with_unit(Unit::Count)
        .with_labels(FIT_LABELS);

    pub const COREG_FIT_FAILURES: Metric = Metric::counter("demreg.coreg.fit_failures")
        .with_description("Estimator fits that returned an error")
        .with_unit(Unit::Count)
        .with_labels(&["method", "reference", "error"]);

    pub const COREG_NOT_CONVERGED: Metric = Metric::counter("demreg.coreg.not_converged")
        .with_description("Fits that stopped at the iteration cap")
        .with_unit(Unit::Count)
        .with_labels(FIT_LABELS);

    pub const COREG_ITERATIONS: Metric = Metric::histogram("demreg.coreg.iterations")
        .with_description("Iterations used per fit")
        .with_unit(Unit::Count)
        .with_labels(FIT_LABELS);

    pub const COREG_SAMPLES: Metric = Metric::histogram("demreg.coreg.samples")
        .with_description("Valid reference samples used per fit")
        .with_unit(Unit::Count)
        .with_labels(FIT_LABELS);

    pub const COREG_RESIDUAL_NMAD: Metric = Metric::gauge("demreg.coreg.residual_nmad_m")
        .with_description("NMAD of elevation residuals after the last fit, in metres")
        .with_labels(FIT_LABELS);

    // Application

    pub const COREG_APPLY_CELLS: Metric = Metric::histogram("demreg.coreg.apply_cells")
        .with_description("Cells produced when applying a fitted transformation")
        .with_unit(Unit::Count)
        .with_labels(&["method"]);

    pub const ALL: &[&Metric] = &[
        &COREG_FITS,
        &COREG_FIT_FAILURES,
        &COREG_NOT_CONVERGED,
        &COREG_ITERATIONS,
        &COREG_SAMPLES,
        &COREG_RESIDUAL_NMAD,
        &COREG_APPLY_CELLS,
    ];
}

/// Labels identifying a fit: estimator name, reference kind and, for
/// pipeline steps, the step index.
#[derive(Debug, Clone)]
pub struct FitLabels {
    pub method: String,
    pub reference: String,
    pub step: Option<usize>,
}

impl FitLabels {
    pub fn new(method: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            reference: reference.into(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: Option<usize>) -> Self {
        self.step = step;
        self
    }

    /// Key/value pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![
            ("method", self.method.clone()),
            ("reference", self.reference.clone()),
        ];
        if let Some(step) = self.step {
            labels.push(("step", step.to_string()));
        }
        labels
    }

    /// Labels plus extra key/value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Registers descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
