//! Fit metrics emitted through the `metrics` facade.
//!
//! Each test installs a thread-local debugging recorder, so tests do not
//! share the global recorder.

mod common;

use common::{displaced, reference};
use demreg_coreg::{
    Coreg, CoregPipeline, FitOptions, NuthKaab, NuthKaabParams, Reference, VerticalShift,
};
use demreg_dem::InlierMask;
use demreg_metrics::metric_defs;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

const SIZE: usize = 100;

/// One recorded metric: name, labels and value.
struct Recorded {
    name: String,
    labels: Vec<(String, String)>,
    value: DebugValue,
}

impl Recorded {
    fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Run `f` with a local recorder and return everything it recorded.
fn record<F: FnOnce()>(f: F) -> Vec<Recorded> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let key = key.key();
            Recorded {
                name: key.name().to_string(),
                labels: key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect(),
                value,
            }
        })
        .collect()
}

fn counter(recorded: &[Recorded], name: &str, method: &str) -> u64 {
    recorded
        .iter()
        .filter(|r| r.name == name && r.label("method") == Some(method))
        .map(|r| match r.value {
            DebugValue::Counter(n) => n,
            _ => 0,
        })
        .sum()
}

#[test]
fn test_successful_fit_metrics() {
    let reference = reference(SIZE);
    let tba = displaced(SIZE, 8.0, 4.0, 2.0);

    let recorded = record(|| {
        NuthKaab::default()
            .fit(&Reference::Surface(&reference), &tba, None, &FitOptions::seeded(3))
            .unwrap();
    });

    assert_eq!(counter(&recorded, metric_defs::COREG_FITS.name, "NuthKaab"), 1);
    assert_eq!(counter(&recorded, metric_defs::COREG_FIT_FAILURES.name, "NuthKaab"), 0);
    assert_eq!(counter(&recorded, metric_defs::COREG_NOT_CONVERGED.name, "NuthKaab"), 0);

    let fits = recorded
        .iter()
        .find(|r| r.name == metric_defs::COREG_FITS.name)
        .unwrap();
    assert_eq!(fits.label("reference"), Some("surface"));
    assert_eq!(fits.label("step"), None);

    let samples = recorded
        .iter()
        .find(|r| r.name == metric_defs::COREG_SAMPLES.name)
        .unwrap();
    match &samples.value {
        DebugValue::Histogram(values) => {
            assert_eq!(values.len(), 1);
            assert!(values[0].into_inner() > 1000.0);
        }
        other => panic!("samples should be a histogram, got {:?}", other),
    }
    assert!(recorded
        .iter()
        .any(|r| r.name == metric_defs::COREG_ITERATIONS.name));
    assert!(recorded
        .iter()
        .any(|r| r.name == metric_defs::COREG_RESIDUAL_NMAD.name));
}

#[test]
fn test_failed_fit_counts_error_kind() {
    let surface = reference(SIZE);
    let empty = InlierMask::filled_like(&surface, false);

    let recorded = record(|| {
        assert!(VerticalShift::default()
            .fit(&Reference::Surface(&surface), &surface, Some(&empty), &FitOptions::seeded(0))
            .is_err());
    });

    assert_eq!(counter(&recorded, metric_defs::COREG_FITS.name, "VerticalShift"), 0);
    let failure = recorded
        .iter()
        .find(|r| r.name == metric_defs::COREG_FIT_FAILURES.name)
        .unwrap();
    assert_eq!(failure.label("method"), Some("VerticalShift"));
    assert_eq!(failure.label("error"), Some("insufficient_data"));
}

#[test]
fn test_not_converged_counter() {
    let reference = reference(SIZE);
    let tba = displaced(SIZE, 8.0, 4.0, 2.0);
    let params = NuthKaabParams {
        max_iterations: 1,
        ..NuthKaabParams::default()
    };

    let recorded = record(|| {
        NuthKaab::new(params)
            .fit(&Reference::Surface(&reference), &tba, None, &FitOptions::seeded(3))
            .unwrap();
    });

    assert_eq!(counter(&recorded, metric_defs::COREG_FITS.name, "NuthKaab"), 1);
    assert_eq!(counter(&recorded, metric_defs::COREG_NOT_CONVERGED.name, "NuthKaab"), 1);
}

#[test]
fn test_pipeline_steps_are_labelled() {
    let reference = reference(SIZE);
    let tba = displaced(SIZE, 8.0, 4.0, 2.0);

    let recorded = record(|| {
        CoregPipeline::default()
            .then(NuthKaab::default())
            .then(VerticalShift::default())
            .fit(&Reference::Surface(&reference), &tba, None, &FitOptions::seeded(5))
            .unwrap();
    });

    let fits: Vec<&Recorded> = recorded
        .iter()
        .filter(|r| r.name == metric_defs::COREG_FITS.name)
        .collect();
    let standalone: Vec<&&Recorded> = fits.iter().filter(|r| r.label("step").is_none()).collect();
    assert_eq!(standalone.len(), 1);
    assert_eq!(standalone[0].label("method"), Some("CoregPipeline"));

    let step_of = |method: &str| {
        fits.iter()
            .find(|r| r.label("method") == Some(method))
            .and_then(|r| r.label("step"))
            .map(str::to_string)
    };
    assert_eq!(step_of("NuthKaab").as_deref(), Some("0"));
    assert_eq!(step_of("VerticalShift").as_deref(), Some("1"));
}
