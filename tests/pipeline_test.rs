use std::fs;
use std::io::Write;
use std::path::Path;

use estabilometro::classifier::default_pipeline;
use estabilometro::config::AnalysisConfig;
use estabilometro::csv_loader::discover_trials;
use estabilometro::pipeline::{build_dataset, reconstruct_fields, summarize_groups};
use estabilometro::types::{Point, SENSOR_LEFT, SENSOR_RIGHT, SENSOR_VERTEX};
use estabilometro::validation::leave_one_subject_out;
use estabilometro::AnalysisError;

const HEADER: &str = "Timestamp,F_left,F_right,F_vtc,F_tot,is_rested,copStateChanged,CoP_X,CoP_Y";

/// Escribe un ensayo con CoP lineal de `from` a `to`, 20 ms entre muestras
/// y un pequeño vaivén lateral en y.
fn write_trial(dir: &Path, name: &str, n: usize, from: (f64, f64), to: (f64, f64), force: f64) {
    let mut file = fs::File::create(dir.join(name)).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for i in 0..n {
        let frac = i as f64 / (n - 1) as f64;
        let jitter = if i % 2 == 0 { 0.01 } else { -0.01 };
        let x = from.0 + frac * (to.0 - from.0);
        let y = from.1 + frac * (to.1 - from.1) + jitter;
        writeln!(
            file,
            "{},{},{},{},{},0,0,{},{}",
            1000.0 + i as f64 * 20.0,
            force,
            force,
            force,
            3.0 * force,
            x,
            y
        )
        .unwrap();
    }
}

fn write_cohort(dir: &Path, subjects: usize) {
    for s in 1..=subjects {
        let shift = s as f64 * 0.05;
        for rep in 1..=2 {
            let r = rep as f64 * 0.02;
            write_trial(
                dir,
                &format!("S{}_lean_right_rep{}.csv", s, rep),
                40,
                (3.0, 8.0),
                (6.5 + shift + r, 8.2),
                4.0,
            );
            write_trial(
                dir,
                &format!("S{}_sway_rep{}.csv", s, rep),
                40,
                (3.0, 8.0),
                (3.1 + r, 8.3 + shift),
                4.0,
            );
        }
    }
}

#[test]
fn drift_summary_tracks_the_cop_cloud() {
    let dir = tempfile::tempdir().unwrap();
    write_trial(dir.path(), "S1_sway_rep1.csv", 60, (0.0, 0.0), (1.0, 1.0), 3.0);
    write_trial(dir.path(), "S1_sway_rep2.csv", 60, (0.0, 0.0), (1.0, 1.0), 3.0);

    let catalog = discover_trials(dir.path()).unwrap();
    assert_eq!(catalog.trial_count(), 2);

    let outcomes = summarize_groups(&catalog, &AnalysisConfig::default());
    assert_eq!(outcomes.len(), 1);
    let summary = outcomes[0].result.as_ref().unwrap();

    assert_eq!(summary.repetitions, 2);
    assert_eq!(summary.mean_trajectory.len(), 101);
    let c = summary.ellipse.center;
    assert!((c.x - 0.5).abs() < 0.02 && (c.y - 0.5).abs() < 0.02);
    assert!(summary.ellipse.area > 0.0);
    let angle = summary.ellipse.angle_deg.rem_euclid(180.0);
    assert!((angle - 45.0).abs() < 1.0, "ángulo {}", angle);
}

#[test]
fn uniform_readings_give_flat_surface_inside_the_triangle() {
    let dir = tempfile::tempdir().unwrap();
    write_trial(dir.path(), "S1_hold_rep1.csv", 30, (3.0, 8.0), (3.5, 9.0), 3.0);

    let catalog = discover_trials(dir.path()).unwrap();
    let outcomes = reconstruct_fields(&catalog, &AnalysisConfig::default());
    let field = outcomes[0].result.as_ref().unwrap();

    assert!((field.peak_forces.total() - 9.0).abs() < 1e-9);
    let centroid = Point::centroid(&[SENSOR_LEFT, SENSOR_RIGHT, SENSOR_VERTEX]);
    let (row, col) = field.nearest_node(centroid);
    assert!((field.values[[row, col]] - 3.0).abs() < 1e-6);
    assert!(field.gradient_magnitude(row, col) < 1e-6);

    let (row, col) = field.nearest_node(Point::new(-0.9, 25.0));
    assert_eq!(field.values[[row, col]], 0.0);
}

#[test]
fn malformed_and_short_files_do_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_trial(dir.path(), "S1_sway_rep1.csv", 40, (3.0, 8.0), (3.2, 8.4), 3.0);
    write_trial(dir.path(), "S1_tap_rep1.csv", 10, (3.0, 8.0), (3.2, 8.4), 3.0);
    fs::write(dir.path().join("notas.csv"), "sin formato\n").unwrap();
    fs::write(dir.path().join("S2_sway_rep1.csv"), format!("{}\nabc,1,1,1,3,0,0,1,1\n", HEADER)).unwrap();

    let catalog = discover_trials(dir.path()).unwrap();
    assert_eq!(catalog.trial_count(), 2);
    assert_eq!(catalog.skipped.len(), 2);

    let outcomes = summarize_groups(&catalog, &AnalysisConfig::default());
    let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].task_name, "tap");
    assert!(matches!(
        failed[0].result,
        Err(AnalysisError::InsufficientData { .. })
    ));

    let dataset = build_dataset(&catalog, &AnalysisConfig::default());
    assert_eq!(dataset.len(), 1);
}

#[test]
fn loso_separates_lateral_lean_from_sway() {
    let dir = tempfile::tempdir().unwrap();
    write_cohort(dir.path(), 4);

    let config = AnalysisConfig::default();
    let catalog = discover_trials(dir.path()).unwrap();
    let dataset = build_dataset(&catalog, &config);
    assert_eq!(dataset.len(), 8);

    let report = leave_one_subject_out(&dataset, || default_pipeline(&config.forest)).unwrap();
    assert_eq!(report.folds, 4);
    assert!(report.accuracy > report.chance_level());
    assert!(report.to_string().contains("True: lean_right"));
}

#[test]
fn loso_needs_two_subjects() {
    let dir = tempfile::tempdir().unwrap();
    write_cohort(dir.path(), 1);

    let config = AnalysisConfig::default();
    let catalog = discover_trials(dir.path()).unwrap();
    let dataset = build_dataset(&catalog, &config);
    let result = leave_one_subject_out(&dataset, || default_pipeline(&config.forest));
    assert!(matches!(result, Err(AnalysisError::ConfigurationError(_))));
}
