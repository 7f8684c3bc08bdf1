use tracing::{error, info, warn};

use crate::aggregator::{aggregate_group, AggregateSummary};
use crate::config::AnalysisConfig;
use crate::csv_loader::TrialCatalog;
use crate::error::{AnalysisError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::force_field::{reconstruct_field, ForceField};
use crate::normalizer::{normalize_trial_with, NormalizedTrial, SampleFilter};
use crate::profiles::{build_profiles, Dataset};
use crate::types::RawTrial;

/// Resultado de un grupo (sujeto, tarea): el valor o el motivo del descarte
#[derive(Debug)]
pub struct GroupOutcome<T> {
    pub subject_id: String,
    pub task_name: String,
    pub result: Result<T>,
}

/// Normaliza las repeticiones de un grupo; las que no alcanzan el mínimo se
/// descartan con aviso y no cuentan para el grupo.
pub fn normalize_group(
    trials: &[RawTrial],
    config: &AnalysisConfig,
    filter: SampleFilter,
) -> Vec<NormalizedTrial> {
    trials
        .iter()
        .filter_map(|trial| match normalize_trial_with(trial, config, filter) {
            Ok(normalized) => Some(normalized),
            Err(e) => {
                info!(trial = %trial.id, reason = %e, "repetición descartada");
                None
            }
        })
        .collect()
}

fn for_each_group<T>(
    catalog: &TrialCatalog,
    config: &AnalysisConfig,
    filter: SampleFilter,
    compute: impl Fn(&[NormalizedTrial], &AnalysisConfig) -> Result<T>,
) -> Vec<GroupOutcome<T>> {
    catalog
        .iter_groups()
        .map(|(subject, task, trials)| {
            let normalized = normalize_group(trials, config, filter);
            let result = compute(&normalized, config);
            match &result {
                Err(e) if e.is_recoverable() => warn!(subject, task, reason = %e, "grupo omitido"),
                Err(e) => error!(subject, task, error = %e, "grupo fallido"),
                Ok(_) => {}
            }
            GroupOutcome {
                subject_id: subject.to_string(),
                task_name: task.to_string(),
                result,
            }
        })
        .collect()
}

/// Resumen 2D (trayectoria media + elipse) de todos los grupos
pub fn summarize_groups(catalog: &TrialCatalog, config: &AnalysisConfig) -> Vec<GroupOutcome<AggregateSummary>> {
    for_each_group(catalog, config, SampleFilter::Contact, aggregate_group)
}

/// Superficie de fuerza en el pico de todos los grupos; sólo cuentan las
/// muestras con los tres canales presentes
pub fn reconstruct_fields(catalog: &TrialCatalog, config: &AnalysisConfig) -> Vec<GroupOutcome<ForceField>> {
    for_each_group(catalog, config, SampleFilter::AllChannels, reconstruct_field)
}

/// Extrae características de cada ensayo válido y las promedia por
/// (sujeto, tarea)
pub fn build_dataset(catalog: &TrialCatalog, config: &AnalysisConfig) -> Dataset {
    let extractor = FeatureExtractor::new(config.clone());
    let mut skipped = 0usize;

    let features: Vec<_> = catalog
        .iter_trials()
        .filter_map(|trial| match extractor.extract(trial) {
            Ok(f) => Some((trial.id.clone(), f)),
            Err(e) => {
                skipped += 1;
                info!(trial = %trial.id, reason = %e, "sin características");
                None
            }
        })
        .collect();

    let dataset = build_profiles(features);
    info!(
        profiles = dataset.len(),
        subjects = dataset.subjects().len(),
        skipped,
        "perfiles motores medios"
    );
    dataset
}

/// Cuenta los grupos omitidos por datos insuficientes
pub fn insufficient_groups<T>(outcomes: &[GroupOutcome<T>]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o.result, Err(AnalysisError::InsufficientData { .. })))
        .count()
}
