use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::normalizer::{clean_samples, relative_seconds};
use crate::types::RawTrial;

/// Evita dividir por cero cuando el pico cae en t = 0
const RFD_MIN_TIME_TO_PEAK: f64 = 1e-6;

/// Nombres de las características, en el orden de las columnas del clasificador
pub const FEATURE_NAMES: [&str; 11] = [
    "cop_mean_x_rel",
    "cop_max_x_rel",
    "cop_min_x_rel",
    "cop_mean_y_rel",
    "cop_displacement_x",
    "cop_displacement_y",
    "peak_force",
    "duration_s",
    "cop_path_length",
    "rfd",
    "peak_force_derivative",
];

pub const NUM_FEATURES: usize = FEATURE_NAMES.len();

/// Clase de tarea, decide qué características condicionales se calculan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskClass {
    /// Sit-to-stand (`sts`, `sit_to_stand`, `stand_up`): se calcula la tasa
    /// de desarrollo de fuerza
    StandUp,
    /// Golpe/impulso: se calcula la derivada máxima de la fuerza
    Impulse,
    Other,
}

impl TaskClass {
    pub fn from_label(task_name: &str) -> Self {
        let label = task_name.to_lowercase();
        if label.contains("sts") || label.contains("sit_to_stand") || label.contains("stand_up") {
            TaskClass::StandUp
        } else if label.contains("tap") || label.contains("impulse") {
            TaskClass::Impulse
        } else {
            TaskClass::Other
        }
    }
}

/// Vector de características de un ensayo, relativo a su CoP inicial.
/// El esquema es fijo para todas las tareas; las condicionales valen 0
/// cuando no aplican.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    pub cop_mean_x_rel: f64,
    pub cop_max_x_rel: f64,
    pub cop_min_x_rel: f64,
    pub cop_mean_y_rel: f64,
    pub cop_displacement_x: f64,
    pub cop_displacement_y: f64,
    pub peak_force: f64,
    pub duration_s: f64,
    pub cop_path_length: f64,
    pub rfd: f64,
    pub peak_force_derivative: f64,
}

impl FeatureVector {
    /// Valores en el orden de `FEATURE_NAMES`
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.cop_mean_x_rel,
            self.cop_max_x_rel,
            self.cop_min_x_rel,
            self.cop_mean_y_rel,
            self.cop_displacement_x,
            self.cop_displacement_y,
            self.peak_force,
            self.duration_s,
            self.cop_path_length,
            self.rfd,
            self.peak_force_derivative,
        ]
    }

    pub fn from_array(values: [f64; NUM_FEATURES]) -> Self {
        Self {
            cop_mean_x_rel: values[0],
            cop_max_x_rel: values[1],
            cop_min_x_rel: values[2],
            cop_mean_y_rel: values[3],
            cop_displacement_x: values[4],
            cop_displacement_y: values[5],
            peak_force: values[6],
            duration_s: values[7],
            cop_path_length: values[8],
            rfd: values[9],
            peak_force_derivative: values[10],
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.to_array().to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.to_array())
    }

    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        self.iter().collect()
    }
}

pub struct FeatureExtractor {
    config: AnalysisConfig,
}

impl FeatureExtractor {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Extrae las características de un ensayo crudo.
    /// Aplica el mismo filtrado que la normalización (`InsufficientData` si no alcanza).
    pub fn extract(&self, trial: &RawTrial) -> Result<FeatureVector> {
        let samples = clean_samples(trial, &self.config)?;
        let time_s = relative_seconds(&samples);

        // CoP relativo a la primera muestra retenida
        let start = samples
            .first()
            .map(|s| s.cop)
            .ok_or_else(|| AnalysisError::insufficient(1, 0))?;
        let rel_x: Vec<f64> = samples.iter().map(|s| s.cop.x - start.x).collect();
        let rel_y: Vec<f64> = samples.iter().map(|s| s.cop.y - start.y).collect();
        let f_tot: Vec<f64> = samples.iter().map(|s| s.f_tot).collect();

        let path_length: f64 = rel_x
            .windows(2)
            .zip(rel_y.windows(2))
            .map(|(x, y)| (x[1] - x[0]).hypot(y[1] - y[0]))
            .sum();

        let peak_force = self.max(&f_tot);
        let task = TaskClass::from_label(&trial.id.task_name);

        let rfd = match task {
            TaskClass::StandUp => self.rate_of_force_development(&time_s, &f_tot),
            _ => 0.0,
        };
        let peak_force_derivative = match task {
            TaskClass::Impulse => self.peak_derivative(&time_s, &f_tot),
            _ => 0.0,
        };

        Ok(FeatureVector {
            cop_mean_x_rel: self.mean(&rel_x),
            cop_max_x_rel: self.max(&rel_x),
            cop_min_x_rel: self.min(&rel_x),
            cop_mean_y_rel: self.mean(&rel_y),
            cop_displacement_x: self.range(&rel_x),
            cop_displacement_y: self.range(&rel_y),
            peak_force,
            duration_s: time_s.last().copied().unwrap_or(0.0),
            cop_path_length: path_length,
            rfd,
            peak_force_derivative,
        })
    }

    /// Fuerza pico / tiempo hasta el pico (primer máximo)
    fn rate_of_force_development(&self, time_s: &[f64], force: &[f64]) -> f64 {
        let Some((peak_idx, &peak)) = force
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &f64)>, (i, f)| match best {
                Some((_, b)) if *b >= *f => best,
                _ => Some((i, f)),
            })
        else {
            return 0.0;
        };
        let time_to_peak = time_s[peak_idx];
        let time_to_peak = if time_to_peak > 0.0 {
            time_to_peak
        } else {
            RFD_MIN_TIME_TO_PEAK
        };
        peak / time_to_peak
    }

    /// max |ΔF / Δt| usando sólo intervalos con Δt > 0
    fn peak_derivative(&self, time_s: &[f64], force: &[f64]) -> f64 {
        time_s
            .windows(2)
            .zip(force.windows(2))
            .filter(|(t, _)| t[1] - t[0] > 0.0)
            .map(|(t, f)| ((f[1] - f[0]) / (t[1] - t[0])).abs())
            .fold(0.0, f64::max)
    }

    // ========== Funciones estadísticas ==========

    fn mean(&self, data: &[f64]) -> f64 {
        if data.is_empty() { return 0.0; }
        data.iter().sum::<f64>() / data.len() as f64
    }

    fn max(&self, data: &[f64]) -> f64 {
        data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    fn min(&self, data: &[f64]) -> f64 {
        data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn range(&self, data: &[f64]) -> f64 {
        if data.is_empty() { return 0.0; }
        self.max(data) - self.min(data)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

/// Atajo para extraer características con una configuración dada
pub fn extract_features(trial: &RawTrial, config: &AnalysisConfig) -> Result<FeatureVector> {
    FeatureExtractor::new(config.clone()).extract(trial)
}
