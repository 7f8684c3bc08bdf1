use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::types::{CleanSample, ForceTriple, Point, RawSample, RawTrial};

/// Ensayo normalizado en el tiempo: todos los canales re-muestreados sobre
/// el mismo eje de `resample_points` instantes equiespaciados.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTrial {
    /// Eje temporal [s], comienza en 0 y termina en la duración del ensayo
    pub time: Vec<f64>,
    pub f_left: Vec<f64>,
    pub f_right: Vec<f64>,
    pub f_vtc: Vec<f64>,
    pub cop_x: Vec<f64>,
    pub cop_y: Vec<f64>,
    /// Nube de CoP sin re-muestrear (muestras retenidas), para la elipse
    pub raw_cop: Vec<Point>,
}

impl NormalizedTrial {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn cop_at(&self, idx: usize) -> Point {
        Point::new(self.cop_x[idx], self.cop_y[idx])
    }

    pub fn forces_at(&self, idx: usize) -> ForceTriple {
        ForceTriple {
            left: self.f_left[idx],
            right: self.f_right[idx],
            vertex: self.f_vtc[idx],
        }
    }

    /// Índice del máximo de la suma de los tres canales (primer máximo si hay empate)
    pub fn peak_index(&self) -> usize {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for idx in 0..self.len() {
            let total = self.f_left[idx] + self.f_right[idx] + self.f_vtc[idx];
            if total > best {
                best = total;
                best_idx = idx;
            }
        }
        best_idx
    }
}

/// Campos exigidos a cada muestra además del CoP y de F_tot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleFilter {
    /// Sólo CoP y F_tot (resumen 2D y características)
    #[default]
    Contact,
    /// También los tres canales de fuerza (superficie de fuerza)
    AllChannels,
}

fn clean_sample(sample: &RawSample, filter: SampleFilter) -> Option<CleanSample> {
    let clean = CleanSample {
        timestamp_ms: sample.timestamp_ms,
        f_left: sample.f_left,
        f_right: sample.f_right,
        f_vtc: sample.f_vtc,
        f_tot: sample.f_tot?,
        cop: sample.cop?,
    };
    match filter {
        SampleFilter::Contact => Some(clean),
        SampleFilter::AllChannels => clean.forces().map(|_| clean),
    }
}

/// Descarta muestras sin CoP o sin F_tot y las que no superan el umbral de
/// contacto. Devuelve `InsufficientData` si quedan menos de `min_samples`
/// (al menos una).
pub fn clean_samples(trial: &RawTrial, config: &AnalysisConfig) -> Result<Vec<CleanSample>> {
    clean_samples_with(trial, config, SampleFilter::Contact)
}

pub fn clean_samples_with(
    trial: &RawTrial,
    config: &AnalysisConfig,
    filter: SampleFilter,
) -> Result<Vec<CleanSample>> {
    let retained: Vec<CleanSample> = trial
        .samples
        .iter()
        .filter_map(|s| clean_sample(s, filter))
        .filter(|s| s.f_tot > config.contact_threshold)
        .collect();

    let required = config.min_samples.max(1);
    if retained.len() < required {
        return Err(AnalysisError::insufficient(required, retained.len()));
    }
    Ok(retained)
}

/// Tiempos en segundos relativos a la primera muestra retenida
pub fn relative_seconds(samples: &[CleanSample]) -> Vec<f64> {
    let t0 = samples.first().map(|s| s.timestamp_ms).unwrap_or(0.0);
    samples
        .iter()
        .map(|s| (s.timestamp_ms - t0) / 1000.0)
        .collect()
}

/// `n` puntos equiespaciados en [start, end], extremos incluidos
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Interpolación lineal a tramos de (xp, fp) en `x`; `xp` no decreciente.
/// Fuera de [xp[0], xp[last]] devuelve 0.
pub fn interp_linear(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (xp.first(), xp.last()) else {
        return 0.0;
    };
    if x < first || x > last {
        return 0.0;
    }
    // primer índice con xp[i] > x
    let hi = xp.partition_point(|&t| t <= x);
    if hi == 0 {
        return fp[0];
    }
    if hi == xp.len() {
        return fp[xp.len() - 1];
    }
    let lo = hi - 1;
    let dt = xp[hi] - xp[lo];
    if dt <= 0.0 {
        return fp[hi];
    }
    let frac = (x - xp[lo]) / dt;
    fp[lo] + frac * (fp[hi] - fp[lo])
}

fn resample(target: &[f64], time: &[f64], values: &[f64]) -> Vec<f64> {
    target
        .iter()
        .map(|&t| interp_linear(t, time, values))
        .collect()
}

/// Limpia y normaliza un ensayo a `resample_points` instantes.
/// Cada canal de fuerza se interpola sobre las muestras en que está presente.
pub fn normalize_trial(trial: &RawTrial, config: &AnalysisConfig) -> Result<NormalizedTrial> {
    normalize_trial_with(trial, config, SampleFilter::Contact)
}

pub fn normalize_trial_with(
    trial: &RawTrial,
    config: &AnalysisConfig,
    filter: SampleFilter,
) -> Result<NormalizedTrial> {
    if config.resample_points < 2 {
        return Err(AnalysisError::ConfigurationError(format!(
            "resample_points debe ser >= 2, es {}",
            config.resample_points
        )));
    }
    let samples = clean_samples_with(trial, config, filter)?;
    let time_s = relative_seconds(&samples);

    let duration = time_s.last().copied().unwrap_or(0.0);
    if !(duration > 0.0) {
        // eje destino no estrictamente creciente: no se puede normalizar
        return Err(AnalysisError::insufficient(config.min_samples.max(2), samples.len()));
    }
    let target = linspace(0.0, duration, config.resample_points);

    let channel = |pick: fn(&CleanSample) -> Option<f64>| -> Vec<f64> {
        let (xp, fp): (Vec<f64>, Vec<f64>) = samples
            .iter()
            .zip(&time_s)
            .filter_map(|(s, &t)| pick(s).map(|v| (t, v)))
            .unzip();
        resample(&target, &xp, &fp)
    };

    let normalized = NormalizedTrial {
        f_left: channel(|s| s.f_left),
        f_right: channel(|s| s.f_right),
        f_vtc: channel(|s| s.f_vtc),
        cop_x: channel(|s| Some(s.cop.x)),
        cop_y: channel(|s| Some(s.cop.y)),
        raw_cop: samples.iter().map(|s| s.cop).collect(),
        time: target,
    };

    Ok(normalized)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::TrialId;

    /// Ensayo sintético: CoP lineal de `from` a `to`, fuerza constante por canal
    pub(crate) fn linear_trial(
        id: TrialId,
        n: usize,
        dt_ms: f64,
        from: Point,
        to: Point,
        forces: ForceTriple,
    ) -> RawTrial {
        let samples = (0..n)
            .map(|i| {
                let frac = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
                RawSample {
                    timestamp_ms: 1_000.0 + i as f64 * dt_ms,
                    f_left: Some(forces.left),
                    f_right: Some(forces.right),
                    f_vtc: Some(forces.vertex),
                    f_tot: Some(forces.total()),
                    is_rested: false,
                    cop_state_changed: false,
                    cop: Some(Point::new(
                        from.x + frac * (to.x - from.x),
                        from.y + frac * (to.y - from.y),
                    )),
                }
            })
            .collect();
        RawTrial::new(id, samples)
    }

    fn unit_forces() -> ForceTriple {
        ForceTriple {
            left: 1.0,
            right: 1.0,
            vertex: 1.0,
        }
    }

    #[test]
    fn resampled_length_and_endpoints() {
        let trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            30,
            20.0,
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            unit_forces(),
        );
        let cfg = AnalysisConfig::default();
        let norm = normalize_trial(&trial, &cfg).unwrap();

        assert_eq!(norm.len(), 101);
        assert_eq!(norm.cop_x.len(), 101);
        assert_eq!(norm.time[0], 0.0);
        assert!((norm.time[100] - 29.0 * 20.0 / 1000.0).abs() < 1e-12);
        assert!(norm.time.windows(2).all(|w| w[1] > w[0]));
        assert!((norm.cop_x[0] - 0.0).abs() < 1e-12);
        assert!((norm.cop_x[100] - 1.0).abs() < 1e-12);
        assert!((norm.cop_y[50] - 0.5).abs() < 1e-9);
        assert_eq!(norm.raw_cop.len(), 30);
    }

    #[test]
    fn too_few_samples_is_insufficient() {
        let trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            19,
            20.0,
            Point::default(),
            Point::new(1.0, 0.0),
            unit_forces(),
        );
        let err = normalize_trial(&trial, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientData {
                required: 20,
                available: 19
            }
        ));
    }

    #[test]
    fn missing_cop_and_low_force_are_dropped() {
        let mut trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            25,
            10.0,
            Point::default(),
            Point::new(1.0, 0.0),
            unit_forces(),
        );
        trial.samples[0].cop = None;
        trial.samples[1].f_tot = Some(1.0); // igual al umbral: no supera
        trial.samples[2].f_vtc = None;

        let cfg = AnalysisConfig::default();
        let clean = clean_samples(&trial, &cfg).unwrap();
        assert_eq!(clean.len(), 23);
        // el origen temporal se re-basa a la primera muestra retenida
        assert_eq!(relative_seconds(&clean)[0], 0.0);
        let strict = clean_samples_with(&trial, &cfg, SampleFilter::AllChannels).unwrap();
        assert_eq!(strict.len(), 22);

        trial.samples[3].cop = None;
        trial.samples[4].cop = None;
        trial.samples[5].cop = None;
        assert!(normalize_trial(&trial, &cfg).is_ok());
        assert!(matches!(
            normalize_trial_with(&trial, &cfg, SampleFilter::AllChannels),
            Err(AnalysisError::InsufficientData { available: 19, .. })
        ));
    }

    #[test]
    fn missing_side_channel_is_interpolated_from_its_own_samples() {
        let mut trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            30,
            20.0,
            Point::default(),
            Point::new(1.0, 0.0),
            unit_forces(),
        );
        for sample in trial.samples.iter_mut().skip(1).step_by(2) {
            sample.f_left = None;
        }
        let cfg = AnalysisConfig::default();
        let norm = normalize_trial(&trial, &cfg).unwrap();
        assert_eq!(norm.raw_cop.len(), 30);
        // la última muestra no tiene F_left: el canal queda a 0 tras su último dato
        assert_eq!(norm.f_left[0], 1.0);
        assert_eq!(norm.f_left[100], 0.0);
        assert!(norm.f_right.iter().all(|&f| (f - 1.0).abs() < 1e-12));
    }

    #[test]
    fn zero_min_samples_still_needs_one_sample() {
        let mut trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            5,
            20.0,
            Point::default(),
            Point::new(1.0, 0.0),
            unit_forces(),
        );
        for sample in &mut trial.samples {
            sample.f_tot = Some(0.5);
        }
        let cfg = AnalysisConfig {
            min_samples: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            clean_samples(&trial, &cfg),
            Err(AnalysisError::InsufficientData { required: 1, available: 0 })
        ));

        let cfg = AnalysisConfig {
            resample_points: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            normalize_trial(&trial, &cfg),
            Err(AnalysisError::ConfigurationError(_))
        ));
    }

    #[test]
    fn zero_duration_cannot_be_normalized() {
        let trial = linear_trial(
            TrialId::new("S1", "sway", 1),
            25,
            0.0,
            Point::default(),
            Point::default(),
            unit_forces(),
        );
        assert!(matches!(
            normalize_trial(&trial, &AnalysisConfig::default()),
            Err(AnalysisError::InsufficientData { available: 25, .. })
        ));
    }

    #[test]
    fn interp_handles_bounds_and_repeated_times() {
        let xp = [0.0, 1.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(interp_linear(-0.5, &xp, &fp), 0.0);
        assert_eq!(interp_linear(2.5, &xp, &fp), 0.0);
        assert_eq!(interp_linear(0.0, &xp, &fp), 0.0);
        assert!((interp_linear(0.5, &xp, &fp) - 5.0).abs() < 1e-12);
        assert!((interp_linear(1.5, &xp, &fp) - 25.0).abs() < 1e-12);
        assert_eq!(interp_linear(2.0, &xp, &fp), 30.0);
    }

    #[test]
    fn linspace_hits_both_ends() {
        let axis = linspace(0.0, 0.58, 101);
        assert_eq!(axis.len(), 101);
        assert_eq!(axis[0], 0.0);
        assert_eq!(axis[100], 0.58);
    }
}
