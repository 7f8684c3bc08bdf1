use std::f64::consts::PI;

use nalgebra::{Matrix2, SymmetricEigen, Vector2};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::normalizer::NormalizedTrial;
use crate::types::Point;

/// Elipse de confianza sobre la nube de CoP
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceEllipse {
    pub center: Point,
    /// Orientación del eje mayor respecto a +x [grados]
    pub angle_deg: f64,
    /// Ancho completo (eje mayor) [cm]
    pub width: f64,
    /// Alto completo (eje menor) [cm]
    pub height: f64,
    pub semi_major: f64,
    pub semi_minor: f64,
    /// Área de oscilación [cm²]
    pub area: f64,
    /// Autovalores de la covarianza, ordenados de mayor a menor
    pub eigenvalues: [f64; 2],
    pub confidence: f64,
}

/// Resumen de un grupo (sujeto, tarea)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    /// Nube de CoP de todas las repeticiones, sin re-muestrear
    pub pooled_cop: Vec<Point>,
    /// Trayectoria media sobre el eje normalizado
    pub mean_trajectory: Vec<Point>,
    pub ellipse: ConfidenceEllipse,
    pub repetitions: usize,
}

/// Cuantil de la chi-cuadrado con 2 grados de libertad.
/// Con k = 2 la CDF es 1 - exp(-x/2), así que la inversa es cerrada.
pub fn chi_square_2dof_quantile(confidence: f64) -> f64 {
    -2.0 * (1.0 - confidence).ln()
}

/// Covarianza muestral (denominador n - 1) de una nube de puntos
pub fn sample_covariance(points: &[Point]) -> Matrix2<f64> {
    if points.len() < 2 {
        return Matrix2::zeros();
    }
    let mean = Point::centroid(points);
    let mut cov = Matrix2::zeros();
    for p in points {
        let d = Vector2::new(p.x - mean.x, p.y - mean.y);
        cov += d * d.transpose();
    }
    cov / (points.len() - 1) as f64
}

/// Elipse de confianza bivariada: autodescomposición de la covarianza,
/// autovalores negativos a cero y orden descendente.
pub fn confidence_ellipse(points: &[Point], confidence: f64) -> ConfidenceEllipse {
    let center = Point::centroid(points);
    let cov = sample_covariance(points);
    let eigen = SymmetricEigen::new(cov);

    let mut pairs: Vec<(f64, Vector2<f64>)> = (0..2)
        .map(|i| {
            let value = eigen.eigenvalues[i].max(0.0);
            let vector = eigen.eigenvectors.column(i).into_owned();
            (value, vector)
        })
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (major_value, major_vector) = pairs[0];
    let minor_value = pairs[1].0;
    let angle_deg = major_vector.y.atan2(major_vector.x).to_degrees();

    let chi2 = chi_square_2dof_quantile(confidence);
    let width = 2.0 * (chi2 * major_value).sqrt();
    let height = 2.0 * (chi2 * minor_value).sqrt();
    let semi_major = width / 2.0;
    let semi_minor = height / 2.0;

    ConfidenceEllipse {
        center,
        angle_deg,
        width,
        height,
        semi_major,
        semi_minor,
        area: PI * semi_major * semi_minor,
        eigenvalues: [major_value, minor_value],
        confidence,
    }
}

/// Trayectoria media punto a punto de varias trayectorias re-muestreadas
pub fn mean_trajectory(trials: &[NormalizedTrial]) -> Vec<Point> {
    let len = trials.iter().map(NormalizedTrial::len).min().unwrap_or(0);
    let n = trials.len() as f64;
    (0..len)
        .map(|idx| {
            let (sx, sy) = trials
                .iter()
                .fold((0.0, 0.0), |(sx, sy), t| (sx + t.cop_x[idx], sy + t.cop_y[idx]));
            Point::new(sx / n, sy / n)
        })
        .collect()
}

/// Combina todas las repeticiones válidas de un grupo.
/// Un grupo sin repeticiones válidas devuelve `InsufficientData`.
pub fn aggregate_group(trials: &[NormalizedTrial], config: &AnalysisConfig) -> Result<AggregateSummary> {
    if trials.is_empty() {
        return Err(AnalysisError::insufficient(1, 0));
    }

    let pooled_cop: Vec<Point> = trials
        .iter()
        .flat_map(|t| t.raw_cop.iter().copied())
        .collect();
    let ellipse = confidence_ellipse(&pooled_cop, config.confidence);

    Ok(AggregateSummary {
        mean_trajectory: mean_trajectory(trials),
        ellipse,
        repetitions: trials.len(),
        pooled_cop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize_trial;
    use crate::normalizer::tests::linear_trial;
    use crate::types::{ForceTriple, TrialId};

    fn sway_trials() -> Vec<NormalizedTrial> {
        let cfg = AnalysisConfig::default();
        let forces = ForceTriple {
            left: 2.0,
            right: 2.0,
            vertex: 2.0,
        };
        (1..=2)
            .map(|rep| {
                let mut trial = linear_trial(
                    TrialId::new("S1", "sway", rep),
                    30,
                    33.0,
                    Point::new(0.0, 0.0),
                    Point::new(1.0, 1.0),
                    forces,
                );
                // leve oscilación transversal para que la nube no sea colineal
                for (i, sample) in trial.samples.iter_mut().enumerate() {
                    if let Some(cop) = sample.cop.as_mut() {
                        cop.y += if i % 2 == 0 { 0.01 } else { -0.01 };
                    }
                }
                normalize_trial(&trial, &cfg).unwrap()
            })
            .collect()
    }

    #[test]
    fn chi_square_quantile_at_95() {
        assert!((chi_square_2dof_quantile(0.95) - 5.991464547107979).abs() < 1e-12);
    }

    #[test]
    fn linear_drift_summary() {
        let summary = aggregate_group(&sway_trials(), &AnalysisConfig::default()).unwrap();

        assert_eq!(summary.repetitions, 2);
        assert_eq!(summary.pooled_cop.len(), 60);
        assert_eq!(summary.mean_trajectory.len(), 101);

        let first = summary.mean_trajectory[0];
        let last = summary.mean_trajectory[100];
        assert!(first.distance(&Point::new(0.0, 0.0)) < 0.02);
        assert!(last.distance(&Point::new(1.0, 1.0)) < 0.02);
        for p in &summary.mean_trajectory {
            assert!((p.x - p.y).abs() <= 0.01 + 1e-9);
        }

        let e = summary.ellipse;
        assert!(e.center.distance(&Point::new(0.5, 0.5)) < 1e-9);
        assert!(e.area > 0.0);
        assert!(e.eigenvalues[0] >= e.eigenvalues[1]);
        // la nube se alinea con la diagonal
        let folded = e.angle_deg.rem_euclid(180.0);
        assert!((folded - 45.0).abs() < 1.0);
    }

    #[test]
    fn identical_points_give_zero_area() {
        let cloud = vec![Point::new(3.0, 7.0); 40];
        let e = confidence_ellipse(&cloud, 0.95);
        assert_eq!(e.area, 0.0);
        assert_eq!(e.width, 0.0);
        assert_eq!(e.center, Point::new(3.0, 7.0));
    }

    #[test]
    fn dominant_axis_follows_larger_spread() {
        // mucho más disperso en y que en x
        let cloud: Vec<Point> = (0..50)
            .map(|i| {
                let t = i as f64 / 49.0 - 0.5;
                Point::new(0.1 * (i % 3) as f64, 10.0 * t)
            })
            .collect();
        let e = confidence_ellipse(&cloud, 0.95);
        assert!(e.eigenvalues[0] >= e.eigenvalues[1]);
        assert!(e.width > e.height);
        let folded = e.angle_deg.rem_euclid(180.0);
        assert!((folded - 90.0).abs() < 1.0);
        assert!(e.area >= 0.0);
    }

    #[test]
    fn empty_group_is_insufficient() {
        assert!(matches!(
            aggregate_group(&[], &AnalysisConfig::default()),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }
}
