use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::types::{
    Point, CONTACT_THRESHOLD, ELLIPSE_CONFIDENCE, GRID_RESOLUTION, MIN_VALID_SAMPLES,
    RESAMPLE_POINTS, SENSOR_LEFT, SENSOR_RIGHT, SENSOR_VERTEX,
};

/// Parámetros del bosque aleatorio usado en la validación cruzada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Número de árboles (default: 100)
    pub n_trees: usize,
    /// Semilla fija para que la validación sea reproducible (default: 42)
    pub seed: u64,
    /// Profundidad máxima; `None` = crecer hasta hojas puras
    pub max_depth: Option<usize>,
    /// Mínimo de muestras para intentar dividir un nodo (default: 2)
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

/// Constantes del análisis. Todos los campos tienen valor por defecto,
/// así que un JSON parcial sólo sobrescribe lo que declara.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Umbral de fuerza total para considerar contacto [N]
    pub contact_threshold: f64,
    /// Mínimo de muestras tras el filtrado
    pub min_samples: usize,
    /// Puntos de la trayectoria normalizada
    pub resample_points: usize,
    /// Puntos por eje de la malla de la superficie
    pub grid_resolution: usize,
    /// Rango [min, max] del eje x de la malla [cm]
    pub grid_x: [f64; 2],
    /// Rango [min, max] del eje y de la malla [cm]
    pub grid_y: [f64; 2],
    /// Nivel de confianza de la elipse
    pub confidence: f64,
    /// Sensores: izquierdo, derecho, vértice
    pub anchors: [Point; 3],
    pub forest: ForestParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            contact_threshold: CONTACT_THRESHOLD,
            min_samples: MIN_VALID_SAMPLES,
            resample_points: RESAMPLE_POINTS,
            grid_resolution: GRID_RESOLUTION,
            grid_x: [-1.0, 8.0],
            grid_y: [-1.0, 26.0],
            confidence: ELLIPSE_CONFIDENCE,
            anchors: [SENSOR_LEFT, SENSOR_RIGHT, SENSOR_VERTEX],
            forest: ForestParams::default(),
        }
    }
}

impl AnalysisConfig {
    /// Carga la configuración desde un JSON y la valida
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(AnalysisError::ConfigurationError(msg));

        if !self.contact_threshold.is_finite() {
            return fail(format!("contact_threshold no finito: {}", self.contact_threshold));
        }
        if self.min_samples < 2 {
            return fail(format!("min_samples debe ser >= 2 (es {})", self.min_samples));
        }
        if self.resample_points < 2 {
            return fail(format!(
                "resample_points debe ser >= 2 (es {})",
                self.resample_points
            ));
        }
        if self.grid_resolution < 2 {
            return fail(format!(
                "grid_resolution debe ser >= 2 (es {})",
                self.grid_resolution
            ));
        }
        if !(self.grid_x[0] < self.grid_x[1]) || !(self.grid_y[0] < self.grid_y[1]) {
            return fail(format!(
                "rango de malla inválido: x={:?} y={:?}",
                self.grid_x, self.grid_y
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return fail(format!("confidence fuera de (0, 1): {}", self.confidence));
        }
        let [a, b, c] = self.anchors;
        let doubled_area = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        if doubled_area.abs() < 1e-12 {
            return fail("los tres sensores son colineales".to_string());
        }
        if self.forest.n_trees == 0 {
            return fail("forest.n_trees debe ser > 0".to_string());
        }
        if self.forest.min_samples_split < 2 {
            return fail("forest.min_samples_split debe ser >= 2".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_protocol_constants() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.contact_threshold, 1.0);
        assert_eq!(cfg.min_samples, 20);
        assert_eq!(cfg.resample_points, 101);
        assert_eq!(cfg.confidence, 0.95);
        assert_eq!(cfg.forest.seed, 42);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "grid_resolution": 30, "forest": {{ "n_trees": 10 }} }}"#).unwrap();

        let cfg = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(cfg.grid_resolution, 30);
        assert_eq!(cfg.forest.n_trees, 10);
        assert_eq!(cfg.forest.seed, 42);
        assert_eq!(cfg.min_samples, 20);
    }

    #[test]
    fn collinear_anchors_are_rejected() {
        let cfg = AnalysisConfig {
            anchors: [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(AnalysisError::ConfigurationError(_))
        ));
    }
}
