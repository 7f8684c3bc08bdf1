use serde::{Deserialize, Serialize};

/// Umbral de contacto: se descartan muestras con F_tot <= 1.0 N
pub const CONTACT_THRESHOLD: f64 = 1.0;
/// Mínimo de muestras válidas para aceptar un ensayo
pub const MIN_VALID_SAMPLES: usize = 20;
/// Longitud de la trayectoria normalizada en el tiempo
pub const RESAMPLE_POINTS: usize = 101;
/// Resolución (por eje) de la malla de la superficie de fuerza
pub const GRID_RESOLUTION: usize = 50;
/// Nivel de confianza de la elipse de variabilidad
pub const ELLIPSE_CONFIDENCE: f64 = 0.95;

/// Posición de los tres sensores en el plano del apoyabrazos [cm]
pub const SENSOR_LEFT: Point = Point::new(0.0, 0.0);
pub const SENSOR_RIGHT: Point = Point::new(7.0, 0.0);
pub const SENSOR_VERTEX: Point = Point::new(3.5, 24.5);

/// Punto del plano de medida (x = medio-lateral, y = antero-posterior) en cm
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Media aritmética de un conjunto de puntos (origen si está vacío)
    pub fn centroid(points: &[Point]) -> Point {
        if points.is_empty() {
            return Point::default();
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }
}

/// Lecturas de los tres canales de fuerza [N]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceTriple {
    pub left: f64,
    pub right: f64,
    pub vertex: f64,
}

impl ForceTriple {
    pub fn total(&self) -> f64 {
        self.left + self.right + self.vertex
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.left, self.right, self.vertex]
    }
}

/// Identificador de un ensayo: (sujeto, tarea, repetición)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialId {
    pub subject_id: String,
    pub task_name: String,
    pub repetition: usize,
}

impl TrialId {
    pub fn new(subject_id: impl Into<String>, task_name: impl Into<String>, repetition: usize) -> Self {
        Self {
            subject_id: subject_id.into(),
            task_name: task_name.into(),
            repetition,
        }
    }
}

impl std::fmt::Display for TrialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_rep{}", self.subject_id, self.task_name, self.repetition)
    }
}

/// Una fila cruda del CSV de adquisición.
/// Los valores `nan` del firmware llegan como `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawSample {
    pub timestamp_ms: f64,
    pub f_left: Option<f64>,
    pub f_right: Option<f64>,
    pub f_vtc: Option<f64>,
    pub f_tot: Option<f64>,
    /// Bandera de reposo (no se usa en el análisis)
    pub is_rested: bool,
    /// Cambio de estado del CoP (no se usa en el análisis)
    pub cop_state_changed: bool,
    pub cop: Option<Point>,
}

/// Ensayo completo tal como lo escribe la interfaz de adquisición
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrial {
    pub id: TrialId,
    pub samples: Vec<RawSample>,
}

impl RawTrial {
    pub fn new(id: TrialId, samples: Vec<RawSample>) -> Self {
        Self { id, samples }
    }
}

/// Muestra que superó la limpieza: CoP y F_tot presentes, F_tot sobre el umbral.
/// Los canales individuales pueden faltar salvo con `SampleFilter::AllChannels`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanSample {
    pub timestamp_ms: f64,
    pub f_left: Option<f64>,
    pub f_right: Option<f64>,
    pub f_vtc: Option<f64>,
    pub f_tot: f64,
    pub cop: Point,
}

impl CleanSample {
    /// Los tres canales, si están todos presentes
    pub fn forces(&self) -> Option<ForceTriple> {
        Some(ForceTriple {
            left: self.f_left?,
            right: self.f_right?,
            vertex: self.f_vtc?,
        })
    }
}
