use ndarray::Array2;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::normalizer::{linspace, NormalizedTrial};
use crate::types::{ForceTriple, Point};

const HULL_TOLERANCE: f64 = 1e-12;

/// Superficie de fuerza reconstruida en el instante de pico de un grupo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForceField {
    /// Eje x de la malla [cm]
    pub grid_x: Vec<f64>,
    /// Eje y de la malla [cm]
    pub grid_y: Vec<f64>,
    /// Fuerza interpolada, filas = y, columnas = x [N], nunca negativa
    pub values: Array2<f64>,
    /// ∂F/∂x en unidades de índice [N por celda]
    pub gradient_x: Array2<f64>,
    /// ∂F/∂y en unidades de índice [N por celda]
    pub gradient_y: Array2<f64>,
    /// Fuerza media de cada canal en el pico
    pub peak_forces: ForceTriple,
    /// CoP medio en el pico
    pub peak_cop: Point,
    pub anchors: [Point; 3],
    pub repetitions: usize,
}

impl ForceField {
    /// Índice (fila, columna) del nodo de malla más cercano a `p`
    pub fn nearest_node(&self, p: Point) -> (usize, usize) {
        let nearest = |axis: &[f64], v: f64| {
            axis.iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - v).abs().total_cmp(&(*b - v).abs()))
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        (nearest(self.grid_y.as_slice(), p.y), nearest(self.grid_x.as_slice(), p.x))
    }

    /// Paso de la malla (dx, dy) [cm]; divide el gradiente por él para N/cm
    pub fn grid_spacing(&self) -> (f64, f64) {
        let step = |axis: &[f64]| match axis {
            [first, .., last] => (last - first) / (axis.len() - 1) as f64,
            _ => 0.0,
        };
        (step(self.grid_x.as_slice()), step(self.grid_y.as_slice()))
    }

    pub fn gradient_magnitude(&self, row: usize, col: usize) -> f64 {
        self.gradient_x[[row, col]].hypot(self.gradient_y[[row, col]])
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Parche de Bézier cúbico sobre el triángulo de sensores.
///
/// Los puntos de control de arista salen de los valores y gradientes en los
/// vértices; el punto central se elige para reproducir polinomios cuadráticos.
#[derive(Debug, Clone)]
pub struct CubicTriangle {
    vertices: [Point; 3],
    /// b[i][j][k] con i + j + k = 3 se guarda en un mapa plano de 10 coeficientes
    control: [f64; 10],
    inv_det: f64,
}

// orden de coeficientes: 300, 030, 003, 210, 201, 120, 021, 102, 012, 111
const B300: usize = 0;
const B030: usize = 1;
const B003: usize = 2;
const B210: usize = 3;
const B201: usize = 4;
const B120: usize = 5;
const B021: usize = 6;
const B102: usize = 7;
const B012: usize = 8;
const B111: usize = 9;

impl CubicTriangle {
    /// Interpolante con gradientes explícitos en cada vértice
    pub fn with_gradients(vertices: [Point; 3], values: [f64; 3], gradients: [[f64; 2]; 3]) -> Self {
        let [p0, p1, p2] = vertices;
        let [f0, f1, f2] = values;
        let dir = |g: [f64; 2], from: Point, to: Point| {
            (g[0] * (to.x - from.x) + g[1] * (to.y - from.y)) / 3.0
        };

        let mut control = [0.0; 10];
        control[B300] = f0;
        control[B030] = f1;
        control[B003] = f2;
        control[B210] = f0 + dir(gradients[0], p0, p1);
        control[B201] = f0 + dir(gradients[0], p0, p2);
        control[B120] = f1 + dir(gradients[1], p1, p0);
        control[B021] = f1 + dir(gradients[1], p1, p2);
        control[B102] = f2 + dir(gradients[2], p2, p0);
        control[B012] = f2 + dir(gradients[2], p2, p1);

        let edge_mean = (control[B210]
            + control[B201]
            + control[B120]
            + control[B021]
            + control[B102]
            + control[B012])
            / 6.0;
        let vertex_mean = (f0 + f1 + f2) / 3.0;
        control[B111] = edge_mean + (edge_mean - vertex_mean) / 2.0;

        let det = (p1.y - p2.y) * (p0.x - p2.x) + (p2.x - p1.x) * (p0.y - p2.y);
        Self {
            vertices,
            control,
            inv_det: 1.0 / det,
        }
    }

    /// Gradientes de vértice por mínima curvatura. Sobre un único triángulo
    /// el mínimo se alcanza con el plano que pasa por los tres valores.
    pub fn new(vertices: [Point; 3], values: [f64; 3]) -> Self {
        let plane = plane_gradient(vertices, values);
        Self::with_gradients(vertices, values, [plane; 3])
    }

    pub fn barycentric(&self, p: Point) -> [f64; 3] {
        let [_, p1, p2] = self.vertices;
        let l0 = ((p1.y - p2.y) * (p.x - p2.x) + (p2.x - p1.x) * (p.y - p2.y)) * self.inv_det;
        let l1 = ((p2.y - self.vertices[0].y) * (p.x - p2.x)
            + (self.vertices[0].x - p2.x) * (p.y - p2.y))
            * self.inv_det;
        [l0, l1, 1.0 - l0 - l1]
    }

    pub fn contains(&self, p: Point) -> bool {
        self.barycentric(p).iter().all(|&l| l >= -HULL_TOLERANCE)
    }

    /// Valor del parche en `p`; `None` fuera del triángulo
    pub fn evaluate(&self, p: Point) -> Option<f64> {
        if !self.contains(p) {
            return None;
        }
        let [u, v, w] = self.barycentric(p);
        let c = &self.control;
        let value = c[B300] * u * u * u
            + c[B030] * v * v * v
            + c[B003] * w * w * w
            + 3.0 * c[B210] * u * u * v
            + 3.0 * c[B201] * u * u * w
            + 3.0 * c[B120] * u * v * v
            + 3.0 * c[B021] * v * v * w
            + 3.0 * c[B102] * u * w * w
            + 3.0 * c[B012] * v * w * w
            + 6.0 * c[B111] * u * v * w;
        Some(value)
    }
}

/// Gradiente [∂f/∂x, ∂f/∂y] del plano que interpola tres puntos
pub fn plane_gradient(vertices: [Point; 3], values: [f64; 3]) -> [f64; 2] {
    let [p0, p1, p2] = vertices;
    let (ax, ay, af) = (p1.x - p0.x, p1.y - p0.y, values[1] - values[0]);
    let (bx, by, bf) = (p2.x - p0.x, p2.y - p0.y, values[2] - values[0]);
    let det = ax * by - ay * bx;
    if det.abs() < f64::EPSILON {
        return [0.0, 0.0];
    }
    [(af * by - ay * bf) / det, (ax * bf - af * bx) / det]
}

/// Gradiente discreto de una malla: diferencias centradas en el interior,
/// laterales en los bordes, divididas por el paso de cada eje (1.0 para
/// unidades de índice).
/// Devuelve (∂/∂y por filas, ∂/∂x por columnas).
pub fn grid_gradient(values: &Array2<f64>, dx: f64, dy: f64) -> (Array2<f64>, Array2<f64>) {
    let (rows, cols) = values.dim();
    let mut grad_y = Array2::zeros((rows, cols));
    let mut grad_x = Array2::zeros((rows, cols));

    let diff = |lo: f64, hi: f64, span: f64| (hi - lo) / span;

    for r in 0..rows {
        for c in 0..cols {
            if rows > 1 {
                grad_y[[r, c]] = if r == 0 {
                    diff(values[[0, c]], values[[1, c]], dy)
                } else if r == rows - 1 {
                    diff(values[[r - 1, c]], values[[r, c]], dy)
                } else {
                    diff(values[[r - 1, c]], values[[r + 1, c]], 2.0 * dy)
                };
            }
            if cols > 1 {
                grad_x[[r, c]] = if c == 0 {
                    diff(values[[r, 0]], values[[r, 1]], dx)
                } else if c == cols - 1 {
                    diff(values[[r, c - 1]], values[[r, c]], dx)
                } else {
                    diff(values[[r, c - 1]], values[[r, c + 1]], 2.0 * dx)
                };
            }
        }
    }

    (grad_y, grad_x)
}

/// Fuerza media por canal y CoP medio en el pico de fuerza total de cada
/// repetición
pub fn peak_instant(trials: &[NormalizedTrial]) -> Result<(ForceTriple, Point)> {
    if trials.is_empty() {
        return Err(AnalysisError::insufficient(1, 0));
    }
    let n = trials.len() as f64;
    let mut forces = ForceTriple::default();
    let mut cop = Point::default();
    for trial in trials {
        let idx = trial.peak_index();
        let f = trial.forces_at(idx);
        let p = trial.cop_at(idx);
        forces.left += f.left;
        forces.right += f.right;
        forces.vertex += f.vertex;
        cop.x += p.x;
        cop.y += p.y;
    }
    forces.left /= n;
    forces.right /= n;
    forces.vertex /= n;
    cop.x /= n;
    cop.y /= n;
    Ok((forces, cop))
}

/// Muestrea el interpolante sobre la malla configurada.
/// Fuera del triángulo de sensores vale 0 y los negativos se recortan a 0.
pub fn sample_field(
    anchors: [Point; 3],
    values: [f64; 3],
    grid_x: &[f64],
    grid_y: &[f64],
) -> Array2<f64> {
    let patch = CubicTriangle::new(anchors, values);
    Array2::from_shape_fn((grid_y.len(), grid_x.len()), |(r, c)| {
        patch
            .evaluate(Point::new(grid_x[c], grid_y[r]))
            .unwrap_or(0.0)
            .max(0.0)
    })
}

/// Reconstruye la superficie de fuerza de un grupo a partir de sus
/// repeticiones normalizadas.
pub fn reconstruct_field(trials: &[NormalizedTrial], config: &AnalysisConfig) -> Result<ForceField> {
    let (peak_forces, peak_cop) = peak_instant(trials)?;

    let res = config.grid_resolution;
    let grid_x = linspace(config.grid_x[0], config.grid_x[1], res);
    let grid_y = linspace(config.grid_y[0], config.grid_y[1], res);

    let values = sample_field(config.anchors, peak_forces.as_array(), &grid_x, &grid_y);
    let (gradient_y, gradient_x) = grid_gradient(&values, 1.0, 1.0);

    Ok(ForceField {
        grid_x,
        grid_y,
        values,
        gradient_x,
        gradient_y,
        peak_forces,
        peak_cop,
        anchors: config.anchors,
        repetitions: trials.len(),
    })
}
