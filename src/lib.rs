//! Análisis de ensayos de equilibrio postural registrados con el apoyabrazos
//! de tres sensores de fuerza (izquierdo, derecho, vértice).
//!
//! Flujo: CSV crudo → normalización → {resumen 2D, superficie de fuerza}
//! y CSV crudo → características → perfiles medios → validación LOSO.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod csv_loader;
pub mod error;
pub mod feature_extractor;
pub mod force_field;
pub mod normalizer;
pub mod pipeline;
pub mod profiles;
pub mod types;
pub mod validation;

pub use error::{AnalysisError, Result};
