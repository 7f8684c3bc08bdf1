use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Datos insuficientes: se requieren {required} muestras válidas, hay {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Error de configuración: {0}")]
    ConfigurationError(String),

    #[error("Entrada mal formada en {source_name}: {reason}")]
    MalformedInput { source_name: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn insufficient(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            required,
            available,
        }
    }

    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Errores que sólo descartan la unidad actual (ensayo, archivo o grupo)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::MalformedInput { .. } | Self::CsvError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
