use std::fmt;

use crossbeam_channel::unbounded;
use serde::Serialize;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::error::{AnalysisError, Result};
use crate::profiles::Dataset;

/// Resultado de la validación cruzada dejando un sujeto fuera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Fracción de perfiles con tarea predicha == tarea real
    pub accuracy: f64,
    /// Tareas distintas, ordenadas (filas y columnas de la matriz)
    pub labels: Vec<String>,
    /// confusion[real][predicha]
    pub confusion: Vec<Vec<usize>>,
    /// Predicción de cada perfil, en el orden del dataset
    pub predictions: Vec<String>,
    /// Número de folds (= sujetos)
    pub folds: usize,
    pub profiles: usize,
}

impl ValidationReport {
    pub fn chance_level(&self) -> f64 {
        if self.labels.is_empty() {
            0.0
        } else {
            1.0 / self.labels.len() as f64
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Average Generalization Accuracy (LOSO CV): {:.2}%",
            self.accuracy * 100.0
        )?;
        writeln!(f)?;
        writeln!(f, "Confusion Matrix (aggregated on each fold):")?;

        let row_names: Vec<String> = self.labels.iter().map(|l| format!("True: {}", l)).collect();
        let col_names: Vec<String> = self
            .labels
            .iter()
            .map(|l| format!("Predicted: {}", l))
            .collect();
        let row_width = row_names.iter().map(String::len).max().unwrap_or(0);

        write!(f, "{:row_width$}", "")?;
        for name in &col_names {
            write!(f, "  {}", name)?;
        }
        writeln!(f)?;
        for (name, row) in row_names.iter().zip(&self.confusion) {
            write!(f, "{:<row_width$}", name)?;
            for (count, col) in row.iter().zip(&col_names) {
                write!(f, "  {:>width$}", count, width = col.len())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Matriz de confusión sobre `labels`; filas = real, columnas = predicha
pub fn confusion_matrix(truth: &[String], predicted: &[String], labels: &[String]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; labels.len()]; labels.len()];
    for (t, p) in truth.iter().zip(predicted) {
        if let (Ok(r), Ok(c)) = (labels.binary_search(t), labels.binary_search(p)) {
            matrix[r][c] += 1;
        }
    }
    matrix
}

pub fn accuracy(truth: &[String], predicted: &[String]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    hits as f64 / truth.len() as f64
}

/// Validación cruzada dejando un sujeto fuera.
///
/// `make_model` crea un modelo nuevo por fold. Los folds se entrenan en hilos
/// independientes y las predicciones se reúnen por índice de perfil antes de
/// puntuar, así que el resultado no depende del orden de ejecución.
pub fn leave_one_subject_out<C, F>(dataset: &Dataset, make_model: F) -> Result<ValidationReport>
where
    C: Classifier,
    F: Fn() -> C + Sync,
{
    let subjects = dataset.subjects();
    if subjects.len() < 2 {
        return Err(AnalysisError::ConfigurationError(format!(
            "la validación LOSO requiere al menos 2 sujetos, hay {}",
            subjects.len()
        )));
    }

    let features = dataset.feature_matrix();
    let truth = dataset.labels();
    let labels = dataset.tasks();

    info!(
        profiles = dataset.len(),
        subjects = subjects.len(),
        "validación cruzada LOSO"
    );

    let (tx, rx) = unbounded::<Result<Vec<(usize, String)>>>();

    std::thread::scope(|scope| {
        for held_out in &subjects {
            let tx = tx.clone();
            let (features, truth, make_model) = (&features, &truth, &make_model);
            scope.spawn(move || {
                let outcome = run_fold(dataset, held_out, features, truth, make_model);
                // el receptor vive hasta el final del scope
                let _ = tx.send(outcome);
            });
        }
    });
    drop(tx);

    let mut pooled: Vec<Option<String>> = vec![None; dataset.len()];
    for fold in rx.iter() {
        for (idx, label) in fold? {
            pooled[idx] = Some(label);
        }
    }

    let predictions: Vec<String> = pooled
        .into_iter()
        .enumerate()
        .map(|(idx, p)| {
            p.ok_or_else(|| {
                AnalysisError::ConfigurationError(format!("perfil {} sin predicción", idx))
            })
        })
        .collect::<Result<_>>()?;

    let report = ValidationReport {
        accuracy: accuracy(&truth, &predictions),
        confusion: confusion_matrix(&truth, &predictions, &labels),
        labels,
        predictions,
        folds: subjects.len(),
        profiles: dataset.len(),
    };
    info!(accuracy = report.accuracy, "validación completada");
    Ok(report)
}

fn run_fold<C: Classifier>(
    dataset: &Dataset,
    held_out: &str,
    features: &[Vec<f64>],
    truth: &[String],
    make_model: &dyn Fn() -> C,
) -> Result<Vec<(usize, String)>> {
    let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| dataset.profiles[i].subject_id == held_out);

    let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| features[i].clone()).collect();
    let train_y: Vec<String> = train_idx.iter().map(|&i| truth[i].clone()).collect();
    let test_x: Vec<Vec<f64>> = test_idx.iter().map(|&i| features[i].clone()).collect();

    let mut model = make_model();
    model.fit(&train_x, &train_y)?;
    let predicted = model.predict(&test_x)?;

    debug!(
        subject = held_out,
        train = train_idx.len(),
        test = test_idx.len(),
        "fold completado"
    );
    Ok(test_idx.into_iter().zip(predicted).collect())
}
