use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::types::{Point, RawSample, RawTrial, TrialId};

/// Fila del CSV escrito por la interfaz de adquisición:
/// Timestamp,F_left,F_right,F_vtc,F_tot,is_rested,copStateChanged,CoP_X,CoP_Y
/// Los archivos antiguos usan F_sx / F_dx para los canales laterales.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Timestamp", deserialize_with = "required_number")]
    timestamp: f64,
    #[serde(rename = "F_left", alias = "F_sx", deserialize_with = "optional_number")]
    f_left: Option<f64>,
    #[serde(rename = "F_right", alias = "F_dx", deserialize_with = "optional_number")]
    f_right: Option<f64>,
    #[serde(rename = "F_vtc", deserialize_with = "optional_number")]
    f_vtc: Option<f64>,
    #[serde(rename = "F_tot", deserialize_with = "optional_number")]
    f_tot: Option<f64>,
    #[serde(rename = "is_rested", deserialize_with = "flag", default)]
    is_rested: bool,
    #[serde(rename = "copStateChanged", deserialize_with = "flag", default)]
    cop_state_changed: bool,
    #[serde(rename = "CoP_X", deserialize_with = "optional_number")]
    cop_x: Option<f64>,
    #[serde(rename = "CoP_Y", deserialize_with = "optional_number")]
    cop_y: Option<f64>,
}

impl From<CsvRow> for RawSample {
    fn from(row: CsvRow) -> Self {
        let cop = match (row.cop_x, row.cop_y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        };
        RawSample {
            timestamp_ms: row.timestamp,
            f_left: row.f_left,
            f_right: row.f_right,
            f_vtc: row.f_vtc,
            f_tot: row.f_tot,
            is_rested: row.is_rested,
            cop_state_changed: row.cop_state_changed,
            cop,
        }
    }
}

/// Interpreta un número; `nan` (o vacío) se considera dato ausente
fn parse_optional_number(raw: &str) -> std::result::Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| format!("valor numérico inválido: {:?}", raw))?;
    Ok(value.is_finite().then_some(value))
}

fn optional_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_optional_number(&raw).map_err(serde::de::Error::custom)
}

fn required_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_optional_number(&raw)
        .map_err(serde::de::Error::custom)?
        .ok_or_else(|| serde::de::Error::custom("Timestamp ausente"))
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "1.0" => Ok(true),
        "" | "0" | "false" | "0.0" | "nan" => Ok(false),
        other => Err(serde::de::Error::custom(format!("bandera inválida: {:?}", other))),
    }
}

/// Descompone `<sujeto>_<tarea...>_<repetición>` en un TrialId.
/// La tarea puede contener guiones bajos (`lean_right`); la repetición
/// admite el prefijo `rep` (`rep3`).
pub fn parse_trial_filename(path: impl AsRef<Path>) -> Result<TrialId> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AnalysisError::malformed(&name, "nombre de archivo no decodificable"))?;

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(AnalysisError::malformed(
            &name,
            "se esperaba <sujeto>_<tarea>_<repetición>",
        ));
    }

    let subject_id = parts[0];
    let task_name = parts[1..parts.len() - 1].join("_");
    let rep_token = parts[parts.len() - 1];
    let digits = rep_token
        .strip_prefix("rep")
        .or_else(|| rep_token.strip_prefix("Rep"))
        .unwrap_or(rep_token);
    let repetition: usize = digits.parse().map_err(|_| {
        AnalysisError::malformed(&name, format!("repetición inválida: {:?}", rep_token))
    })?;

    Ok(TrialId::new(subject_id, task_name, repetition))
}

/// Carga las muestras de un CSV de ensayo (columnas por nombre, en cualquier orden)
pub fn load_samples_from_csv(path: impl AsRef<Path>) -> Result<Vec<RawSample>> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut samples = Vec::new();
    for (row_idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|e| {
            AnalysisError::malformed(&name, format!("fila {} inválida: {}", row_idx + 1, e))
        })?;
        samples.push(RawSample::from(row));
    }

    if samples.is_empty() {
        return Err(AnalysisError::malformed(&name, "el CSV no contiene datos"));
    }

    Ok(samples)
}

/// Carga un ensayo completo: identificador desde el nombre y muestras desde el contenido
pub fn load_trial_from_csv(path: impl AsRef<Path>) -> Result<RawTrial> {
    let path = path.as_ref();
    let id = parse_trial_filename(path)?;
    let samples = load_samples_from_csv(path)?;
    debug!(trial = %id, samples = samples.len(), "ensayo cargado");
    Ok(RawTrial::new(id, samples))
}

/// Ensayos agrupados: sujeto → tarea → repeticiones ordenadas
pub type TrialGroups = BTreeMap<String, BTreeMap<String, Vec<RawTrial>>>;

/// Resultado del recorrido de un directorio de datos
#[derive(Debug, Default)]
pub struct TrialCatalog {
    pub groups: TrialGroups,
    /// Archivos ignorados y el motivo
    pub skipped: Vec<(PathBuf, String)>,
}

impl TrialCatalog {
    pub fn trial_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|tasks| tasks.values())
            .map(Vec::len)
            .sum()
    }

    /// Itera los grupos (sujeto, tarea, ensayos) en orden estable
    pub fn iter_groups(&self) -> impl Iterator<Item = (&str, &str, &[RawTrial])> {
        self.groups.iter().flat_map(|(subject, tasks)| {
            tasks
                .iter()
                .map(move |(task, trials)| (subject.as_str(), task.as_str(), trials.as_slice()))
        })
    }

    pub fn iter_trials(&self) -> impl Iterator<Item = &RawTrial> {
        self.groups
            .values()
            .flat_map(|tasks| tasks.values())
            .flat_map(|trials| trials.iter())
    }
}

/// Recorre un directorio y agrupa todos los `*.csv` por sujeto y tarea.
/// Un archivo mal formado se registra en `skipped` y no interrumpe el lote.
pub fn discover_trials(dir: impl AsRef<Path>) -> Result<TrialCatalog> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let mut catalog = TrialCatalog::default();
    for path in paths {
        match load_trial_from_csv(&path) {
            Ok(trial) => {
                catalog
                    .groups
                    .entry(trial.id.subject_id.clone())
                    .or_default()
                    .entry(trial.id.task_name.clone())
                    .or_default()
                    .push(trial);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "archivo ignorado");
                catalog.skipped.push((path, e.to_string()));
            }
        }
    }

    for trials in catalog.groups.values_mut().flat_map(|t| t.values_mut()) {
        trials.sort_by_key(|t| t.id.repetition);
    }

    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn filename_with_multi_token_task() {
        let id = parse_trial_filename("data/S07_lean_right_rep3.csv").unwrap();
        assert_eq!(id.subject_id, "S07");
        assert_eq!(id.task_name, "lean_right");
        assert_eq!(id.repetition, 3);

        let plain = parse_trial_filename("S1_sway_1.csv").unwrap();
        assert_eq!(plain.task_name, "sway");
        assert_eq!(plain.repetition, 1);
    }

    #[test]
    fn filename_without_repetition_is_malformed() {
        assert!(matches!(
            parse_trial_filename("S1_sway.csv"),
            Err(AnalysisError::MalformedInput { .. })
        ));
        assert!(matches!(
            parse_trial_filename("S1_sway_repX.csv"),
            Err(AnalysisError::MalformedInput { .. })
        ));
    }

    #[test]
    fn nan_sentinel_and_legacy_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "S1_tap_rep1.csv",
            "Timestamp,F_sx,F_dx,F_vtc,F_tot,is_rested,copStateChanged,CoP_X,CoP_Y\n\
             0,1.0,2.0,3.0,6.0,0,0,nan,nan\n\
             10,1.5,2.5,3.5,7.5,1,1,3.2,8.1\n",
        );

        let trial = load_trial_from_csv(&path).unwrap();
        assert_eq!(trial.samples.len(), 2);
        assert_eq!(trial.samples[0].cop, None);
        assert_eq!(trial.samples[1].cop, Some(Point::new(3.2, 8.1)));
        assert_eq!(trial.samples[1].f_left, Some(1.5));
        assert!(trial.samples[1].is_rested);
    }

    #[test]
    fn columns_are_matched_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "S2_sway_rep1.csv",
            "CoP_Y,CoP_X,Timestamp,F_tot,F_vtc,F_right,F_left,copStateChanged,is_rested\n\
             5.0,4.0,100,9.0,3.0,3.0,3.0,False,True\n",
        );

        let samples = load_samples_from_csv(&path).unwrap();
        assert_eq!(samples[0].timestamp_ms, 100.0);
        assert_eq!(samples[0].cop, Some(Point::new(4.0, 5.0)));
        assert_eq!(samples[0].f_tot, Some(9.0));
    }

    #[test]
    fn discovery_skips_bad_files_and_groups_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let header = "Timestamp,F_left,F_right,F_vtc,F_tot,is_rested,copStateChanged,CoP_X,CoP_Y\n";
        let row = "0,1,1,1,3,0,0,1,1\n";
        write_file(dir.path(), "S1_sway_rep2.csv", &format!("{header}{row}"));
        write_file(dir.path(), "S1_sway_rep1.csv", &format!("{header}{row}"));
        write_file(dir.path(), "S2_lean_left_rep1.csv", &format!("{header}{row}"));
        write_file(dir.path(), "roto.csv", &format!("{header}{row}"));
        write_file(dir.path(), "S3_sway_rep1.csv", &format!("{header}0,1,1\n"));
        write_file(dir.path(), "notas.txt", "ignorar");

        let catalog = discover_trials(dir.path()).unwrap();
        assert_eq!(catalog.trial_count(), 3);
        assert_eq!(catalog.skipped.len(), 2);

        let sway = &catalog.groups["S1"]["sway"];
        assert_eq!(sway[0].id.repetition, 1);
        assert_eq!(sway[1].id.repetition, 2);
        assert!(catalog.groups["S2"].contains_key("lean_left"));
    }
}
