use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::feature_extractor::{FeatureVector, NUM_FEATURES};
use crate::types::TrialId;

/// Perfil motor medio de un sujeto en una tarea: media elemento a elemento
/// de los vectores de características de sus repeticiones válidas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectTaskProfile {
    pub subject_id: String,
    pub task_name: String,
    pub features: FeatureVector,
    /// Repeticiones que contribuyeron a la media
    pub trials: usize,
}

/// Colección de perfiles ordenada por (sujeto, tarea)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub profiles: Vec<SubjectTaskProfile>,
}

impl Dataset {
    pub fn new(mut profiles: Vec<SubjectTaskProfile>) -> Self {
        profiles.sort_by(|a, b| {
            (a.subject_id.as_str(), a.task_name.as_str())
                .cmp(&(b.subject_id.as_str(), b.task_name.as_str()))
        });
        Self { profiles }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Sujetos distintos, ordenados
    pub fn subjects(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|p| p.subject_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tareas distintas, ordenadas
    pub fn tasks(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|p| p.task_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Matriz de características (una fila por perfil)
    pub fn feature_matrix(&self) -> Vec<Vec<f64>> {
        self.profiles.iter().map(|p| p.features.to_vec()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.task_name.clone()).collect()
    }
}

/// Agrupa vectores por (sujeto, tarea) y promedia
pub fn build_profiles<I>(trials: I) -> Dataset
where
    I: IntoIterator<Item = (TrialId, FeatureVector)>,
{
    let mut groups: BTreeMap<(String, String), ([f64; NUM_FEATURES], usize)> = BTreeMap::new();

    for (id, features) in trials {
        let entry = groups
            .entry((id.subject_id, id.task_name))
            .or_insert(([0.0; NUM_FEATURES], 0));
        for (acc, value) in entry.0.iter_mut().zip(features.to_array()) {
            *acc += value;
        }
        entry.1 += 1;
    }

    let profiles = groups
        .into_iter()
        .map(|((subject_id, task_name), (sums, count))| {
            let means = sums.map(|s| s / count as f64);
            SubjectTaskProfile {
                subject_id,
                task_name,
                features: FeatureVector::from_array(means),
                trials: count,
            }
        })
        .collect();

    Dataset::new(profiles)
}
