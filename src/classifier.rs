use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::ForestParams;
use crate::error::{AnalysisError, Result};

/// Capacidad mínima que la validación cruzada exige a un modelo
pub trait Classifier: Send {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[String]) -> Result<()>;
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<String>>;
}

fn check_shapes(features: &[Vec<f64>], labels: &[String]) -> Result<usize> {
    if features.is_empty() {
        return Err(AnalysisError::insufficient(1, 0));
    }
    if features.len() != labels.len() {
        return Err(AnalysisError::ConfigurationError(format!(
            "{} filas de características para {} etiquetas",
            features.len(),
            labels.len()
        )));
    }
    let width = features[0].len();
    if features.iter().any(|row| row.len() != width) {
        return Err(AnalysisError::ConfigurationError(
            "filas de características de distinta longitud".to_string(),
        ));
    }
    Ok(width)
}

fn check_width(features: &[Vec<f64>], expected: usize) -> Result<()> {
    match features.iter().find(|row| row.len() != expected) {
        Some(row) => Err(AnalysisError::ConfigurationError(format!(
            "se esperaban {} características, hay {}",
            expected,
            row.len()
        ))),
        None => Ok(()),
    }
}

/// Estandarización por columna: (x - media) / desviación típica poblacional.
/// Una columna constante se deja con escala 1.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(&mut self, features: &[Vec<f64>]) {
        let n = features.len().max(1) as f64;
        let width = features.first().map(Vec::len).unwrap_or(0);
        self.mean = (0..width)
            .map(|c| features.iter().map(|row| row[c]).sum::<f64>() / n)
            .collect();
        self.scale = (0..width)
            .map(|c| {
                let var = features
                    .iter()
                    .map(|row| (row[c] - self.mean[c]).powi(2))
                    .sum::<f64>()
                    / n;
                let std = var.sqrt();
                if std > f64::EPSILON { std } else { 1.0 }
            })
            .collect();
    }

    pub fn transform(&self, features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        features
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, &v)| (v - self.mean[c]) / self.scale[c])
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(&mut self, features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        self.fit(features);
        self.transform(features)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Proporción de cada clase en la hoja
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Árbol CART con impureza de Gini
#[derive(Debug, Clone, Default)]
struct DecisionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    classes: &'a [usize],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let t = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / t).powi(2)).sum::<f64>()
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &r in rows {
            counts[self.classes[r]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize]) -> usize {
        let total = counts.iter().sum::<usize>().max(1) as f64;
        self.nodes.push(Node::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / total).collect(),
        });
        self.nodes.len() - 1
    }

    /// Mejor corte (feature, umbral, ganancia) entre las características candidatas
    fn best_split(&self, rows: &[usize], candidates: &[usize]) -> Option<(usize, f64)> {
        let parent_counts = self.class_counts(rows);
        let parent = gini(&parent_counts, rows.len());
        let mut best: Option<(usize, f64, f64)> = None;

        for &feature in candidates {
            let mut sorted: Vec<usize> = rows.to_vec();
            sorted.sort_by(|&a, &b| self.features[a][feature].total_cmp(&self.features[b][feature]));

            let mut left_counts = vec![0; self.n_classes];
            let mut right_counts = parent_counts.clone();
            for i in 0..sorted.len() - 1 {
                let class = self.classes[sorted[i]];
                left_counts[class] += 1;
                right_counts[class] -= 1;

                let here = self.features[sorted[i]][feature];
                let next = self.features[sorted[i + 1]][feature];
                if next <= here {
                    continue;
                }
                let n_left = i + 1;
                let n_right = sorted.len() - n_left;
                let weighted = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / sorted.len() as f64;
                let gain = parent - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    fn build(&mut self, rows: &[usize], depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(rows);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || rows.len() < self.params.min_samples_split {
            return self.leaf(&counts);
        }

        // sqrt(p) candidatas al azar; si ninguna separa, se prueban las restantes
        let width = self.features[0].len();
        let mut order: Vec<usize> = (0..width).collect();
        order.shuffle(rng);
        let (first, rest) = order.split_at(self.max_features.min(width));
        let split = self
            .best_split(rows, first)
            .or_else(|| self.best_split(rows, rest));

        let Some((feature, threshold)) = split else {
            return self.leaf(&counts);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.features[r][feature] <= threshold);

        let idx = self.nodes.len();
        self.nodes.push(Node::Split {
            feature,
            threshold,
            left: 0,
            right: 0,
        });
        let left = self.build(&left_rows, depth + 1, rng);
        let right = self.build(&right_rows, depth + 1, rng);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[idx]
        {
            *l = left;
            *r = right;
        }
        idx
    }
}

impl DecisionTree {
    fn distribution(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Bosque aleatorio: bootstrap por árbol, sqrt(p) características por corte
/// y voto por promedio de probabilidades. Con la misma semilla y los mismos
/// datos produce exactamente el mismo modelo.
#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    labels: Vec<String>,
    width: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            labels: Vec::new(),
            width: 0,
            trees: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.labels
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Probabilidad media de cada clase (en el orden de `classes()`)
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if self.trees.is_empty() {
            return Err(AnalysisError::ConfigurationError(
                "el bosque no está entrenado".to_string(),
            ));
        }
        check_width(features, self.width)?;

        let n_trees = self.trees.len() as f64;
        Ok(features
            .iter()
            .map(|row| {
                let mut proba = vec![0.0; self.labels.len()];
                for tree in &self.trees {
                    for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                        *p += d;
                    }
                }
                proba.iter_mut().for_each(|p| *p /= n_trees);
                proba
            })
            .collect())
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[String]) -> Result<()> {
        let width = check_shapes(features, labels)?;

        self.labels = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let classes: Vec<usize> = labels
            .iter()
            .map(|l| self.labels.binary_search(l).unwrap_or(0))
            .collect();
        self.width = width;

        let max_features = ((width as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let n = features.len();

        self.trees = (0..self.params.n_trees)
            .map(|_| {
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    features,
                    classes: &classes,
                    n_classes: self.labels.len(),
                    max_features,
                    params: &self.params,
                    nodes: Vec::new(),
                };
                builder.build(&rows, 0, &mut rng);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<String>> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .into_iter()
            .map(|p| {
                // en empate gana la primera clase en orden alfabético
                let best = p
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, &v)| if v > p[best] { i } else { best });
                self.labels[best].clone()
            })
            .collect())
    }
}

/// Estandarización seguida de un clasificador
#[derive(Debug, Clone, Default)]
pub struct ScaledClassifier<C> {
    scaler: StandardScaler,
    inner: C,
}

impl<C: Classifier> ScaledClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self {
            scaler: StandardScaler::default(),
            inner,
        }
    }
}

impl<C: Classifier> Classifier for ScaledClassifier<C> {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[String]) -> Result<()> {
        check_shapes(features, labels)?;
        let scaled = self.scaler.fit_transform(features);
        self.inner.fit(&scaled, labels)
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<String>> {
        check_width(features, self.scaler.mean.len())?;
        self.inner.predict(&self.scaler.transform(features))
    }
}

/// Pipeline por defecto de la validación: estandarización + bosque aleatorio
pub fn default_pipeline(params: &ForestParams) -> ScaledClassifier<RandomForest> {
    ScaledClassifier::new(RandomForest::new(params.clone()))
}
