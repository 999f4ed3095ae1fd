//! Uovervåket gruppering av samples per testtype (aprender KMeans).
//!
//! Features standardiseres på de samme dataene som grupperes, k søkes i
//! `[2, min(max_clusters, n-1)]` og beste k velges etter silhuett.

use aprender::cluster::KMeans;
use aprender::metrics::silhouette_score;
use aprender::preprocessing::StandardScaler;
use aprender::primitives::Matrix;
use aprender::traits::{Transformer, UnsupervisedEstimator};

use crate::config::AnalysisConfig;
use crate::models::{Sample, TestType};
use crate::stats::group_by_type;
use crate::types::{ClusterReport, ClusteringAnalysis, Insufficient, Outcome};

pub fn feature_names(test_type: TestType) -> Vec<String> {
    match test_type {
        TestType::Force => vec!["force_value".into()],
        TestType::Angle => vec!["angle_value".into()],
        TestType::ForceAndAngle => vec!["force_value".into(), "angle_value".into()],
    }
}

/// Feature-vektor for en sample; None hvis en påkrevd kanal mangler.
fn features(test_type: TestType, s: &Sample) -> Option<Vec<f64>> {
    match test_type {
        TestType::Force => Some(vec![s.force_value?]),
        TestType::Angle => Some(vec![s.angle_value?]),
        TestType::ForceAndAngle => Some(vec![s.force_value?, s.angle_value?]),
    }
}

pub fn cluster_by_type(samples: &[Sample], cfg: &AnalysisConfig) -> Outcome<ClusteringAnalysis> {
    if samples.is_empty() {
        return Outcome::Missing(Insufficient::EmptyInput);
    }

    let analysis = group_by_type(samples)
        .into_iter()
        .map(|(test_type, group)| {
            // behold posisjonen i gruppen, så etikettene kan føres tilbake til riktig sample
            let (positions, points): (Vec<usize>, Vec<Vec<f64>>) = group
                .iter()
                .enumerate()
                .filter_map(|(i, s)| features(test_type, s).map(|f| (i, f)))
                .unzip();

            let outcome = if points.len() < cfg.cluster_min_samples {
                log::debug!(
                    "klynging hoppet over for {test_type}: {} < {} punkter",
                    points.len(),
                    cfg.cluster_min_samples
                );
                Outcome::Missing(Insufficient::InsufficientData {
                    required: cfg.cluster_min_samples,
                    found: points.len(),
                })
            } else {
                match cluster_points(&points, cfg) {
                    Ok(fit) => {
                        let mut labels = vec![None; group.len()];
                        for (pos, label) in positions.iter().zip(fit.labels) {
                            labels[*pos] = Some(label);
                        }
                        Outcome::Ready(ClusterReport {
                            n_clusters: fit.k,
                            validity_score: fit.silhouette,
                            cluster_centers: fit.centers,
                            cluster_labels: labels,
                            features: feature_names(test_type),
                        })
                    }
                    Err(reason) => {
                        log::warn!("klynging feilet for {test_type}: {reason}");
                        Outcome::Missing(Insufficient::Degenerate { reason })
                    }
                }
            };
            (test_type, outcome)
        })
        .collect();

    Outcome::Ready(analysis)
}

/// Beste løsning for et sett punkter; etikettene følger `points` én-til-én.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    pub k: usize,
    pub silhouette: f64,
    /// Sentre i standardisert feature-rom.
    pub centers: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

/// Standardiser, søk k og tilpass på nytt med vinner-k.
pub fn cluster_points(points: &[Vec<f64>], cfg: &AnalysisConfig) -> Result<ClusterFit, String> {
    let x = standardize(&to_matrix(points)?)?;
    let upper = cfg.max_clusters.min(points.len().saturating_sub(1));

    // ingen k med to ikke-tomme klynger → k=2 og silhuett 0
    let mut best_k = upper.clamp(1, 2);
    let mut best_score = 0.0_f32;
    for k in 2..=upper {
        let Some(kmeans) = fit_kmeans(&x, k, cfg) else {
            continue;
        };
        if let Some(score) = silhouette(&x, &kmeans.predict(&x)) {
            if score > best_score {
                best_score = score;
                best_k = k;
            }
        }
    }

    // samme frø → samme løsning som i søket
    let kmeans = fit_kmeans(&x, best_k, cfg).ok_or_else(|| format!("KMeans(k={best_k}) konvergerte ikke"))?;
    let labels = kmeans.predict(&x);
    let centroids = kmeans.centroids();
    let (rows, cols) = centroids.shape();
    let centers = (0..rows)
        .map(|i| (0..cols).map(|j| f64::from(centroids.get(i, j))).collect())
        .collect();

    Ok(ClusterFit {
        k: best_k,
        silhouette: f64::from(best_score),
        centers,
        labels,
    })
}

fn to_matrix(points: &[Vec<f64>]) -> Result<Matrix<f32>, String> {
    let dim = points.first().map_or(0, Vec::len);
    let data: Vec<f32> = points.iter().flatten().map(|&v| v as f32).collect();
    Matrix::from_vec(points.len(), dim, data).map_err(|e| e.to_string())
}

/// StandardScaler (null snitt, enhetsvarians). Features uten varians gir 0 i stedet for NaN.
pub fn standardize(x: &Matrix<f32>) -> Result<Matrix<f32>, String> {
    let mut scaler = StandardScaler::new().with_mean(true).with_std(true);
    scaler.fit(x).map_err(|e| e.to_string())?;
    let scaled = scaler.transform(x).map_err(|e| e.to_string())?;

    let (rows, cols) = scaled.shape();
    let data: Vec<f32> = (0..rows)
        .flat_map(|i| (0..cols).map(move |j| (i, j)))
        .map(|(i, j)| scaled.get(i, j))
        .map(|v| if v.is_finite() { v } else { 0.0 })
        .collect();
    Matrix::from_vec(rows, cols, data).map_err(|e| e.to_string())
}

/// Laveste inertia over `kmeans_n_init` frø avledet fra `kmeans_seed`.
fn fit_kmeans(x: &Matrix<f32>, k: usize, cfg: &AnalysisConfig) -> Option<KMeans> {
    let mut best: Option<KMeans> = None;
    for attempt in 0..cfg.kmeans_n_init.max(1) {
        let mut kmeans = KMeans::new(k)
            .with_max_iter(cfg.kmeans_max_iter)
            .with_random_state(cfg.kmeans_seed.wrapping_add(attempt as u64));
        if kmeans.fit(x).is_err() {
            continue;
        }
        if best.as_ref().map_or(true, |b| kmeans.inertia() < b.inertia()) {
            best = Some(kmeans);
        }
    }
    best
}

/// Silhuett for en tilordning; None når færre enn to klynger er i bruk.
pub fn silhouette(x: &Matrix<f32>, labels: &[usize]) -> Option<f32> {
    let first = *labels.first()?;
    if labels.iter().all(|&l| l == first) {
        return None;
    }
    let score = silhouette_score(x, labels);
    score.is_finite().then_some(score)
}
