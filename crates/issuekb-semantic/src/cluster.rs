//! Unsupervised grouping of issue embeddings.
//!
//! Two strategies, picked by [`ClusterMethod`]:
//! - **Partition**: k-means with Euclidean distance, k-means++ seeding from a
//!   fixed seed and several restarts (lowest inertia wins), so the same input
//!   always produces the same labels.
//! - **Density**: DBSCAN with Euclidean distance. Points that are neither core
//!   points nor reachable from one are labelled [`ClusterLabel::Noise`].
//!
//! Partition runs also report the mean silhouette coefficient when there is
//! more than one cluster.

use issuekb_core::config::{ClusterConfig, ClusterMethod};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::{Result, SemanticError};
use crate::models::{ClusterLabel, EmbeddingMatrix};

/// Seed for k-means++ initialisation
pub const DEFAULT_SEED: u64 = 42;

/// Number of k-means restarts
const DEFAULT_N_INIT: usize = 10;

const MAX_ITERATIONS: usize = 300;

/// Stop once the summed squared centroid shift drops below this
const CONVERGENCE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// k for the partition method
    pub n_clusters: usize,
    /// Neighbourhood radius for the density method
    pub eps: f32,
    /// Neighbours (self included) needed to be a core point
    pub min_samples: usize,
    pub seed: u64,
    pub n_init: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            n_clusters: 10,
            eps: 0.5,
            min_samples: 5,
            seed: DEFAULT_SEED,
            n_init: DEFAULT_N_INIT,
        }
    }
}

impl From<&ClusterConfig> for ClusterParams {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            n_clusters: config.n_clusters,
            eps: config.eps,
            min_samples: config.min_samples,
            ..Self::default()
        }
    }
}

/// Outcome of a clustering run
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub method: ClusterMethod,
    /// One label per input vector, same order
    pub labels: Vec<ClusterLabel>,
    /// Mean silhouette coefficient in [-1, 1], partition runs only
    pub silhouette: Option<f32>,
}

impl ClusterReport {
    /// Issues per label, clusters ascending, noise last
    pub fn sizes(&self) -> BTreeMap<ClusterLabel, usize> {
        let mut sizes = BTreeMap::new();
        for label in &self.labels {
            *sizes.entry(*label).or_insert(0) += 1;
        }
        sizes
    }

    /// Distinct clusters, noise not counted
    pub fn n_clusters(&self) -> usize {
        self.sizes().keys().filter(|label| !label.is_noise()).count()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|label| label.is_noise()).count()
    }

    fn log_distribution(&self) {
        info!(
            "Clustering completed. Found {} clusters ({} noise points)",
            self.n_clusters(),
            self.noise_count()
        );
        for (label, count) in self.sizes() {
            info!("Cluster {}: {} issues", label, count);
        }
    }
}

/// Cluster with a method given by name, e.g. straight from the command line.
///
/// An unknown name fails before any distance is computed.
pub fn cluster_by_name(
    embeddings: &EmbeddingMatrix,
    method: &str,
    params: &ClusterParams,
) -> Result<ClusterReport> {
    let method: ClusterMethod = method
        .parse()
        .map_err(|e: issuekb_core::Error| SemanticError::ConfigError(e.to_string()))?;
    cluster(embeddings, method, params)
}

/// Assign a cluster label to every row of `embeddings`
pub fn cluster(
    embeddings: &EmbeddingMatrix,
    method: ClusterMethod,
    params: &ClusterParams,
) -> Result<ClusterReport> {
    let rows = embeddings.rows();

    if rows.is_empty() {
        return Ok(ClusterReport {
            method,
            labels: Vec::new(),
            silhouette: None,
        });
    }

    let report = match method {
        ClusterMethod::Partition => {
            let result = kmeans(rows, params.n_clusters, params.seed, params.n_init)?;
            info!("KMeans inertia: {:.4}", result.inertia);
            let silhouette = silhouette_score(rows, &result.labels);
            if let Some(score) = silhouette {
                info!("KMeans silhouette score: {:.4}", score);
            }
            ClusterReport {
                method,
                labels: result.labels,
                silhouette,
            }
        }
        ClusterMethod::Density => {
            if params.min_samples == 0 || params.eps.is_nan() || params.eps <= 0.0 {
                return Err(SemanticError::InvalidArgument(format!(
                    "DBSCAN needs eps > 0 and min_samples >= 1, got eps={} min_samples={}",
                    params.eps, params.min_samples
                )));
            }
            ClusterReport {
                method,
                labels: dbscan(rows, params.eps, params.min_samples),
                silhouette: None,
            }
        }
    };

    report.log_distribution();
    Ok(report)
}

/// Result of one k-means fit
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub labels: Vec<ClusterLabel>,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
}

/// Euclidean k-means, best of `n_init` seeded k-means++ restarts.
///
/// Labels are renumbered by first appearance so row 0 is always in cluster 0.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64, n_init: usize) -> Result<KMeansResult> {
    if k == 0 || k > vectors.len() {
        return Err(SemanticError::InvalidArgument(format!(
            "Invalid cluster count {} for {} vectors",
            k,
            vectors.len()
        )));
    }

    let dimension = vectors[0].len();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(SemanticError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<LloydRun> = None;

    for run in 0..n_init.max(1) {
        let centroids = kmeans_plus_plus(vectors, k, &mut rng);
        let fit = lloyd(vectors, centroids);
        debug!(
            "k-means run {}: inertia {:.4} after {} iterations",
            run, fit.inertia, fit.iterations
        );

        if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }

    let best =
        best.ok_or_else(|| SemanticError::InvalidArgument("k-means produced no run".into()))?;

    // renumber by first appearance, dropping clusters that ended up empty
    let mut remap: HashMap<usize, u32> = HashMap::new();
    let labels = best
        .assignments
        .iter()
        .map(|&cluster| {
            let next = remap.len() as u32;
            ClusterLabel::Cluster(*remap.entry(cluster).or_insert(next))
        })
        .collect();

    Ok(KMeansResult {
        labels,
        inertia: best.inertia,
    })
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Pick `k` starting centroids far apart from each other
fn kmeans_plus_plus(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.random_range(0..n));

    let mut nearest: Vec<f64> = vectors
        .iter()
        .map(|v| squared_distance(v, &vectors[chosen[0]]))
        .collect();

    while chosen.len() < k {
        let total: f64 = nearest.iter().sum();

        let next = if total <= f64::EPSILON {
            // every point sits on a centroid already, take any unused row
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        } else {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut picked = n - 1;
            for (i, d) in nearest.iter().enumerate() {
                cumulative += d;
                if cumulative >= target && *d > 0.0 {
                    picked = i;
                    break;
                }
            }
            picked
        };

        chosen.push(next);
        for (i, v) in vectors.iter().enumerate() {
            nearest[i] = nearest[i].min(squared_distance(v, &vectors[next]));
        }
    }

    chosen.into_iter().map(|i| vectors[i].clone()).collect()
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(vector, centroid);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

struct LloydRun {
    assignments: Vec<usize>,
    inertia: f64,
    iterations: usize,
}

/// Lloyd iterations from the given centroids
fn lloyd(vectors: &[Vec<f32>], mut centroids: Vec<Vec<f32>>) -> LloydRun {
    let k = centroids.len();
    let dimension = vectors[0].len();
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let mut changed = false;
        let mut distances = Vec::with_capacity(vectors.len());
        for (i, vector) in vectors.iter().enumerate() {
            let (cluster, d) = nearest_centroid(vector, &centroids);
            if assignments[i] != cluster {
                assignments[i] = cluster;
                changed = true;
            }
            distances.push(d);
        }

        if !changed || iterations >= MAX_ITERATIONS {
            break;
        }

        let mut sums = vec![vec![0.0f64; dimension]; k];
        let mut counts = vec![0usize; k];
        for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
            counts[cluster] += 1;
            for (sum, value) in sums[cluster].iter_mut().zip(vector.iter()) {
                *sum += *value as f64;
            }
        }

        let mut shift = 0.0;
        for cluster in 0..k {
            let updated: Vec<f32> = if counts[cluster] == 0 {
                // empty cluster: move it onto the point worst served right now
                let far = distances
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, d)| {
                        if *d > acc.1 {
                            (i, *d)
                        } else {
                            acc
                        }
                    })
                    .0;
                distances[far] = 0.0;
                vectors[far].clone()
            } else {
                sums[cluster]
                    .iter()
                    .map(|sum| (sum / counts[cluster] as f64) as f32)
                    .collect()
            };
            shift += squared_distance(&centroids[cluster], &updated);
            centroids[cluster] = updated;
        }

        if shift < CONVERGENCE_TOLERANCE {
            // final assignment against the settled centroids
            for (i, vector) in vectors.iter().enumerate() {
                assignments[i] = nearest_centroid(vector, &centroids).0;
            }
            break;
        }
    }

    let inertia = vectors
        .iter()
        .zip(assignments.iter())
        .map(|(v, &c)| squared_distance(v, &centroids[c]))
        .sum();

    LloydRun {
        assignments,
        inertia,
        iterations,
    }
}

/// DBSCAN over Euclidean distance.
///
/// A point is core when at least `min_samples` points (itself included) lie
/// within `eps`. Cluster ids are handed out in the order clusters are found.
pub fn dbscan(vectors: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<ClusterLabel> {
    let n = vectors.len();
    let eps = eps as f64;

    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| euclidean_distance(&vectors[i], &vectors[j]) <= eps)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels: Vec<Option<u32>> = vec![None; n];
    let mut next_id = 0u32;

    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }

        let id = next_id;
        next_id += 1;
        labels[start] = Some(id);

        let mut frontier = vec![start];
        while let Some(point) = frontier.pop() {
            if !is_core[point] {
                continue;
            }
            for &neighbour in &neighbours[point] {
                if labels[neighbour].is_none() {
                    labels[neighbour] = Some(id);
                    frontier.push(neighbour);
                }
            }
        }
    }

    labels
        .into_iter()
        .map(|label| label.map_or(ClusterLabel::Noise, ClusterLabel::Cluster))
        .collect()
}

/// Mean silhouette coefficient, Euclidean distance.
///
/// Defined only for 2..=n-1 distinct labels; `None` otherwise. Noise points
/// are left out. A point alone in its cluster scores 0.
pub fn silhouette_score(vectors: &[Vec<f32>], labels: &[ClusterLabel]) -> Option<f32> {
    let points: Vec<(usize, ClusterLabel)> = labels
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, label)| !label.is_noise())
        .collect();

    let mut members: BTreeMap<ClusterLabel, Vec<usize>> = BTreeMap::new();
    for (i, label) in &points {
        members.entry(*label).or_default().push(*i);
    }

    if members.len() < 2 || members.len() >= points.len() {
        return None;
    }

    let mean_distance = |i: usize, group: &[usize]| -> (f64, usize) {
        let others: Vec<f64> = group
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| euclidean_distance(&vectors[i], &vectors[j]))
            .collect();
        let count = others.len();
        if count == 0 {
            (0.0, 0)
        } else {
            (others.iter().sum::<f64>() / count as f64, count)
        }
    };

    let mut total = 0.0;
    for (i, label) in &points {
        let (a, own_count) = mean_distance(*i, members[label].as_slice());
        if own_count == 0 {
            continue; // singleton cluster scores 0
        }

        let b = members
            .iter()
            .filter(|(other, _)| *other != label)
            .map(|(_, group)| mean_distance(*i, group.as_slice()).0)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Some((total / points.len() as f64) as f32)
}
