//! ============================================================================
//! Dimensionality Reduction - 768-d embeddings to 2-d layout
//! ============================================================================
//! Exact t-SNE below `UMAP_THRESHOLD` points, a compact UMAP at or above it.
//! Both use cosine distance and a fixed seed, so the same input always
//! yields the same layout.
//! ============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Seed shared by both reducers
pub const RANDOM_SEED: u64 = 42;

/// Point count at which UMAP replaces t-SNE
pub const UMAP_THRESHOLD: usize = 768;

const TSNE_PERPLEXITY: f64 = 30.0;
const TSNE_ITERATIONS: usize = 1000;
const TSNE_EXAGGERATION: f64 = 12.0;
const TSNE_EXAGGERATION_ITERATIONS: usize = 250;
const TSNE_MIN_GAIN: f64 = 0.01;

const UMAP_NEIGHBORS: usize = 15;
const UMAP_MIN_DIST: f64 = 0.1;
const UMAP_EPOCHS: usize = 500;
const UMAP_NEGATIVE_SAMPLES: usize = 5;
// Curve parameters fitted for min_dist 0.1, spread 1.0
const UMAP_A: f64 = 1.576_943_460_311_307_7;
const UMAP_B: f64 = 0.895_060_877_910_973_3;

/// Which reducer runs for a given point count
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReducerKind {
    Tsne { perplexity: f64 },
    Umap { n_neighbors: usize, min_dist: f64 },
}

impl ReducerKind {
    pub fn select(n_points: usize) -> Self {
        if n_points < UMAP_THRESHOLD {
            // Perplexity cannot exceed the number of neighbours
            let ceiling = (n_points.saturating_sub(1) as f64).max(1.0);
            ReducerKind::Tsne {
                perplexity: TSNE_PERPLEXITY.min(ceiling),
            }
        } else {
            ReducerKind::Umap {
                n_neighbors: UMAP_NEIGHBORS,
                min_dist: UMAP_MIN_DIST,
            }
        }
    }

    /// Project `points` to two dimensions, one output row per input row
    pub fn reduce(&self, points: &[Vec<f32>]) -> Vec<[f64; 2]> {
        match points.len() {
            0 => Vec::new(),
            1 => vec![[0.0, 0.0]],
            _ => match *self {
                ReducerKind::Tsne { perplexity } => tsne(points, perplexity),
                ReducerKind::Umap { n_neighbors, .. } => umap(points, n_neighbors),
            },
        }
    }
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerKind::Tsne { .. } => write!(f, "t-SNE"),
            ReducerKind::Umap { .. } => write!(f, "UMAP"),
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).max(0.0)
}

fn distance_matrix(points: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut d = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let dist = cosine_distance(&points[i], &points[j]);
            d[i][j] = dist;
            d[j][i] = dist;
        }
    }
    d
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// ----------------------------------------------------------------------------
// t-SNE
// ----------------------------------------------------------------------------

/// Row-conditional affinities with per-row precision found by bisection
fn conditional_affinities(distances: &[Vec<f64>], perplexity: f64) -> Vec<Vec<f64>> {
    let n = distances.len();
    let target_entropy = perplexity.ln();
    let mut p = vec![vec![0.0; n]; n];

    for i in 0..n {
        let mut beta = 1.0f64;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..100 {
            let mut sum = 0.0;
            let mut weighted = 0.0;
            for j in 0..n {
                if i == j {
                    p[i][j] = 0.0;
                    continue;
                }
                let v = (-distances[i][j] * beta).exp();
                p[i][j] = v;
                sum += v;
                weighted += distances[i][j] * v;
            }
            if sum <= f64::MIN_POSITIVE {
                sum = f64::MIN_POSITIVE;
            }
            let entropy = sum.ln() + beta * weighted / sum;
            for value in p[i].iter_mut() {
                *value /= sum;
            }

            let diff = entropy - target_entropy;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
    }
    p
}

fn tsne(points: &[Vec<f32>], perplexity: f64) -> Vec<[f64; 2]> {
    let n = points.len();
    debug!("Running t-SNE on {} points (perplexity {:.1})", n, perplexity);

    let conditional = conditional_affinities(&distance_matrix(points), perplexity);
    let mut p = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            p[i][j] = ((conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)).max(1e-12);
        }
    }

    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [standard_normal(&mut rng) * 1e-4, standard_normal(&mut rng) * 1e-4])
        .collect();
    let mut update = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];
    let learning_rate = (n as f64 / TSNE_EXAGGERATION / 4.0).max(50.0);

    let mut num = vec![vec![0.0; n]; n];
    let mut grad = vec![[0.0f64; 2]; n];

    for iteration in 0..TSNE_ITERATIONS {
        let early = iteration < TSNE_EXAGGERATION_ITERATIONS;
        let exaggeration = if early { TSNE_EXAGGERATION } else { 1.0 };
        let momentum = if early { 0.5 } else { 0.8 };

        // Student-t kernel in the embedding
        let mut total = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let v = 1.0 / (1.0 + dx * dx + dy * dy);
                num[i][j] = v;
                num[j][i] = v;
                total += 2.0 * v;
            }
        }
        let total = total.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut g = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[i][j] / total).max(1e-12);
                let coeff = 4.0 * (exaggeration * p[i][j] - q) * num[i][j];
                g[0] += coeff * (y[i][0] - y[j][0]);
                g[1] += coeff * (y[i][1] - y[j][1]);
            }
            grad[i] = g;
        }

        for i in 0..n {
            for d in 0..2 {
                let same_sign = (grad[i][d] > 0.0) == (update[i][d] > 0.0);
                gains[i][d] = if same_sign {
                    (gains[i][d] * 0.8).max(TSNE_MIN_GAIN)
                } else {
                    gains[i][d] + 0.2
                };
                update[i][d] = momentum * update[i][d] - learning_rate * gains[i][d] * grad[i][d];
                y[i][d] += update[i][d];
            }
        }

        // Re-centre
        let mean = y
            .iter()
            .fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
        let mean = [mean[0] / n as f64, mean[1] / n as f64];
        for point in y.iter_mut() {
            point[0] -= mean[0];
            point[1] -= mean[1];
        }
    }

    y
}

// ----------------------------------------------------------------------------
// UMAP
// ----------------------------------------------------------------------------

/// Exact k nearest neighbours of every point, nearest first, self excluded
fn nearest_neighbors(points: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f64)>> {
    let distances = distance_matrix(points);
    distances
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others: Vec<(usize, f64)> = row
                .iter()
                .copied()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .collect();
            others.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            others.truncate(k);
            others
        })
        .collect()
}

/// Fuzzy simplicial set as symmetric weighted edges `(i, j, w)` with `i < j`
fn fuzzy_graph(neighbors: &[Vec<(usize, f64)>], k: usize) -> Vec<(usize, usize, f64)> {
    let target = (k as f64).log2();
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, row) in neighbors.iter().enumerate() {
        let rho = row
            .iter()
            .map(|(_, d)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);

        let mut lo = 0.0f64;
        let mut hi = f64::INFINITY;
        let mut sigma = 1.0f64;
        for _ in 0..64 {
            let sum: f64 = row
                .iter()
                .map(|(_, d)| (-(d - rho).max(0.0) / sigma).exp())
                .sum();
            if (sum - target).abs() < 1e-5 {
                break;
            }
            if sum > target {
                hi = sigma;
                sigma = (lo + hi) / 2.0;
            } else {
                lo = sigma;
                sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
            }
        }
        let sigma = sigma.max(1e-3 * mean_distance(row));

        for &(j, d) in row {
            let w = if sigma > 0.0 {
                (-(d - rho).max(0.0) / sigma).exp()
            } else {
                1.0
            };
            directed.insert((i, j), w);
        }
    }

    let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w_ij) in &directed {
        let key = (i.min(j), i.max(j));
        if edges.contains_key(&key) {
            continue;
        }
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        edges.insert(key, w_ij + w_ji - w_ij * w_ji);
    }

    edges.into_iter().map(|((i, j), w)| (i, j, w)).collect()
}

fn mean_distance(row: &[(usize, f64)]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    row.iter().map(|(_, d)| d).sum::<f64>() / row.len() as f64
}

fn clip(value: f64) -> f64 {
    value.clamp(-4.0, 4.0)
}

fn umap(points: &[Vec<f32>], n_neighbors: usize) -> Vec<[f64; 2]> {
    let n = points.len();
    let k = n_neighbors.min(n - 1).max(1);
    debug!("Running UMAP on {} points (k {})", n, k);

    let mut edges = fuzzy_graph(&nearest_neighbors(points, k), k);
    let max_weight = edges.iter().map(|e| e.2).fold(0.0f64, f64::max);
    edges.retain(|e| e.2 >= max_weight / UMAP_EPOCHS as f64);

    let epochs_per_sample: Vec<f64> = edges
        .iter()
        .map(|e| if e.2 > 0.0 { max_weight / e.2 } else { f64::INFINITY })
        .collect();
    let mut next_sample = epochs_per_sample.clone();

    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)])
        .collect();

    for epoch in 0..UMAP_EPOCHS {
        let alpha = 1.0 - epoch as f64 / UMAP_EPOCHS as f64;

        for (e, &(i, j, _)) in edges.iter().enumerate() {
            if next_sample[e] > (epoch + 1) as f64 {
                continue;
            }
            next_sample[e] += epochs_per_sample[e];

            // Attraction along the edge
            let d2 = squared_distance(&y[i], &y[j]);
            if d2 > 0.0 {
                let coeff = -2.0 * UMAP_A * UMAP_B * d2.powf(UMAP_B - 1.0)
                    / (1.0 + UMAP_A * d2.powf(UMAP_B));
                for d in 0..2 {
                    let g = clip(coeff * (y[i][d] - y[j][d]));
                    y[i][d] += g * alpha;
                    y[j][d] -= g * alpha;
                }
            }

            // Repulsion from random vertices
            for _ in 0..UMAP_NEGATIVE_SAMPLES {
                let other = rng.gen_range(0..n);
                if other == i {
                    continue;
                }
                let d2 = squared_distance(&y[i], &y[other]);
                for d in 0..2 {
                    let g = if d2 > 0.0 {
                        let coeff =
                            2.0 * UMAP_B / ((0.001 + d2) * (1.0 + UMAP_A * d2.powf(UMAP_B)));
                        clip(coeff * (y[i][d] - y[other][d]))
                    } else {
                        4.0
                    };
                    y[i][d] += g * alpha;
                }
            }
        }
    }

    y
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight, well separated groups in 8 dimensions
    fn two_clusters(per_cluster: usize) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut points = Vec::new();
        for cluster in 0..2 {
            for _ in 0..per_cluster {
                let mut v = vec![0.0f32; 8];
                v[cluster * 4] = 1.0;
                for x in v.iter_mut() {
                    *x += rng.gen_range(-0.05..0.05);
                }
                points.push(v);
            }
        }
        points
    }

    /// Share of points whose nearest layout neighbour is in the same group
    fn neighbour_purity(layout: &[[f64; 2]], per_cluster: usize) -> f64 {
        let hits = (0..layout.len())
            .filter(|&i| {
                let nearest = (0..layout.len())
                    .filter(|&j| j != i)
                    .min_by(|&a, &b| {
                        squared_distance(&layout[i], &layout[a])
                            .total_cmp(&squared_distance(&layout[i], &layout[b]))
                    })
                    .unwrap();
                nearest / per_cluster == i / per_cluster
            })
            .count();
        hits as f64 / layout.len() as f64
    }

    #[test]
    fn test_select_by_count() {
        assert!(matches!(ReducerKind::select(10), ReducerKind::Tsne { .. }));
        assert!(matches!(ReducerKind::select(767), ReducerKind::Tsne { .. }));
        assert!(matches!(ReducerKind::select(768), ReducerKind::Umap { .. }));
        assert!(matches!(ReducerKind::select(1000), ReducerKind::Umap { .. }));
    }

    #[test]
    fn test_small_inputs_get_small_perplexity() {
        match ReducerKind::select(10) {
            ReducerKind::Tsne { perplexity } => assert_eq!(perplexity, 9.0),
            other => panic!("unexpected reducer {:?}", other),
        }
        match ReducerKind::select(500) {
            ReducerKind::Tsne { perplexity } => assert_eq!(perplexity, 30.0),
            other => panic!("unexpected reducer {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_counts() {
        let kind = ReducerKind::select(1);
        assert!(kind.reduce(&[]).is_empty());
        assert_eq!(kind.reduce(&[vec![1.0, 0.0]]), vec![[0.0, 0.0]]);
    }

    #[test]
    fn test_tsne_separates_clusters() {
        let points = two_clusters(40);
        let layout = ReducerKind::select(points.len()).reduce(&points);
        assert_eq!(layout.len(), points.len());
        assert!(layout.iter().all(|p| p[0].is_finite() && p[1].is_finite()));

        assert!(neighbour_purity(&layout, 40) >= 0.9);
    }

    #[test]
    fn test_tsne_is_deterministic() {
        let points = two_clusters(6);
        let kind = ReducerKind::select(points.len());
        assert_eq!(kind.reduce(&points), kind.reduce(&points));
    }

    #[test]
    fn test_umap_separates_clusters() {
        let points = two_clusters(30);
        let kind = ReducerKind::Umap {
            n_neighbors: UMAP_NEIGHBORS,
            min_dist: UMAP_MIN_DIST,
        };
        let layout = kind.reduce(&points);
        assert_eq!(layout.len(), points.len());
        assert!(layout.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
        assert_eq!(layout, kind.reduce(&points));

        assert!(neighbour_purity(&layout, 30) >= 0.9);
    }

    #[test]
    fn test_fuzzy_union_is_symmetric() {
        let points = two_clusters(5);
        let edges = fuzzy_graph(&nearest_neighbors(&points, 3), 3);
        assert!(!edges.is_empty());
        for (i, j, w) in edges {
            assert!(i < j);
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn test_cosine_distance_of_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert!(cosine_distance(&[1.0, 1.0], &[2.0, 2.0]).abs() < 1e-9);
    }
}
