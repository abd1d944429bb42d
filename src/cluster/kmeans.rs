//! K-means kernel: seeding and Lloyd's-iteration clustering over cosine
//! distance.
//!
//! Everything here operates on owned `Vec<f32>` vectors passed in by the
//! caller (the store's live vectors); this module has no notion of slots,
//! IDs persisting to disk, or the cluster blob format — that lives in
//! [`super::blob`] and [`super::ClusterIndex`].

use rand::Rng;
use rand_distr::StandardNormal;

use crate::distance::{cosine_similarity, normalize};

/// Draws a random unit vector of `dimension` components from the surface of
/// the unit hypersphere: each component is an independent standard-normal
/// draw, then the result is L2-normalized. A zero-norm draw is resampled.
#[must_use]
pub fn random_unit_vector(dimension: usize, rng: &mut impl Rng) -> Vec<f32> {
    loop {
        let draw: Vec<f32> = (0..dimension)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        if let Some(unit) = normalize(&draw) {
            return unit;
        }
    }
}

/// Cosine distance, `1 - cosine_similarity`, in `[0.0, 2.0]`.
#[must_use]
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Picks `k` initial centroids from `vectors` using k-means++ weighting
/// adapted to squared cosine distance. If `vectors` has fewer than `k`
/// distinct entries, remaining centroids are filled with random unit
/// vectors so exactly `k` centroids are always returned.
#[must_use]
pub fn seed_kmeans_plus_plus(vectors: &[Vec<f32>], k: usize, dimension: usize, rng: &mut impl Rng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    if vectors.is_empty() {
        for _ in 0..k {
            centroids.push(random_unit_vector(dimension, rng));
        }
        return centroids;
    }

    let first = rng.gen_range(0..vectors.len());
    centroids.push(vectors[first].clone());

    while centroids.len() < k && centroids.len() < vectors.len() {
        let weights: Vec<f32> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| {
                        let d = cosine_distance(v, c);
                        d * d
                    })
                    .fold(f32::MAX, f32::min)
            })
            .collect();

        let total: f32 = weights.iter().sum();
        let next = if total <= 0.0 {
            rng.gen_range(0..vectors.len())
        } else {
            let mut threshold = rng.gen_range(0.0..total);
            let mut chosen = vectors.len() - 1;
            for (i, &w) in weights.iter().enumerate() {
                if threshold < w {
                    chosen = i;
                    break;
                }
                threshold -= w;
            }
            chosen
        };
        centroids.push(vectors[next].clone());
    }

    while centroids.len() < k {
        centroids.push(random_unit_vector(dimension, rng));
    }

    centroids
}

/// Result of a completed k-means run.
#[derive(Debug, Clone)]
pub struct KmeansResult {
    /// Final centroids, one per cluster, un-normalized.
    pub centroids: Vec<Vec<f32>>,
    /// For each input vector (by index into the input slice), its assigned
    /// cluster index.
    pub assignments: Vec<usize>,
    /// Per-cluster maximum cosine distance from centroid to member, computed
    /// on the final assignment. `f32::MAX` for a cluster the run ended with
    /// no members in (cannot happen for non-empty input, since empty
    /// clusters are re-seeded every iteration, but kept total for safety).
    pub radii: Vec<f32>,
}

/// Runs Lloyd's iteration to convergence (or until `max_iterations`),
/// starting from `initial_centroids`.
///
/// Assignment uses cosine distance; centroid update re-normalizes the mean
/// of each cluster's members. A cluster left with no members after an
/// assignment pass is re-seeded from the farthest member of the current
/// largest cluster, so the centroid count never shrinks.
///
/// Returns centroids unchanged (and empty assignments/radii) if `vectors`
/// is empty.
#[must_use]
pub fn run(
    vectors: &[Vec<f32>],
    initial_centroids: Vec<Vec<f32>>,
    max_iterations: usize,
    tolerance: f32,
) -> KmeansResult {
    let k = initial_centroids.len();
    if vectors.is_empty() || k == 0 {
        return KmeansResult {
            centroids: initial_centroids,
            assignments: Vec::new(),
            radii: vec![f32::MAX; k],
        };
    }

    let mut centroids = initial_centroids;
    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..max_iterations {
        for (i, v) in vectors.iter().enumerate() {
            assignments[i] = nearest_centroid(v, &centroids);
        }

        reseed_empty_clusters(vectors, &assignments, &mut centroids);

        let new_centroids = recompute_centroids(vectors, &assignments, &centroids);

        let max_movement = centroids
            .iter()
            .zip(new_centroids.iter())
            .map(|(old, new)| crate::distance::l2_norm(&sub(old, new)))
            .fold(0.0f32, f32::max);

        centroids = new_centroids;

        if max_movement < tolerance {
            break;
        }
    }

    for (i, v) in vectors.iter().enumerate() {
        assignments[i] = nearest_centroid(v, &centroids);
    }
    reseed_empty_clusters(vectors, &assignments, &mut centroids);
    for (i, v) in vectors.iter().enumerate() {
        assignments[i] = nearest_centroid(v, &centroids);
    }

    let radii = compute_radii(vectors, &assignments, &centroids);

    KmeansResult { centroids, assignments, radii }
}

fn sub(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            cosine_similarity(v, a)
                .partial_cmp(&cosine_similarity(v, b))
                .expect("cosine similarity is never NaN for finite inputs")
        })
        .map(|(i, _)| i)
        .expect("centroids is non-empty")
}

fn recompute_centroids(vectors: &[Vec<f32>], assignments: &[usize], previous: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let dimension = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0f32; dimension]; previous.len()];
    let mut counts = vec![0u64; previous.len()];

    for (v, &cluster) in vectors.iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (s, x) in sums[cluster].iter_mut().zip(v.iter()) {
            *s += x;
        }
    }

    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (sum, count))| {
            if count == 0 {
                return previous[i].clone();
            }
            let mean: Vec<f32> = sum.iter().map(|s| s / count as f32).collect();
            normalize(&mean).unwrap_or_else(|| previous[i].clone())
        })
        .collect()
}

/// Re-seeds any cluster with zero members by splitting off the farthest
/// member of the currently-largest cluster.
fn reseed_empty_clusters(vectors: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let k = centroids.len();
    let mut counts = vec![0usize; k];
    for &c in assignments {
        counts[c] += 1;
    }

    for empty in 0..k {
        if counts[empty] != 0 {
            continue;
        }

        let Some((largest, _)) = counts.iter().enumerate().max_by_key(|(_, &c)| c) else {
            continue;
        };
        if counts[largest] < 2 {
            continue;
        }

        let farthest = vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| assignments[*i] == largest)
            .max_by(|(_, a), (_, b)| {
                cosine_distance(a, &centroids[largest])
                    .partial_cmp(&cosine_distance(b, &centroids[largest]))
                    .expect("cosine distance is never NaN for finite inputs")
            })
            .map(|(_, v)| v.clone());

        if let Some(v) = farthest {
            centroids[empty] = v;
            counts[largest] -= 1;
            counts[empty] += 1;
        }
    }
}

fn compute_radii(vectors: &[Vec<f32>], assignments: &[usize], centroids: &[Vec<f32>]) -> Vec<f32> {
    let mut radii = vec![0.0f32; centroids.len()];
    let mut has_member = vec![false; centroids.len()];

    for (v, &c) in vectors.iter().zip(assignments.iter()) {
        has_member[c] = true;
        let d = cosine_distance(v, &centroids[c]);
        if d > radii[c] {
            radii[c] = d;
        }
    }

    for (r, present) in radii.iter_mut().zip(has_member.iter()) {
        if !present {
            *r = f32::MAX;
        }
    }

    radii
}

#[cfg(test)]
#[path = "kmeans_tests.rs"]
mod tests;
