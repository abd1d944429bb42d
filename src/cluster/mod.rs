//! Coarse clustering index used to narrow similarity search to a handful of
//! candidate clusters instead of scanning every live vector.
//!
//! [`ClusterIndex`] owns centroids and membership lists only; it never reads
//! or writes vector records itself. `recompute` and `rebalance` take a
//! lookup closure supplied by the store so this module stays independent of
//! the on-device record format.

pub mod blob;
pub mod kmeans;

use rand::Rng;

use crate::distance::cosine_similarity;
use crate::error::{Error, Result};
use blob::{ClusterBlob, ClusterInfo};

/// Clustering kernel used to build and maintain the coarse index.
///
/// Only k-means is implemented; the enum exists so callers can name the
/// kernel explicitly and so a future kernel has a place to slot in without
/// changing the `Store` API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringStrategy {
    /// Lloyd's-iteration k-means over cosine distance, k-means++ seeded.
    KMeans,
}

impl ClusteringStrategy {
    /// Parses a strategy name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `s` names no known strategy.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kmeans" | "k-means" => Ok(Self::KMeans),
            other => Err(Error::Config(format!("unknown clustering strategy '{other}'"))),
        }
    }
}

impl std::fmt::Display for ClusteringStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KMeans => write!(f, "kmeans"),
        }
    }
}

/// One cluster: its centroid, current membership, and staleness bookkeeping.
#[derive(Debug, Clone)]
struct Cluster {
    centroid: Vec<f32>,
    members: Vec<u64>,
    dirty: bool,
    /// Maximum cosine distance from `centroid` to any member, as of the last
    /// `recompute`/`rebalance`. `f32::MAX` when stale or never computed,
    /// which disables early-stop pruning against this cluster rather than
    /// risking an overestimate.
    radius: f32,
}

/// The coarse clustering index over a store's live vectors.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    dimension: usize,
    clusters: Vec<Cluster>,
}

impl ClusterIndex {
    /// Builds a fresh index of `k` empty clusters, seeded by random unit
    /// vectors, for a brand-new store.
    #[must_use]
    pub fn new_random(k: usize, dimension: usize, rng: &mut impl Rng) -> Self {
        let clusters = (0..k)
            .map(|_| Cluster {
                centroid: kmeans::random_unit_vector(dimension, rng),
                members: Vec::new(),
                dirty: false,
                radius: f32::MAX,
            })
            .collect();
        Self { dimension, clusters }
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// True if there are no clusters at all (never true for an initialized store).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Vector dimension every centroid has.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total number of vectors currently assigned across all clusters.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }

    /// Assigns `id` to the cluster whose centroid is most similar to `vec`,
    /// returning that cluster's index.
    ///
    /// # Panics
    ///
    /// Panics if there are no clusters (an initialized store always has
    /// `k >= 1`).
    pub fn assign(&mut self, id: u64, vec: &[f32]) -> usize {
        let target = self
            .clusters
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                cosine_similarity(vec, &a.centroid)
                    .partial_cmp(&cosine_similarity(vec, &b.centroid))
                    .expect("cosine similarity is never NaN for finite inputs")
            })
            .map(|(i, _)| i)
            .expect("cluster index has at least one cluster");

        let cluster = &mut self.clusters[target];
        cluster.members.push(id);
        cluster.dirty = true;
        cluster.radius = f32::MAX;
        target
    }

    /// Removes `id` from whichever cluster currently holds it, returning
    /// that cluster's index, or `None` if `id` was not assigned anywhere.
    pub fn unassign(&mut self, id: u64) -> Option<usize> {
        for (i, cluster) in self.clusters.iter_mut().enumerate() {
            if let Some(pos) = cluster.members.iter().position(|&m| m == id) {
                cluster.members.swap_remove(pos);
                cluster.dirty = true;
                cluster.radius = f32::MAX;
                return Some(i);
            }
        }
        None
    }

    /// Returns the top `probes` cluster indices by cosine similarity of
    /// their centroid to `query`, along with that similarity and the
    /// cluster's current radius, sorted descending by similarity.
    #[must_use]
    pub fn candidate_clusters(&self, query: &[f32], probes: usize) -> Vec<(usize, f32, f32)> {
        let mut scored: Vec<(usize, f32, f32)> = self
            .clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.centroid), c.radius))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("similarity is never NaN"));
        scored.truncate(probes.max(1));
        scored
    }

    /// Vector IDs currently assigned to cluster `index`.
    #[must_use]
    pub fn members_of(&self, index: usize) -> &[u64] {
        &self.clusters[index].members
    }

    /// Recomputes the centroid of every dirty cluster as the normalized
    /// mean of its members' vectors, looked up via `fetch`. Empty clusters
    /// keep their previous centroid rather than vanishing. Also refreshes
    /// each recomputed cluster's radius (max cosine distance to a member).
    pub fn recompute(&mut self, mut fetch: impl FnMut(u64) -> Option<Vec<f32>>) {
        for cluster in &mut self.clusters {
            if !cluster.dirty {
                continue;
            }

            let vectors: Vec<Vec<f32>> = cluster
                .members
                .iter()
                .filter_map(|&id| fetch(id))
                .collect();

            if vectors.is_empty() {
                cluster.dirty = false;
                continue;
            }

            let dimension = cluster.centroid.len();
            let mut sum = vec![0.0f32; dimension];
            for v in &vectors {
                for (s, x) in sum.iter_mut().zip(v.iter()) {
                    *s += x;
                }
            }
            let mean: Vec<f32> = sum.iter().map(|s| s / vectors.len() as f32).collect();
            if let Some(normalized) = crate::distance::normalize(&mean) {
                cluster.centroid = normalized;
            }

            cluster.radius = vectors
                .iter()
                .map(|v| 1.0 - cosine_similarity(v, &cluster.centroid))
                .fold(0.0f32, f32::max);
            cluster.dirty = false;
        }
    }

    /// Runs k-means from scratch over every `(id, vector)` pair in
    /// `all_vectors`, using the current centroids as the initial seeding,
    /// and reassigns all memberships. Clears every cluster's dirty flag.
    pub fn rebalance(&mut self, all_vectors: &[(u64, Vec<f32>)], max_iterations: usize, tolerance: f32) {
        let initial: Vec<Vec<f32>> = self.clusters.iter().map(|c| c.centroid.clone()).collect();
        let vectors: Vec<Vec<f32>> = all_vectors.iter().map(|(_, v)| v.clone()).collect();

        let result = kmeans::run(&vectors, initial, max_iterations, tolerance);

        for (cluster, (centroid, radius)) in self
            .clusters
            .iter_mut()
            .zip(result.centroids.into_iter().zip(result.radii.into_iter()))
        {
            cluster.centroid = centroid;
            cluster.radius = radius;
            cluster.members.clear();
            cluster.dirty = false;
        }

        for (idx, &cluster_idx) in result.assignments.iter().enumerate() {
            self.clusters[cluster_idx].members.push(all_vectors[idx].0);
        }
    }

    /// Serializes this index's centroids and memberships into a
    /// [`ClusterBlob`] ready to persist.
    #[must_use]
    pub fn to_blob(&self) -> ClusterBlob {
        ClusterBlob {
            dimension: self.dimension,
            clusters: self
                .clusters
                .iter()
                .map(|c| ClusterInfo {
                    centroid: c.centroid.clone(),
                    members: c.members.clone(),
                })
                .collect(),
        }
    }

    /// Rebuilds an index from a previously-serialized [`ClusterBlob`].
    /// Radii are marked stale (`f32::MAX`) since the blob does not carry
    /// them; the next `recompute` or `rebalance` will refresh them.
    #[must_use]
    pub fn from_blob(blob: ClusterBlob) -> Self {
        let clusters = blob
            .clusters
            .into_iter()
            .map(|info| Cluster {
                centroid: info.centroid,
                members: info.members,
                dirty: false,
                radius: f32::MAX,
            })
            .collect();
        Self { dimension: blob.dimension, clusters }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
