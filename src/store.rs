//! The public façade: `Store` ties the block device, slot allocator, vector
//! record codec, and cluster index together into the five-verb contract
//! (`store_vector`, `retrieve_vector`, `delete_vector`,
//! `find_similar_vectors`, `perform_maintenance`) plus the persistence pair
//! (`save_index`/`load_index`). No other module in this crate knows about
//! all four of these collaborators at once.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use crate::allocator::{self, SlotAllocator};
use crate::checked_u32;
use crate::cluster::blob::ClusterBlob;
use crate::cluster::{ClusterIndex, ClusteringStrategy};
use crate::config::StoreConfig;
use crate::device::BlockDevice;
use crate::distance::cosine_similarity;
use crate::error::{Error, Result};
use crate::layout;
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::record::{self, VectorRecord};
use crate::superblock::Superblock;

/// A persistent on-device vector store with a coarse k-means clustering
/// index over cosine similarity.
///
/// Not safe for concurrent calls from multiple threads (see the crate's
/// concurrency model); callers needing concurrency must serialize access
/// externally. A single instance holds an advisory exclusive lock on its
/// backing path for its lifetime.
pub struct Store {
    device: BlockDevice,
    config: StoreConfig,
    strategy: ClusteringStrategy,
    dimension: usize,
    slot_width: u64,
    slot_region_offset: u64,
    allocator: SlotAllocator,
    cluster_index: ClusterIndex,
    metrics: StoreMetrics,
    /// Set once a write fails after partially reaching the device; further
    /// mutations are refused until the store is reopened (see `crate::error`'s
    /// `IO` propagation policy).
    inconsistent: bool,
}

/// An entry in the bounded top-k min-heap used by `find_similar_vectors`.
///
/// Orders so that the *least* desirable entry (lowest similarity, and among
/// ties the one with the *largest* id) compares smallest — exactly the
/// entry `find_similar_vectors` wants to evict first, and exactly the tie-
/// break (`similarity` descending, `id` ascending) the public contract
/// promises for the final result.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredId {
    similarity: f32,
    id: u64,
}

impl Eq for ScoredId {}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Store {
    /// Opens the backing store at `path`, creating and formatting it if it
    /// does not already hold a valid superblock.
    ///
    /// If a superblock is present, its dimension and cluster count must
    /// match `dimension`/`cluster_count` exactly. An empty (zero-length)
    /// path is always treated as unformatted; a non-empty path whose
    /// superblock fails to decode is treated as a corrupted existing store,
    /// which is fatal (see [`Error::CorruptHeader`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation,
    /// [`Error::DeviceBusy`] if another instance already holds the backing
    /// path's advisory lock, [`Error::CorruptHeader`] if a non-empty path's
    /// superblock cannot be validated, or [`Error::DimensionMismatch`] if an
    /// existing superblock's `D`/`K` disagree with the arguments.
    pub fn initialize<P: AsRef<Path>>(
        path: P,
        strategy: ClusteringStrategy,
        dimension: usize,
        cluster_count: usize,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate().map_err(|e| Error::Config(e.to_string()))?;

        let mut device = BlockDevice::open(path)?;

        if device.capacity() == 0 {
            return Self::create_fresh(device, strategy, dimension, cluster_count, config);
        }

        let sb_bytes = device.read_at(0, layout::SUPERBLOCK_SIZE as usize)?;
        let sb = Superblock::decode(&sb_bytes)?;

        if sb.dimension as usize != dimension || sb.cluster_count as usize != cluster_count {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: sb.dimension as usize,
            });
        }

        Self::reopen(device, sb, strategy, config)
    }

    fn create_fresh(
        mut device: BlockDevice,
        strategy: ClusteringStrategy,
        dimension: usize,
        cluster_count: usize,
        config: StoreConfig,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config("dimension must be at least 1".to_string()));
        }
        if cluster_count == 0 {
            return Err(Error::Config("cluster_count must be at least 1".to_string()));
        }

        let slot_width = layout::slot_width(dimension, config.max_metadata_len);
        device.ensure_size(layout::SUPERBLOCK_SIZE + slot_width)?;

        let mut rng = rand::thread_rng();
        let cluster_index = ClusterIndex::new_random(cluster_count, dimension, &mut rng);

        let mut store = Self {
            device,
            config,
            strategy,
            dimension,
            slot_width,
            slot_region_offset: layout::SUPERBLOCK_SIZE,
            allocator: SlotAllocator::new(),
            cluster_index,
            metrics: StoreMetrics::new(),
            inconsistent: false,
        };
        store.persist_regions()?;
        Ok(store)
    }

    fn reopen(
        mut device: BlockDevice,
        sb: Superblock,
        strategy: ClusteringStrategy,
        config: StoreConfig,
    ) -> Result<Self> {
        let dimension = sb.dimension as usize;
        let cluster_count = sb.cluster_count as usize;
        let slot_width = sb.slot_width;
        let slot_count = if slot_width == 0 { 0 } else { sb.slot_region_length / slot_width };

        let footer_len = sb.cluster_region_offset.saturating_sub(sb.alloc_footer_offset) as usize;
        let allocator = device
            .read_at(sb.alloc_footer_offset, footer_len)
            .ok()
            .and_then(|bytes| SlotAllocator::decode_footer(&bytes).ok());

        let allocator = match allocator {
            Some(a) => a,
            None => {
                tracing::warn!(
                    path = "allocator footer",
                    "allocator footer unreadable or corrupt, rebuilding by full slot scan"
                );
                allocator::rebuild_by_scan(&mut device, sb.slot_region_offset, slot_width, slot_count, dimension)?
            }
        };

        let cluster_bytes = device.read_at(sb.cluster_region_offset, sb.cluster_region_length as usize).ok();
        let decoded_blob = cluster_bytes.as_deref().and_then(|b| ClusterBlob::decode(b).ok());
        let needs_rebalance = decoded_blob.is_none();

        let mut rng = rand::thread_rng();
        let cluster_index = decoded_blob
            .map(ClusterIndex::from_blob)
            .unwrap_or_else(|| ClusterIndex::new_random(cluster_count, dimension, &mut rng));

        let mut store = Self {
            device,
            config,
            strategy,
            dimension,
            slot_width,
            slot_region_offset: sb.slot_region_offset,
            allocator,
            cluster_index,
            metrics: StoreMetrics::new(),
            inconsistent: false,
        };

        if needs_rebalance {
            tracing::warn!("cluster index blob unreadable or corrupt, rebalancing from live vectors");
            store.rebalance_now();
        }

        store.persist_regions()?;
        Ok(store)
    }

    /// The clustering kernel this store was opened with.
    #[must_use]
    pub const fn strategy(&self) -> ClusteringStrategy {
        self.strategy
    }

    /// The configured vector dimension.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of clusters in the coarse index.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.cluster_index.len()
    }

    /// Number of currently-live vectors.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.allocator.live_count()
    }

    /// A point-in-time snapshot of this store's operational counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stores a new vector under `id` with opaque `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `vector.len() != dimension()`,
    /// [`Error::InvalidVector`] if any component is non-finite,
    /// [`Error::MetadataTooLarge`] if `metadata` exceeds the configured or
    /// physical limit, [`Error::DuplicateId`] if `id` is already live, or an
    /// I/O error. On any of these errors the store's allocator, free list,
    /// and cluster memberships are left exactly as they were before the
    /// call.
    pub fn store_vector(&mut self, id: u64, vector: &[f32], metadata: &[u8]) -> Result<()> {
        self.check_consistent()?;

        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        record::validate_finite(vector)?;
        if metadata.len() > self.config.max_metadata_len {
            return Err(Error::MetadataTooLarge {
                actual: metadata.len(),
                max: self.config.max_metadata_len,
            });
        }

        // Validate the record fits its slot before mutating any allocator
        // state, so a too-large metadata blob never advances the
        // high-water mark or touches the free list.
        let bytes = record::encode(id, vector, metadata, self.slot_width)?;

        let will_reuse = self.allocator.free_slot_count() > 0;
        let slot = self.allocator.allocate(id)?;

        let offset = self.slot_region_offset + slot * self.slot_width;
        if let Err(e) = self.device.write_at(offset, &bytes) {
            let _ = self.allocator.free(id);
            return Err(e);
        }

        if will_reuse {
            self.metrics.record_slot_reused();
        } else {
            self.metrics.record_slot_appended();
        }

        self.cluster_index.assign(id, vector);
        self.persist_regions()?;
        Ok(())
    }

    /// Retrieves the vector stored under `id`.
    ///
    /// Returns `Ok(None)` if `id` has no live record — this is not an
    /// error. Returns `Err(Error::CorruptRecord)` if `id` is mapped to a
    /// slot whose contents fail validation; the slot is logged and counted
    /// but otherwise left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] as described above, or an I/O error.
    pub fn retrieve_vector(&mut self, id: u64) -> Result<Option<Vec<f32>>> {
        let Some(slot) = self.allocator.slot_for(id) else {
            return Ok(None);
        };

        match self.read_record_at_slot(slot) {
            Ok(rec) => Ok(Some(rec.vector)),
            Err(e) => Err(self.note_corrupt(slot, id, e)),
        }
    }

    /// Retrieves the opaque metadata stored under `id`.
    ///
    /// Returns `Ok(None)` if `id` has no live record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] if the slot fails validation, or an
    /// I/O error.
    pub fn get_vector_metadata(&mut self, id: u64) -> Result<Option<Vec<u8>>> {
        let Some(slot) = self.allocator.slot_for(id) else {
            return Ok(None);
        };

        match self.read_record_at_slot(slot) {
            Ok(rec) => Ok(Some(rec.metadata)),
            Err(e) => Err(self.note_corrupt(slot, id, e)),
        }
    }

    /// Deletes the vector stored under `id`, marking its slot tombstoned.
    /// The slot's bytes are otherwise left in place for diagnostic
    /// recovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `id` has no live record, or an I/O
    /// error.
    pub fn delete_vector(&mut self, id: u64) -> Result<()> {
        self.check_consistent()?;

        let slot = self.allocator.free(id)?;
        let status_offset = self.slot_region_offset + slot * self.slot_width + record::STATUS_OFFSET;
        if let Err(e) = self.device.write_at(status_offset, &[layout::SLOT_STATUS_TOMBSTONE]) {
            self.inconsistent = true;
            return Err(e);
        }

        self.cluster_index.unassign(id);
        self.persist_regions()?;
        Ok(())
    }

    /// Finds the `k` live vectors most similar to `query` by cosine
    /// similarity, ranked descending (ties broken by ascending id).
    ///
    /// Returns `Ok(vec![])` if the store holds no live vectors or `k == 0`.
    /// Corrupt records encountered among a probed cluster's members are
    /// logged, counted, and skipped rather than aborting the search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `query.len() != dimension()`,
    /// [`Error::InvalidVector`] if `query` has a non-finite component, or an
    /// I/O error unrelated to a single corrupt record.
    pub fn find_similar_vectors(&mut self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        record::validate_finite(query)?;

        if k == 0 || self.allocator.live_count() == 0 {
            return Ok(Vec::new());
        }

        let probes = ((self.cluster_index.len() as f32) * self.config.probe_fraction)
            .ceil()
            .max(1.0) as usize;
        let candidates = self.cluster_index.candidate_clusters(query, probes);

        let mut heap: BinaryHeap<Reverse<ScoredId>> = BinaryHeap::new();

        for (i, &(cluster_idx, _centroid_sim, _radius)) in candidates.iter().enumerate() {
            let member_ids: Vec<u64> = self.cluster_index.members_of(cluster_idx).to_vec();

            for id in member_ids {
                let Some(slot) = self.allocator.slot_for(id) else {
                    continue;
                };

                let rec = match self.read_record_at_slot(slot) {
                    Ok(rec) => rec,
                    Err(Error::CorruptRecord { slot, reason }) => {
                        self.metrics.record_corrupt_record_skipped();
                        tracing::warn!(slot, id, reason = %reason, "skipping corrupt record during similarity search");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let similarity = cosine_similarity(query, &rec.vector);
                heap.push(Reverse(ScoredId { similarity, id }));
                if heap.len() > k {
                    heap.pop();
                }
            }

            if heap.len() == k {
                if let Some(&(_, next_sim, next_radius)) = candidates.get(i + 1) {
                    let heap_min = heap.peek().expect("heap is non-empty once full").0.similarity;
                    if next_sim < heap_min - next_radius {
                        break;
                    }
                }
            }
        }

        Ok(heap.into_sorted_vec().into_iter().map(|Reverse(s)| (s.id, s.similarity)).collect())
    }

    /// Recomputes every dirty cluster's centroid and rewrites the cluster
    /// blob. Idempotent: calling this twice with no intervening writes
    /// produces the same cluster blob bytes the second time.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the region rewrite fails.
    pub fn perform_maintenance(&mut self) -> Result<()> {
        self.check_consistent()?;
        self.recompute_dirty_clusters();
        self.metrics.record_maintenance_pass();
        self.persist_regions()?;
        Ok(())
    }

    /// Writes the cluster blob to an external file, and also updates the
    /// in-store cluster-index region.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either write fails.
    pub fn save_index<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.check_consistent()?;
        let blob = self.cluster_index.to_blob().encode();
        std::fs::write(path, blob)?;
        self.persist_regions()?;
        Ok(())
    }

    /// Reads a cluster blob from an external file and replaces this
    /// store's in-memory cluster index with it, then persists it to the
    /// in-store cluster-index region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if the file's contents fail to
    /// decode, [`Error::DimensionMismatch`] if its dimension disagrees with
    /// this store's, or an I/O error.
    pub fn load_index<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.check_consistent()?;
        let bytes = std::fs::read(path)?;
        let blob = ClusterBlob::decode(&bytes)?;
        if blob.dimension != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: blob.dimension,
            });
        }
        self.cluster_index = ClusterIndex::from_blob(blob);
        self.persist_regions()?;
        Ok(())
    }

    fn check_consistent(&self) -> Result<()> {
        if self.inconsistent {
            return Err(Error::Io(std::io::Error::other(
                "store is marked inconsistent after a partial write; reopen to continue",
            )));
        }
        Ok(())
    }

    fn read_record_at_slot(&mut self, slot: u64) -> Result<VectorRecord> {
        let offset = self.slot_region_offset + slot * self.slot_width;
        let buf = self.device.read_at(offset, self.slot_width as usize)?;
        record::decode(&buf, self.dimension, slot)
    }

    /// Logs and counts a corrupt-record error before returning it, so every
    /// call site that surfaces `CorruptRecord` does so consistently.
    fn note_corrupt(&self, slot: u64, id: u64, err: Error) -> Error {
        if let Error::CorruptRecord { reason, .. } = &err {
            self.metrics.record_corrupt_record_skipped();
            tracing::warn!(slot, id, reason = %reason, "corrupt record");
        }
        err
    }

    fn collect_live_vectors(&mut self) -> Vec<(u64, Vec<f32>)> {
        let ids: Vec<u64> = self.allocator.live_ids().collect();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(slot) = self.allocator.slot_for(id) {
                match self.read_record_at_slot(slot) {
                    Ok(rec) => out.push((id, rec.vector)),
                    Err(_) => self.metrics.record_corrupt_record_skipped(),
                }
            }
        }
        out
    }

    fn rebalance_now(&mut self) {
        let vectors = self.collect_live_vectors();
        self.cluster_index.rebalance(&vectors, self.config.kmeans_max_iterations, self.config.kmeans_tolerance);
        self.metrics.record_rebalance();
    }

    fn recompute_dirty_clusters(&mut self) {
        let dimension = self.dimension;
        let slot_region_offset = self.slot_region_offset;
        let slot_width = self.slot_width;
        let device = &mut self.device;
        let allocator = &self.allocator;
        let metrics = &self.metrics;

        self.cluster_index.recompute(|id| {
            let slot = allocator.slot_for(id)?;
            let offset = slot_region_offset + slot * slot_width;
            let buf = device.read_at(offset, slot_width as usize).ok()?;
            match record::decode(&buf, dimension, slot) {
                Ok(rec) => Some(rec.vector),
                Err(_) => {
                    metrics.record_corrupt_record_skipped();
                    None
                }
            }
        });
    }

    /// Rewrites the allocator footer, the cluster blob, and the superblock
    /// (with offsets/lengths recomputed to match their current sizes), then
    /// flushes the device. Marks the store inconsistent on failure, per the
    /// `IO` propagation policy in `crate::error`.
    fn persist_regions(&mut self) -> Result<()> {
        let result = self.try_persist_regions();
        if result.is_err() {
            self.inconsistent = true;
        }
        result
    }

    fn try_persist_regions(&mut self) -> Result<()> {
        let footer = self.allocator.encode_footer();
        let footer_offset = self.slot_region_offset + self.allocator.high_water_mark() * self.slot_width;
        let blob = self.cluster_index.to_blob().encode();
        let cluster_offset = footer_offset + footer.len() as u64;

        self.device.write_at(footer_offset, &footer)?;
        self.device.write_at(cluster_offset, &blob)?;

        let sb = Superblock {
            dimension: checked_u32!(self.dimension as u64, "dimension"),
            cluster_count: checked_u32!(self.cluster_index.len() as u64, "cluster_count"),
            slot_width: self.slot_width,
            slot_region_offset: self.slot_region_offset,
            slot_region_length: self.allocator.high_water_mark() * self.slot_width,
            alloc_footer_offset: footer_offset,
            cluster_region_offset: cluster_offset,
            cluster_region_length: checked_u32!(blob.len() as u64, "cluster region length") as u64,
            live_vector_count: self.allocator.live_count() as u64,
        };
        self.device.write_at(0, &sb.encode())?;
        self.device.flush()?;
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.persist_regions();
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
