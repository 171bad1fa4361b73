use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
};

use log::{debug, warn};

use crate::{
    components::driver::BlockIo,
    errors::{RastroError, Result},
};

pub type BandId = u64;

/// Identity of one cached block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub band: BandId,
    pub col: usize,
    pub row: usize,
}

/// Write-back state of a resident block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Clean,
    Dirty,
    Flushing,
    /// A write-back failed; the buffer is retained so a later flush can
    /// retry.
    FlushFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Byte budget for resident blocks. Zero degrades to an effective
    /// write-through mode: blocks survive only while pinned.
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[derive(Debug)]
struct SlotInner {
    phase: Phase,
    /// Present once `phase` is `Ready`.
    data: Option<Box<[u8]>>,
    state: BlockState,
}

#[derive(Debug)]
struct Slot {
    key: BlockKey,
    nbytes: usize,
    io: Arc<dyn BlockIo>,
    /// Mutated only under the cache's shared lock; eviction and close
    /// honor it.
    pins: AtomicUsize,
    inner: Mutex<SlotInner>,
    /// Signals the end of materialization to racing requests.
    ready: Condvar,
}

impl Slot {
    fn lock_inner(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().expect("block lock")
    }

    fn write_back(&self, inner: &mut SlotInner) -> Result<()> {
        inner.state = BlockState::Flushing;
        let data = inner.data.as_ref().expect("flushing unmaterialized block");
        match self.io.write_block(self.key.col, self.key.row, data) {
            Ok(()) => {
                inner.state = BlockState::Clean;
                Ok(())
            }
            Err(err) => {
                inner.state = BlockState::FlushFailed;
                warn!("write-back of {:?} failed: {err}", self.key);
                Err(err)
            }
        }
    }
}

#[derive(Debug)]
struct Entry {
    slot: Arc<Slot>,
    last_use: u64,
    inserted: u64,
}

#[derive(Debug, Default)]
struct Shared {
    entries: HashMap<BlockKey, Entry>,
    total_bytes: usize,
    seq: u64,
}

/// Shared, memory-bounded store of raster blocks.
///
/// Bookkeeping (membership, recency, byte total, eviction choice) sits
/// behind one coarse lock that is never held across backend I/O; block
/// buffers sit behind per-slot locks so distinct blocks load and flush
/// concurrently. Racing requests for the same absent key perform
/// exactly one backend read.
#[derive(Debug)]
pub struct BlockCache {
    config: CacheConfig,
    shared: Mutex<Shared>,
    unpinned: Condvar,
    next_band: AtomicU64,
}

/// Pinned access to one resident block. The pin is released when the
/// handle drops; eviction skips pinned blocks.
#[derive(Debug)]
pub struct BlockHandle<'a> {
    cache: &'a BlockCache,
    slot: Arc<Slot>,
}

impl BlockHandle<'_> {
    pub fn key(&self) -> BlockKey {
        self.slot.key
    }

    pub fn state(&self) -> BlockState {
        self.slot.lock_inner().state
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.slot.lock_inner();
        f(inner.data.as_deref().expect("unmaterialized block"))
    }

    /// Mutates the buffer and marks the block dirty.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut inner = self.slot.lock_inner();
        inner.state = BlockState::Dirty;
        f(inner.data.as_deref_mut().expect("unmaterialized block"))
    }
}

impl Drop for BlockHandle<'_> {
    fn drop(&mut self) {
        self.cache.unpin(&self.slot);
    }
}

impl BlockCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            shared: Mutex::default(),
            unpinned: Condvar::new(),
            next_band: AtomicU64::new(0),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Unique band identity for cache keys; handed out to each band of
    /// each opened dataset.
    pub fn alloc_band_id(&self) -> BandId {
        self.next_band.fetch_add(1, Ordering::Relaxed)
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock_shared().total_bytes
    }

    pub fn resident_blocks(&self) -> usize {
        self.lock_shared().entries.len()
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.lock_shared().entries.contains_key(key)
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("cache lock")
    }

    /// Returns the block, materializing it through `io` on a miss and
    /// evicting least recently used blocks if the budget is exceeded.
    pub fn get(&self, key: BlockKey, nbytes: usize, io: &Arc<dyn BlockIo>) -> Result<BlockHandle> {
        use std::collections::hash_map::Entry as MapEntry;
        let (slot, created) = {
            let mut guard = self.lock_shared();
            let shared = &mut *guard;
            shared.seq += 1;
            let seq = shared.seq;
            match shared.entries.entry(key) {
                MapEntry::Occupied(mut occupied) => {
                    let entry = occupied.get_mut();
                    entry.last_use = seq;
                    entry.slot.pins.fetch_add(1, Ordering::Relaxed);
                    (Arc::clone(&entry.slot), false)
                }
                MapEntry::Vacant(vacant) => {
                    let slot = Arc::new(Slot {
                        key,
                        nbytes,
                        io: Arc::clone(io),
                        pins: AtomicUsize::new(1),
                        inner: Mutex::new(SlotInner {
                            phase: Phase::Loading,
                            data: None,
                            state: BlockState::Clean,
                        }),
                        ready: Condvar::new(),
                    });
                    vacant.insert(Entry {
                        slot: Arc::clone(&slot),
                        last_use: seq,
                        inserted: seq,
                    });
                    shared.total_bytes += nbytes;
                    (slot, true)
                }
            }
        };

        // Materialize outside the coarse lock. The backend read runs
        // under the per-block lock; racing requests for the same key
        // wait on the slot condvar, requests for other keys proceed.
        if created {
            let mut inner = slot.lock_inner();
            match Self::load(&slot) {
                Ok(data) => {
                    inner.data = Some(data);
                    inner.phase = Phase::Ready;
                    slot.ready.notify_all();
                }
                Err(err) => {
                    inner.phase = Phase::Failed;
                    slot.ready.notify_all();
                    drop(inner);
                    self.forget(&slot);
                    self.unpin(&slot);
                    return Err(err);
                }
            }
        } else {
            let mut inner = slot.lock_inner();
            while inner.phase == Phase::Loading {
                inner = slot.ready.wait(inner).expect("block lock");
            }
            if inner.phase == Phase::Failed {
                drop(inner);
                self.unpin(&slot);
                return Err(RastroError::BlockIo {
                    col: key.col,
                    row: key.row,
                    reason: "materialization failed in a concurrent request".to_string(),
                });
            }
        }

        if created {
            if let Err(err) = self.evict_over_budget() {
                self.unpin(&slot);
                return Err(err);
            }
        }
        Ok(BlockHandle { cache: self, slot })
    }

    fn load(slot: &Slot) -> Result<Box<[u8]>> {
        let data = slot.io.read_block(slot.key.col, slot.key.row)?;
        if data.len() != slot.nbytes {
            return Err(RastroError::BlockIo {
                col: slot.key.col,
                row: slot.key.row,
                reason: format!(
                    "backend returned {} bytes, expected {}",
                    data.len(),
                    slot.nbytes
                ),
            });
        }
        Ok(data.into_boxed_slice())
    }

    /// Evicts least recently used unpinned blocks until the byte total
    /// is back under budget; a dirty victim is written back first and
    /// retained if the write fails. With everything pinned the budget
    /// may be exceeded transiently; eviction never waits on a pin.
    fn evict_over_budget(&self) -> Result<()> {
        loop {
            let victim = {
                let shared = self.lock_shared();
                if shared.total_bytes <= self.config.max_bytes {
                    return Ok(());
                }
                let entry = shared
                    .entries
                    .values()
                    .filter(|entry| entry.slot.pins.load(Ordering::Relaxed) == 0)
                    .min_by_key(|entry| (entry.last_use, entry.inserted));
                match entry {
                    Some(entry) => Arc::clone(&entry.slot),
                    None => return Ok(()),
                }
            };

            {
                let mut inner = victim.lock_inner();
                if matches!(inner.state, BlockState::Dirty | BlockState::FlushFailed) {
                    victim.write_back(&mut inner)?;
                }
            }

            // Re-check the pin under the coarse lock; a concurrent get
            // may have claimed the victim while it was being flushed.
            let mut shared = self.lock_shared();
            let evictable = victim.pins.load(Ordering::Relaxed) == 0
                && shared
                    .entries
                    .get(&victim.key)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.slot, &victim));
            if evictable {
                shared.entries.remove(&victim.key);
                shared.total_bytes -= victim.nbytes;
                debug!("evicted {:?} ({} bytes)", victim.key, victim.nbytes);
            }
        }
    }

    /// Writes back every dirty block of the band, best effort, and
    /// aggregates failures. Blocks stay resident; a clean pass performs
    /// no backend I/O.
    pub fn flush_band(&self, band: BandId) -> Result<()> {
        let slots = self.band_slots(band);
        let failures = Self::write_back_all(&slots);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }

    /// Removes every block of the band, blocking until outstanding pins
    /// release, flushing dirty blocks on the way out. Called at dataset
    /// close.
    pub fn retire_band(&self, band: BandId) -> Result<()> {
        let slots = {
            let mut shared = self.lock_shared();
            loop {
                let pinned = shared.entries.values().any(|entry| {
                    entry.slot.key.band == band && entry.slot.pins.load(Ordering::Relaxed) > 0
                });
                if !pinned {
                    break;
                }
                shared = self.unpinned.wait(shared).expect("cache lock");
            }
            let keys: Vec<BlockKey> = shared
                .entries
                .keys()
                .filter(|key| key.band == band)
                .copied()
                .collect();
            let mut slots = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(entry) = shared.entries.remove(&key) {
                    shared.total_bytes -= entry.slot.nbytes;
                    slots.push(entry.slot);
                }
            }
            slots
        };
        let failures = Self::write_back_all(&slots);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RastroError::FlushFailed { failures })
        }
    }

    fn band_slots(&self, band: BandId) -> Vec<Arc<Slot>> {
        let shared = self.lock_shared();
        shared
            .entries
            .values()
            .filter(|entry| entry.slot.key.band == band)
            .map(|entry| Arc::clone(&entry.slot))
            .collect()
    }

    fn write_back_all(slots: &[Arc<Slot>]) -> Vec<(BlockKey, String)> {
        let mut failures = Vec::new();
        for slot in slots {
            let mut inner = slot.lock_inner();
            if matches!(inner.state, BlockState::Dirty | BlockState::FlushFailed) {
                if let Err(err) = slot.write_back(&mut inner) {
                    failures.push((slot.key, err.to_string()));
                }
            }
        }
        failures
    }

    /// Drops the placeholder of an unsuccessful materialization.
    fn forget(&self, slot: &Arc<Slot>) {
        let mut shared = self.lock_shared();
        let ours = shared
            .entries
            .get(&slot.key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot));
        if ours {
            shared.entries.remove(&slot.key);
            shared.total_bytes -= slot.nbytes;
        }
    }

    fn unpin(&self, slot: &Slot) {
        let _shared = self.lock_shared();
        if slot.pins.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.unpinned.notify_all();
        }
    }
}
