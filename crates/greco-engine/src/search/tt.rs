//! Shared transposition table.
//!
//! Lock-free: every entry is a pair of relaxed `AtomicU64`s, with the key
//! half stored as `hash ^ data` (the Hyatt/Mann xor trick). A torn
//! read/write shows up as a failed xor check and is treated as a miss, so
//! the table needs no synchronization beyond the atomics themselves.

use std::sync::atomic::{AtomicU64, Ordering};

use greco_core::Move;

use crate::score::{Score, score_from_tt, score_to_tt};

/// Relationship between a stored score and the true value of the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    Invalid = 0,
    /// Fail-high: the true score is at least the stored score.
    Lower = 1,
    /// Fail-low: the true score is at most the stored score.
    Upper = 2,
    /// The stored score is exact.
    Exact = 3,
}

impl Bound {
    #[inline]
    const fn from_bits(bits: u64) -> Bound {
        match bits & 0x3 {
            1 => Bound::Lower,
            2 => Bound::Upper,
            3 => Bound::Exact,
            _ => Bound::Invalid,
        }
    }
}

/// Decoded probe result. Scores have already been mapped back from
/// table-relative to root-relative form.
#[derive(Debug, Clone, Copy)]
pub struct TtEntry {
    pub score: Score,
    pub static_eval: Score,
    pub mv: Move,
    pub depth: i32,
    pub bound: Bound,
}

/// Entry layout inside the packed `data` word:
///
/// ```text
/// bits  0..16  score (i16, table-relative)
/// bits 16..32  static eval (i16)
/// bits 32..48  move (packed)
/// bits 48..56  depth (i8; quiescence entries use -1)
/// bits 56..58  bound
/// bits 58..64  generation
/// ```
fn pack(score: i16, eval: i16, mv: Move, depth: i8, bound: Bound, generation: u8) -> u64 {
    (score as u16 as u64)
        | ((eval as u16 as u64) << 16)
        | ((mv.raw() as u64) << 32)
        | ((depth as u8 as u64) << 48)
        | ((bound as u64) << 56)
        | (((generation & 0x3F) as u64) << 58)
}

#[inline]
const fn unpack_score(data: u64) -> i16 {
    data as u16 as i16
}

#[inline]
const fn unpack_eval(data: u64) -> i16 {
    (data >> 16) as u16 as i16
}

#[inline]
const fn unpack_move(data: u64) -> Move {
    Move::from_raw((data >> 32) as u16)
}

#[inline]
const fn unpack_depth(data: u64) -> i8 {
    (data >> 48) as u8 as i8
}

#[inline]
const fn unpack_bound(data: u64) -> Bound {
    Bound::from_bits(data >> 56)
}

#[inline]
const fn unpack_generation(data: u64) -> u8 {
    (data >> 58) as u8 & 0x3F
}

/// One 16-byte slot: xor-masked key and packed data.
#[derive(Default)]
struct Slot {
    key: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    /// Load both halves. The hash is recovered by re-xoring.
    #[inline]
    fn load(&self) -> (u64, u64) {
        let key = self.key.load(Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        (key ^ data, data)
    }

    #[inline]
    fn store(&self, hash: u64, data: u64) {
        self.key.store(hash ^ data, Ordering::Relaxed);
        self.data.store(data, Ordering::Relaxed);
    }
}

/// Slots per bucket; one bucket spans two cache lines.
const SLOTS_PER_BUCKET: usize = 5;

#[repr(align(64))]
#[derive(Default)]
struct Bucket {
    slots: [Slot; SLOTS_PER_BUCKET],
}

/// Error returned when a resize cannot allocate; the old table is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transposition table allocation of {requested_mb} MB failed")]
pub struct TtAllocationError {
    pub requested_mb: usize,
}

/// The shared transposition table.
pub struct TranspositionTable {
    buckets: Vec<Bucket>,
    generation: u8,
}

impl TranspositionTable {
    /// Allocate a table of roughly `mb` megabytes.
    ///
    /// # Panics
    ///
    /// Panics on allocation failure; use [`resize`](Self::resize) for the
    /// fallible path.
    pub fn new(mb: usize) -> TranspositionTable {
        let mut tt = TranspositionTable {
            buckets: Vec::new(),
            generation: 0,
        };
        tt.resize(mb).expect("initial transposition table allocation");
        tt
    }

    /// Number of buckets for a size in megabytes.
    fn bucket_count(mb: usize) -> usize {
        (mb.max(1) * 1024 * 1024 / std::mem::size_of::<Bucket>()).max(1)
    }

    /// Reshape the table. On allocation failure the existing table is left
    /// untouched and an error is returned.
    pub fn resize(&mut self, mb: usize) -> Result<(), TtAllocationError> {
        let count = Self::bucket_count(mb);
        let mut buckets: Vec<Bucket> = Vec::new();
        if buckets.try_reserve_exact(count).is_err() {
            return Err(TtAllocationError { requested_mb: mb });
        }
        buckets.resize_with(count, Bucket::default);
        self.buckets = buckets;
        self.generation = 0;
        Ok(())
    }

    /// Wipe every entry, keeping the allocation.
    pub fn clear(&self) {
        for bucket in &self.buckets {
            for slot in &bucket.slots {
                slot.store(0, 0);
            }
        }
    }

    /// Advance the generation counter. Called once per root search.
    pub fn new_generation(&mut self) {
        self.generation = (self.generation + 1) & 0x3F;
    }

    /// Bucket index by fixed-point multiplication: uniformly maps the full
    /// hash range onto `0..num_buckets` without requiring a power of two.
    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        ((hash as u128 * self.buckets.len() as u128) >> 64) as usize
    }

    /// Hint the CPU to pull the bucket for `hash` into cache.
    #[inline]
    pub fn prefetch(&self, hash: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};
            let bucket = &self.buckets[self.bucket_index(hash)];
            _mm_prefetch(bucket as *const Bucket as *const i8, _MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = hash;
    }

    /// Look up a position. `height` and `fifty` drive the mate-score
    /// transform of the returned score.
    pub fn probe(&self, hash: u64, height: usize, fifty: u16) -> Option<TtEntry> {
        let bucket = &self.buckets[self.bucket_index(hash)];
        for slot in &bucket.slots {
            let (slot_hash, data) = slot.load();
            if slot_hash == hash && unpack_bound(data) != Bound::Invalid {
                return Some(TtEntry {
                    score: score_from_tt(unpack_score(data) as Score, height, fifty),
                    static_eval: unpack_eval(data) as Score,
                    mv: unpack_move(data),
                    depth: unpack_depth(data) as i32,
                    bound: unpack_bound(data),
                });
            }
        }
        None
    }

    /// Store a search result.
    ///
    /// Replacement priority: an empty slot, then a slot already holding this
    /// position, then the slot whose `depth - 8 * age` value is lowest. When
    /// refreshing an existing entry without a new best move, the old move is
    /// preserved.
    pub fn store(
        &self,
        hash: u64,
        depth: i32,
        score: Score,
        static_eval: Score,
        mv: Move,
        bound: Bound,
        height: usize,
    ) {
        let bucket = &self.buckets[self.bucket_index(hash)];

        let mut victim = &bucket.slots[0];
        let mut victim_value = i32::MAX;
        let mut refresh_data = None;

        for slot in &bucket.slots {
            let (slot_hash, data) = slot.load();
            if unpack_bound(data) == Bound::Invalid {
                victim = slot;
                refresh_data = None;
                break;
            }
            if slot_hash == hash {
                victim = slot;
                refresh_data = Some(data);
                break;
            }
            let age = (self.generation.wrapping_sub(unpack_generation(data)) & 0x3F) as i32;
            let value = unpack_depth(data) as i32 - 8 * age;
            if value < victim_value {
                victim_value = value;
                victim = slot;
            }
        }

        let mv = match (mv.is_none(), refresh_data) {
            // Keep the known best move when the new entry has none.
            (true, Some(old)) => unpack_move(old),
            _ => mv,
        };

        let data = pack(
            score_to_tt(score, height).clamp(i16::MIN as Score, i16::MAX as Score) as i16,
            static_eval.clamp(i16::MIN as Score, i16::MAX as Score) as i16,
            mv,
            depth.clamp(i8::MIN as i32, i8::MAX as i32) as i8,
            bound,
            self.generation,
        );
        victim.store(hash, data);
    }

    /// Per-mille of sampled slots holding a current-generation entry; the
    /// `hashfull` figure reported in progress events.
    pub fn hashfull(&self) -> u32 {
        let sample = self.buckets.len().min(200);
        if sample == 0 {
            return 0;
        }
        let mut used = 0u32;
        for bucket in &self.buckets[..sample] {
            for slot in &bucket.slots {
                let (_, data) = slot.load();
                if unpack_bound(data) != Bound::Invalid
                    && unpack_generation(data) == self.generation
                {
                    used += 1;
                }
            }
        }
        used * 1000 / (sample * SLOTS_PER_BUCKET) as u32
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("buckets", &self.buckets.len())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::MATE;
    use greco_core::Square;

    fn test_move() -> Move {
        Move::normal(Square::E1, Square::E8)
    }

    #[test]
    fn bucket_is_cacheline_aligned() {
        assert_eq!(std::mem::align_of::<Bucket>(), 64);
        assert_eq!(std::mem::size_of::<Slot>(), 16);
    }

    #[test]
    fn store_probe_roundtrip() {
        let tt = TranspositionTable::new(1);
        let hash = 0xDEAD_BEEF_1234_5678u64;
        tt.store(hash, 7, 132, 90, test_move(), Bound::Exact, 3);

        let entry = tt.probe(hash, 3, 0).expect("entry present");
        assert_eq!(entry.score, 132);
        assert_eq!(entry.static_eval, 90);
        assert_eq!(entry.mv, test_move());
        assert_eq!(entry.depth, 7);
        assert_eq!(entry.bound, Bound::Exact);
    }

    #[test]
    fn probe_miss() {
        let tt = TranspositionTable::new(1);
        assert!(tt.probe(0x1234, 0, 0).is_none());
    }

    #[test]
    fn mate_score_rereads_at_different_height() {
        let tt = TranspositionTable::new(1);
        let hash = 0xAAAA_BBBB_CCCC_DDDDu64;
        // Mate in 5 plies seen at height 2.
        tt.store(hash, 9, MATE - 7, 0, test_move(), Bound::Exact, 2);
        // Reading at height 4 must yield mate in 5 from there: MATE - 9.
        let entry = tt.probe(hash, 4, 0).unwrap();
        assert_eq!(entry.score, MATE - 9);
    }

    #[test]
    fn negative_depth_roundtrip() {
        let tt = TranspositionTable::new(1);
        tt.store(0x77, -1, 10, 10, Move::NONE, Bound::Lower, 0);
        assert_eq!(tt.probe(0x77, 0, 0).unwrap().depth, -1);
    }

    #[test]
    fn move_preserved_on_refresh_without_move() {
        let tt = TranspositionTable::new(1);
        let hash = 0x5151_5151_5151_5151u64;
        tt.store(hash, 5, 50, 40, test_move(), Bound::Exact, 0);
        // Quiescence refresh with no best move.
        tt.store(hash, -1, 60, 40, Move::NONE, Bound::Lower, 0);

        let entry = tt.probe(hash, 0, 0).unwrap();
        assert_eq!(entry.mv, test_move(), "old best move must survive");
        assert_eq!(entry.depth, -1, "newer data otherwise replaces");
    }

    #[test]
    fn colliding_hashes_fill_bucket_slots() {
        let mut tt = TranspositionTable::new(1);
        tt.buckets.truncate(1); // force every hash into one bucket
        for i in 0..SLOTS_PER_BUCKET as u64 {
            tt.store(0x1000 + i, 3, i as Score, 0, Move::NONE, Bound::Exact, 0);
        }
        for i in 0..SLOTS_PER_BUCKET as u64 {
            assert!(tt.probe(0x1000 + i, 0, 0).is_some(), "slot {i} evicted too early");
        }
    }

    #[test]
    fn shallow_old_generation_entry_is_evicted_first(){
        let mut tt = TranspositionTable::new(1);
        tt.buckets.truncate(1);
        // Fill the bucket in generation 0; the shallowest entry is hash 0x2000.
        tt.store(0x2000, 1, 0, 0, Move::NONE, Bound::Exact, 0);
        for i in 1..SLOTS_PER_BUCKET as u64 {
            tt.store(0x2000 + i, 20, 0, 0, Move::NONE, Bound::Exact, 0);
        }
        tt.new_generation();
        tt.store(0x9999, 2, 0, 0, Move::NONE, Bound::Exact, 0);
        assert!(tt.probe(0x9999, 0, 0).is_some());
        assert!(tt.probe(0x2000, 0, 0).is_none(), "shallow stale entry replaced");
        assert!(tt.probe(0x2001, 0, 0).is_some(), "deep entries survive");
    }

    #[test]
    fn clear_empties_table() {
        let tt = TranspositionTable::new(1);
        tt.store(0x42, 3, 1, 1, Move::NONE, Bound::Exact, 0);
        tt.clear();
        assert!(tt.probe(0x42, 0, 0).is_none());
    }

    #[test]
    fn hashfull_counts_current_generation() {
        let mut tt = TranspositionTable::new(1);
        assert_eq!(tt.hashfull(), 0);
        for i in 0..2000u64 {
            tt.store(i.wrapping_mul(0x9E37_79B9_7F4A_7C15), 3, 0, 0, Move::NONE, Bound::Exact, 0);
        }
        assert!(tt.hashfull() > 0);
        // After many empty generations the same entries stop counting.
        for _ in 0..10 {
            tt.new_generation();
        }
        let stale = tt.hashfull();
        assert!(stale < 5, "stale entries should not count as full, got {stale}");
    }

    #[test]
    fn resize_keeps_table_usable() {
        let mut tt = TranspositionTable::new(1);
        tt.store(0x42, 3, 1, 1, Move::NONE, Bound::Exact, 0);
        tt.resize(2).unwrap();
        assert!(tt.probe(0x42, 0, 0).is_none(), "resize discards entries");
        tt.store(0x42, 3, 1, 1, Move::NONE, Bound::Exact, 0);
        assert!(tt.probe(0x42, 0, 0).is_some());
    }
}
