//! Matcher for the 16-byte-bounded codec.
//!
//! The length cap lets every pattern live in two little-endian words: the
//! prefix key (bytes 0..8) and a masked suffix word (bytes 8..16). No
//! auxiliary byte pool is needed, and suffix comparison reduces to an XOR
//! plus a trailing-zero count.
//!
//! Two forms are provided: a dynamic matcher for the training phase and a
//! read-only matcher built by [`PrefixMatcher16::finalize`] for the parse
//! phase, with perfect-hash prefix lookup and inline suffix storage.

use ptr_hash::{bucket_fn::Linear, PtrHash, PtrHashParams};
use rustc_hash::FxHashMap;

use super::{load_word_le, MASKS, MAX_BUCKET_LEN, PREFIX_LEN};

/// Longest pattern the bounded variant stores.
pub const MAX_TOKEN_LEN: usize = 16;

/// Long-pattern slots stored inline in a static long entry.
const INLINE_SLOTS: usize = 4;

/// One long pattern: masked suffix word, suffix length in bytes, token id.
#[derive(Copy, Clone)]
struct LongPattern {
    suffix: u64,
    suffix_len: u8,
    id: u16,
}

/// Dynamic longest-prefix matcher for patterns of 1..=16 bytes, used while
/// the dictionary is still growing.
pub struct PrefixMatcher16 {
    /// (masked word, length) of short patterns mapped to their token id.
    short: FxHashMap<(u64, u8), u16>,
    /// Prefix key mapped to long patterns, sorted by suffix length
    /// descending, insertion order breaking ties.
    buckets: FxHashMap<u64, Vec<LongPattern>>,
}

impl PrefixMatcher16 {
    /// Creates an empty matcher.
    pub fn new() -> Self {
        Self {
            short: FxHashMap::default(),
            buckets: FxHashMap::default(),
        }
    }

    /// Inserts a pattern of 1..=16 bytes under `id`.
    ///
    /// Returns `false` when the bucket for the pattern's prefix key is
    /// full; the matcher is then unchanged and the id stays unused. A short
    /// pattern colliding with an existing key keeps the earlier entry.
    #[inline]
    pub fn insert(&mut self, pattern: &[u8], id: u16) -> bool {
        debug_assert!(!pattern.is_empty() && pattern.len() <= MAX_TOKEN_LEN);

        if pattern.len() <= PREFIX_LEN {
            let key = load_word_le(pattern, pattern.len());
            self.short.entry((key, pattern.len() as u8)).or_insert(id);
            return true;
        }

        let key = load_word_le(pattern, PREFIX_LEN);
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= MAX_BUCKET_LEN {
            return false;
        }

        let suffix_len = pattern.len() - PREFIX_LEN;
        bucket.push(LongPattern {
            suffix: load_word_le(&pattern[PREFIX_LEN..], suffix_len),
            suffix_len: suffix_len as u8,
            id,
        });
        bucket.sort_by(|a, b| b.suffix_len.cmp(&a.suffix_len));
        true
    }

    /// Returns the id and length of the longest stored pattern that is a
    /// prefix of `data`, or `None` when not even one byte matches.
    #[inline]
    pub fn find_longest_match(&self, data: &[u8]) -> Option<(u16, usize)> {
        if data.len() > PREFIX_LEN {
            let key = load_word_le(data, PREFIX_LEN);
            if let Some(bucket) = self.buckets.get(&key) {
                let tail_len = data.len().min(MAX_TOKEN_LEN) - PREFIX_LEN;
                let tail = load_word_le(&data[PREFIX_LEN..], tail_len);
                for entry in bucket {
                    if is_prefix(tail, entry.suffix, tail_len, entry.suffix_len as usize) {
                        return Some((entry.id, PREFIX_LEN + entry.suffix_len as usize));
                    }
                }
            }
        }

        let probe = data.len().min(PREFIX_LEN);
        let mut word = load_word_le(data, probe);
        for len in (1..=probe).rev() {
            word &= MASKS[len];
            if let Some(&id) = self.short.get(&(word, len as u8)) {
                return Some((id, len));
            }
        }

        None
    }

    /// Builds the read-only matcher used by the parse phase.
    ///
    /// Every prefix key gets a 64-byte-aligned entry holding up to four
    /// inline suffix slots, an overflow range, and a precomputed fallback
    /// answer so a failed suffix scan still resolves without re-probing.
    /// Full-width (8-byte) short patterns migrate into the long entry table
    /// and resolve through the same single probe.
    pub fn finalize(&self) -> StaticPrefixMatcher16 {
        let mut entries: FxHashMap<u64, LongEntry> = FxHashMap::default();
        let mut overflow: Vec<LongPattern> = Vec::new();

        for (&key, bucket) in &self.buckets {
            let (answer_id, answer_len) = self
                .find_longest_match(&key.to_le_bytes())
                .expect("single-byte tokens cover every prefix key");

            let mut entry = LongEntry {
                prefix: key,
                answer_id,
                answer_len: answer_len as u8,
                n_suffixes: bucket.len() as u16,
                overflow_at: overflow.len() as u32,
                ..LongEntry::default()
            };
            for (slot, pattern) in bucket.iter().take(INLINE_SLOTS).enumerate() {
                entry.inline_suffixes[slot] = pattern.suffix;
                entry.inline_lens[slot] = pattern.suffix_len;
                entry.inline_ids[slot] = pattern.id;
            }
            overflow.extend(bucket.iter().skip(INLINE_SLOTS).copied());

            entries.insert(key, entry);
        }

        let mut short = FxHashMap::default();
        for (&(key, len), &id) in &self.short {
            if len as usize == PREFIX_LEN {
                // An existing bucket entry already answers this key through
                // its fallback; otherwise the pattern becomes the answer.
                entries.entry(key).or_insert(LongEntry {
                    prefix: key,
                    answer_id: id,
                    answer_len: len,
                    ..LongEntry::default()
                });
            } else {
                short.insert((key, len), id);
            }
        }

        if entries.is_empty() {
            return StaticPrefixMatcher16 {
                short,
                long_index: None,
                long_entries: Vec::new(),
                overflow,
            };
        }

        let keys: Vec<u64> = entries.keys().copied().collect();
        let mut params = PtrHashParams::default_fast();
        params.remap = false;
        let long_index: PtrHash<u64, Linear> = PtrHash::new(&keys, params);

        let slots = keys
            .iter()
            .map(|key| long_index.index_no_remap(key))
            .max()
            .unwrap_or(0);
        let mut long_entries = vec![LongEntry::default(); slots + 1];
        for (key, entry) in &entries {
            long_entries[long_index.index_no_remap(key)] = *entry;
        }

        StaticPrefixMatcher16 {
            short,
            long_index: Some(long_index),
            long_entries,
            overflow,
        }
    }
}

impl Default for PrefixMatcher16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata for one prefix key, 64-byte aligned so a probe touches a single
/// cache line.
#[repr(align(64))]
#[derive(Copy, Clone, Default)]
struct LongEntry {
    prefix: u64,
    inline_suffixes: [u64; INLINE_SLOTS],
    inline_lens: [u8; INLINE_SLOTS],
    inline_ids: [u16; INLINE_SLOTS],
    /// Total long patterns under this key, inline slots included.
    n_suffixes: u16,
    /// Start of this key's range in the overflow array.
    overflow_at: u32,
    /// Resolution when no stored suffix matches: the longest match of the
    /// prefix key's own 8 bytes. `answer_len == 0` marks a vacant slot.
    answer_id: u16,
    answer_len: u8,
}

/// Read-only longest-prefix matcher produced by
/// [`PrefixMatcher16::finalize`], optimized for the parse phase.
pub struct StaticPrefixMatcher16 {
    short: FxHashMap<(u64, u8), u16>,
    long_index: Option<PtrHash<u64, Linear>>,
    long_entries: Vec<LongEntry>,
    overflow: Vec<LongPattern>,
}

impl StaticPrefixMatcher16 {
    /// Returns the id and length of the longest stored pattern that is a
    /// prefix of `data`. Answers agree with the dynamic matcher.
    #[inline]
    pub fn find_longest_match(&self, data: &[u8]) -> Option<(u16, usize)> {
        if data.len() >= PREFIX_LEN {
            let key = load_word_le(data, PREFIX_LEN);
            let tail_len = data.len().min(MAX_TOKEN_LEN) - PREFIX_LEN;
            let tail = load_word_le(&data[PREFIX_LEN..], tail_len);
            if let Some(found) = self.probe_long(key, tail, tail_len) {
                return Some(found);
            }
        }

        let probe = data.len().min(PREFIX_LEN - 1);
        let mut word = load_word_le(data, probe);
        for len in (1..=probe).rev() {
            word &= MASKS[len];
            if let Some(&id) = self.short.get(&(word, len as u8)) {
                return Some((id, len));
            }
        }

        None
    }

    #[inline]
    fn probe_long(&self, key: u64, tail: u64, tail_len: usize) -> Option<(u16, usize)> {
        let index = self.long_index.as_ref()?;
        let entry = self.long_entries.get(index.index_no_remap(&key))?;
        if entry.prefix != key || entry.answer_len == 0 {
            return None;
        }

        let inline = INLINE_SLOTS.min(entry.n_suffixes as usize);
        for slot in 0..inline {
            if is_prefix(tail, entry.inline_suffixes[slot], tail_len, entry.inline_lens[slot] as usize) {
                return Some((
                    entry.inline_ids[slot],
                    PREFIX_LEN + entry.inline_lens[slot] as usize,
                ));
            }
        }

        if entry.n_suffixes as usize > INLINE_SLOTS {
            let start = entry.overflow_at as usize;
            let end = start + entry.n_suffixes as usize - INLINE_SLOTS;
            for pattern in &self.overflow[start..end] {
                if is_prefix(tail, pattern.suffix, tail_len, pattern.suffix_len as usize) {
                    return Some((pattern.id, PREFIX_LEN + pattern.suffix_len as usize));
                }
            }
        }

        Some((entry.answer_id, entry.answer_len as usize))
    }
}

/// `pattern` is a low-byte prefix of `text`, both masked words.
#[inline(always)]
fn is_prefix(text: u64, pattern: u64, text_len: usize, pattern_len: usize) -> bool {
    pattern_len <= text_len && shared_prefix_len(text, pattern) >= pattern_len
}

/// Length in bytes of the common low-byte prefix of two words.
#[inline(always)]
fn shared_prefix_len(a: u64, b: u64) -> usize {
    ((a ^ b).trailing_zeros() >> 3) as usize
}
