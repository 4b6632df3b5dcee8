//! Matcher for the unconstrained codec: patterns of any length.

use rustc_hash::FxHashMap;

use super::{load_word_le, MASKS, MAX_BUCKET_LEN, PREFIX_LEN};

/// Longest-prefix matcher over patterns of arbitrary length.
///
/// Short patterns resolve with one hash probe per candidate length. Longer
/// patterns are bucketed by prefix key; their suffixes (bytes 8..) are
/// packed into one contiguous blob addressed through a per-id end-offset
/// table, so a bucket entry is just the token id.
///
/// Ids must be inserted in increasing order starting from 0: the suffix
/// offset table is indexed by id.
pub struct PrefixMatcher {
    /// (masked word, length) of short patterns mapped to their token id.
    short: FxHashMap<(u64, u8), u16>,
    /// Prefix key mapped to long-pattern ids, sorted by suffix length
    /// descending, insertion order breaking ties.
    buckets: FxHashMap<u64, Vec<u16>>,
    suffix_bytes: Vec<u8>,
    suffix_ends: Vec<u32>,
}

impl PrefixMatcher {
    /// Creates an empty matcher.
    pub fn new() -> Self {
        Self {
            short: FxHashMap::default(),
            buckets: FxHashMap::default(),
            suffix_bytes: Vec::new(),
            suffix_ends: vec![0],
        }
    }

    /// Inserts `pattern` under `id`.
    ///
    /// Returns `false` when the bucket for the pattern's prefix key is
    /// full; the matcher is then unchanged and the id stays unused. A short
    /// pattern colliding with an existing key keeps the earlier entry.
    #[inline]
    pub fn insert(&mut self, pattern: &[u8], id: u16) -> bool {
        debug_assert!(!pattern.is_empty());
        debug_assert_eq!(self.suffix_ends.len(), id as usize + 1);

        if pattern.len() <= PREFIX_LEN {
            let key = load_word_le(pattern, pattern.len());
            self.short.entry((key, pattern.len() as u8)).or_insert(id);
            self.suffix_ends.push(self.suffix_bytes.len() as u32);
            return true;
        }

        let key = load_word_le(pattern, PREFIX_LEN);
        let bucket = self.buckets.entry(key).or_default();
        if bucket.len() >= MAX_BUCKET_LEN {
            return false;
        }

        self.suffix_bytes.extend_from_slice(&pattern[PREFIX_LEN..]);
        self.suffix_ends.push(self.suffix_bytes.len() as u32);
        bucket.push(id);

        let ends = &self.suffix_ends;
        bucket.sort_by(|&a, &b| {
            let len_a = ends[a as usize + 1] - ends[a as usize];
            let len_b = ends[b as usize + 1] - ends[b as usize];
            len_b.cmp(&len_a)
        });
        true
    }

    /// Returns the id and length of the longest stored pattern that is a
    /// prefix of `data`, or `None` when not even one byte matches.
    #[inline]
    pub fn find_longest_match(&self, data: &[u8]) -> Option<(u16, usize)> {
        if data.len() > PREFIX_LEN {
            let key = load_word_le(data, PREFIX_LEN);
            if let Some(bucket) = self.buckets.get(&key) {
                let rest = &data[PREFIX_LEN..];
                for &id in bucket {
                    let suffix = self.suffix(id);
                    if rest.starts_with(suffix) {
                        return Some((id, PREFIX_LEN + suffix.len()));
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

    #[inline]
    fn suffix(&self, id: u16) -> &[u8] {
        let start = self.suffix_ends[id as usize] as usize;
        let end = self.suffix_ends[id as usize + 1] as usize;
        &self.suffix_bytes[start..end]
    }
}

impl Default for PrefixMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_with(patterns: &[&[u8]]) -> PrefixMatcher {
        let mut matcher = PrefixMatcher::new();
        for (id, pattern) in patterns.iter().enumerate() {
            assert!(matcher.insert(pattern, id as u16));
        }
        matcher
    }

    #[test]
    fn prefers_longest_short_pattern() {
        let matcher = matcher_with(&[b"a", b"ab", b"abc"]);
        assert_eq!(matcher.find_longest_match(b"abcd"), Some((2, 3)));
        assert_eq!(matcher.find_longest_match(b"abd"), Some((1, 2)));
        assert_eq!(matcher.find_longest_match(b"ax"), Some((0, 1)));
        assert_eq!(matcher.find_longest_match(b"x"), None);
    }

    #[test]
    fn long_patterns_win_over_short() {
        let matcher = matcher_with(&[b"protocol", b"protocol_v2"]);
        assert_eq!(matcher.find_longest_match(b"protocol_v2/x"), Some((1, 11)));
        assert_eq!(matcher.find_longest_match(b"protocol_v3"), Some((0, 8)));
    }

    #[test]
    fn equal_prefix_keys_pick_longest_suffix() {
        let matcher = matcher_with(&[b"shared-key-abc", b"shared-key-abcdef"]);
        assert_eq!(
            matcher.find_longest_match(b"shared-key-abcdef-tail"),
            Some((1, 17))
        );
        assert_eq!(matcher.find_longest_match(b"shared-key-abcxyz"), Some((0, 14)));
    }

    #[test]
    fn matches_cursor_shorter_than_a_word() {
        let matcher = matcher_with(&[b"matched"]);
        assert_eq!(matcher.find_longest_match(b"matched"), Some((0, 7)));
    }

    #[test]
    fn bucket_rejects_at_cap() {
        let mut matcher = PrefixMatcher::new();
        for id in 0..MAX_BUCKET_LEN as u16 {
            let mut pattern = b"prefix00".to_vec();
            pattern.extend_from_slice(&id.to_le_bytes());
            assert!(matcher.insert(&pattern, id));
        }

        assert!(!matcher.insert(b"prefix00-one-too-many", MAX_BUCKET_LEN as u16));
        // A rejected insert leaves the existing entries reachable.
        assert_eq!(matcher.find_longest_match(b"prefix00\x00\x00rest"), Some((0, 10)));
    }

    #[test]
    fn duplicate_short_key_keeps_first_entry() {
        let mut matcher = PrefixMatcher::new();
        assert!(matcher.insert(b"dup", 0));
        assert!(matcher.insert(b"dup", 1));
        assert_eq!(matcher.find_longest_match(b"dup"), Some((0, 3)));
    }
}
