//! The 16-byte-bounded codec.
//!
//! Capping token length at 16 bytes keeps every matcher key in two machine
//! words and lets decompression copy a fixed-size block per token, with no
//! length branch at all.

use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;

use super::{flatten_strings, resolve_threshold, shuffle_rng, validate_layout, CompressOptions};
use crate::error::Result;
use crate::matcher::{PrefixMatcher16, StaticPrefixMatcher16, MAX_TOKEN_LEN};

/// Dictionary compressor with tokens capped at 16 bytes.
///
/// The bound trades a little compression ratio for a leaner matcher and a
/// branch-free decompression copy. Training mirrors [`PairZip`]: pairs of
/// adjacent tokens are promoted once frequent enough, except that a pair
/// whose combined length exceeds 16 bytes is never counted. Parsing runs
/// against a finalized read-only matcher.
///
/// [`PairZip`]: crate::PairZip
pub struct PairZip16 {
    /// Token ids, all strings back to back.
    token_stream: Vec<u16>,
    /// End position in `token_stream` for each string, leading 0 included.
    string_ends: Vec<usize>,
    /// Literal bytes of every token in id order.
    dict_bytes: Vec<u8>,
    /// End position in `dict_bytes` for each token, leading 0 included.
    dict_ends: Vec<u32>,
}

impl PairZip16 {
    /// Creates an empty codec.
    pub fn new() -> Self {
        Self {
            token_stream: Vec::new(),
            string_ends: Vec::new(),
            dict_bytes: Vec::new(),
            dict_ends: Vec::new(),
        }
    }

    /// Creates an empty codec with capacity reserved for the expected
    /// number of strings and total input bytes.
    pub fn with_capacity(num_strings: usize, total_bytes: usize) -> Self {
        Self {
            token_stream: Vec::with_capacity(total_bytes),
            string_ends: Vec::with_capacity(num_strings + 1),
            dict_bytes: Vec::with_capacity(2 * 1024 * 1024),
            dict_ends: Vec::with_capacity((1 << 16) + 1),
        }
    }

    /// Compresses a collection of strings.
    ///
    /// Convenience wrapper that flattens the collection and delegates to
    /// [`compress_bytes`](Self::compress_bytes).
    pub fn compress_strings<S: AsRef<[u8]>>(&mut self, strings: &[S]) -> Result<()> {
        let (data, ends) = flatten_strings(strings);
        self.compress_bytes(&data, &ends)
    }

    /// Compresses pre-flattened byte data with its end-offset layout.
    ///
    /// `ends` is a prefix-sum array starting with 0: strings of lengths
    /// `[3, 2, 4]` are described by `[0, 3, 5, 9]`.
    pub fn compress_bytes(&mut self, data: &[u8], ends: &[usize]) -> Result<()> {
        self.compress_bytes_with(data, ends, &CompressOptions::default())
    }

    /// As [`compress_bytes`](Self::compress_bytes), with explicit
    /// threshold and shuffle-seed knobs.
    ///
    /// # Panics
    ///
    /// A codec instance compresses once; calling this on an already filled
    /// instance panics.
    pub fn compress_bytes_with(
        &mut self,
        data: &[u8],
        ends: &[usize],
        options: &CompressOptions,
    ) -> Result<()> {
        assert!(self.dict_ends.is_empty(), "codec instances compress only once");
        validate_layout(data.len(), ends)?;

        let matcher = self.train(data, ends, options);
        let fixed = matcher.finalize();
        self.parse(data, ends, &fixed);

        // Slack so the fixed-size decompression copy never reads past the
        // last token. Not part of the dictionary, see `space_used`.
        self.dict_bytes.extend_from_slice(&[0u8; MAX_TOKEN_LEN]);
        Ok(())
    }

    /// Phase 1: dictionary training under the 16-byte token bound.
    ///
    /// Identical to the unconstrained trainer except that a pair whose
    /// combined length exceeds the bound is skipped before counting, and a
    /// rejected matcher insert (full bucket) abandons the merge.
    fn train(&mut self, data: &[u8], ends: &[usize], options: &CompressOptions) -> PrefixMatcher16 {
        self.dict_ends.push(0);

        let mut pair_counts: FxHashMap<(u16, u16), u32> = FxHashMap::default();
        let mut matcher = PrefixMatcher16::new();
        let mut next_id: u16 = 256;

        // Identity tokens: every byte value maps to itself.
        for byte in 0..=255u8 {
            matcher.insert(&[byte], u16::from(byte));
            self.dict_bytes.push(byte);
            self.dict_ends.push(self.dict_bytes.len() as u32);
        }

        let mut visit_order: Vec<usize> = (0..ends.len() - 1).collect();
        visit_order.shuffle(&mut shuffle_rng(options));

        let total_bytes = ends.last().copied().unwrap_or(0);
        let threshold = resolve_threshold(total_bytes, options);
        log::debug!(
            "training over {} strings ({} bytes), merge threshold {}",
            visit_order.len(),
            total_bytes,
            threshold
        );

        'training: for &index in &visit_order {
            let start = ends[index];
            let end = ends[index + 1];
            if start == end {
                continue;
            }

            // Primer match: the pair loop needs a left-hand token.
            let (mut prev_id, mut prev_len) = matcher
                .find_longest_match(&data[start..end])
                .expect("single-byte tokens cover every input byte");
            let mut pos = start + prev_len;

            while pos < end {
                let (match_id, match_len) = matcher
                    .find_longest_match(&data[pos..end])
                    .expect("single-byte tokens cover every input byte");

                let mut promoted = false;
                if prev_len + match_len <= MAX_TOKEN_LEN {
                    let pair = (prev_id, match_id);
                    *pair_counts.entry(pair).or_insert(0) += 1;

                    if pair_counts[&pair] >= threshold {
                        let phrase = &data[pos - prev_len..pos + match_len];
                        if matcher.insert(phrase, next_id) {
                            self.dict_bytes.extend_from_slice(phrase);
                            self.dict_ends.push(self.dict_bytes.len() as u32);
                            pair_counts.remove(&pair);

                            prev_id = next_id;
                            prev_len += match_len;
                            promoted = true;

                            if next_id == u16::MAX {
                                break 'training;
                            }
                            next_id += 1;
                        }
                    }
                }

                if !promoted {
                    prev_id = match_id;
                    prev_len = match_len;
                }
                pos += match_len;
            }
        }

        log::debug!("dictionary trained with {} tokens", self.dict_ends.len() - 1);
        matcher
    }

    /// Phase 2: greedy parse of every string with the finalized matcher.
    fn parse(&mut self, data: &[u8], ends: &[usize], matcher: &StaticPrefixMatcher16) {
        self.string_ends.push(0);

        for window in ends.windows(2) {
            let (start, end) = (window[0], window[1]);

            let mut pos = start;
            while pos < end {
                let (id, len) = matcher
                    .find_longest_match(&data[pos..end])
                    .expect("single-byte tokens cover every input byte");
                self.token_stream.push(id);
                pos += len;
            }

            self.string_ends.push(self.token_stream.len());
        }
    }

    /// Decompresses string `index` into `out` and returns the byte count.
    ///
    /// # Safety contract
    ///
    /// Every token is written with an unconditional 16-byte copy, so `out`
    /// must hold [`decompressed_len`](Self::decompressed_len) plus 15
    /// trailing slack bytes; anything smaller is undefined behavior. Debug
    /// builds assert the contract. Panics if `index` is out of range.
    #[inline]
    pub fn decompress_string(&self, index: usize, out: &mut [u8]) -> usize {
        let start = self.string_ends[index];
        let end = self.string_ends[index + 1];
        debug_assert!(
            start == end || out.len() >= self.decompressed_len(index) + MAX_TOKEN_LEN - 1,
            "output buffer lacks the required trailing slack"
        );

        let mut written = 0;
        for &id in &self.token_stream[start..end] {
            written += self.copy_token(id, out, written);
        }
        written
    }

    /// Decompresses the whole collection in index order and returns the
    /// total byte count. The buffer contract of
    /// [`decompress_string`](Self::decompress_string) applies, with
    /// [`total_decompressed_len`](Self::total_decompressed_len).
    pub fn decompress_all(&self, out: &mut [u8]) -> usize {
        debug_assert!(
            self.token_stream.is_empty()
                || out.len() >= self.total_decompressed_len() + MAX_TOKEN_LEN - 1,
            "output buffer lacks the required trailing slack"
        );

        let mut written = 0;
        for &id in &self.token_stream {
            written += self.copy_token(id, out, written);
        }
        written
    }

    #[inline(always)]
    fn copy_token(&self, id: u16, out: &mut [u8], at: usize) -> usize {
        let start = self.dict_ends[id as usize] as usize;
        let end = self.dict_ends[id as usize + 1] as usize;

        unsafe {
            let src = self.dict_bytes.as_ptr().add(start);
            let dst = out.as_mut_ptr().add(at);
            std::ptr::copy_nonoverlapping(src, dst, MAX_TOKEN_LEN);
        }
        end - start
    }

    /// Decompressed byte length of string `index`.
    pub fn decompressed_len(&self, index: usize) -> usize {
        self.token_stream[self.string_ends[index]..self.string_ends[index + 1]]
            .iter()
            .map(|&id| self.token_len(id))
            .sum()
    }

    /// Total decompressed byte length over all strings.
    pub fn total_decompressed_len(&self) -> usize {
        self.token_stream.iter().map(|&id| self.token_len(id)).sum()
    }

    #[inline]
    fn token_len(&self, id: u16) -> usize {
        (self.dict_ends[id as usize + 1] - self.dict_ends[id as usize]) as usize
    }

    /// Number of strings in the compressed collection.
    pub fn num_strings(&self) -> usize {
        self.string_ends.len().saturating_sub(1)
    }

    /// Number of dictionary tokens, the 256 identity tokens included.
    pub fn num_tokens(&self) -> usize {
        self.dict_ends.len().saturating_sub(1)
    }

    /// Bytes used by the compressed representation: token stream,
    /// dictionary blob, dictionary offsets, and string boundaries.
    pub fn space_used(&self) -> usize {
        let dict_len = self.dict_ends.last().map_or(0, |&end| end as usize);
        self.token_stream.len() * std::mem::size_of::<u16>()
            + dict_len
            + self.dict_ends.len() * std::mem::size_of::<u32>()
            + self.string_ends.len() * std::mem::size_of::<usize>()
    }

    /// Shrinks all internal buffers to fit their contents.
    pub fn shrink_to_fit(&mut self) {
        self.token_stream.shrink_to_fit();
        self.string_ends.shrink_to_fit();
        self.dict_bytes.shrink_to_fit();
        self.dict_ends.shrink_to_fit();
    }
}

impl Default for PairZip16 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_token_exceeds_the_bound() {
        let strings: Vec<String> = (0..50)
            .flat_map(|_| (1..=5).map(|i| format!("user_{i:06}")))
            .collect();
        let mut codec = PairZip16::new();
        codec.compress_strings(&strings).unwrap();

        assert!(codec.num_tokens() > 256, "expected promotions on this corpus");
        for id in 0..codec.num_tokens() {
            assert!(codec.token_len(id as u16) <= MAX_TOKEN_LEN);
        }
    }

    #[test]
    fn repeated_single_byte_stays_byte_tokens() {
        let mut codec = PairZip16::new();
        codec.compress_strings(&["a", "a", "a"]).unwrap();

        assert_eq!(codec.num_tokens(), 256);
        assert_eq!(codec.token_stream, vec![97, 97, 97]);
        assert_eq!(codec.space_used(), 3 * 2 + 256 + 257 * 4 + 4 * 8);
    }

    #[test]
    fn empty_strings_take_no_tokens() {
        let mut codec = PairZip16::new();
        codec.compress_strings(&["", "x", ""]).unwrap();

        assert_eq!(codec.string_ends, vec![0, 0, 1, 1]);
        let mut out = vec![0u8; 1 + MAX_TOKEN_LEN];
        assert_eq!(codec.decompress_string(0, &mut out), 0);
        assert_eq!(codec.decompress_string(1, &mut out), 1);
        assert_eq!(out[0], b'x');
        assert_eq!(codec.decompress_string(2, &mut out), 0);
    }

    #[test]
    fn long_runs_round_trip_through_bounded_tokens() {
        // A single long string: merges stack up to the 16-byte cap.
        let data = vec![0u8; 4096];
        let mut codec = PairZip16::new();
        codec.compress_bytes(&data, &[0, data.len()]).unwrap();

        let mut out = vec![0u8; data.len() + MAX_TOKEN_LEN];
        assert_eq!(codec.decompress_string(0, &mut out), data.len());
        assert!(out[..data.len()].iter().all(|&b| b == 0));
        for id in 0..codec.num_tokens() {
            assert!(codec.token_len(id as u16) <= MAX_TOKEN_LEN);
        }
    }

    #[test]
    #[should_panic(expected = "compress only once")]
    fn second_compression_panics() {
        let mut codec = PairZip16::new();
        codec.compress_strings(&["once"]).unwrap();
        codec.compress_strings(&["twice"]).unwrap();
    }
}
