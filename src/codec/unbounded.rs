//! The unconstrained codec: dictionary tokens of any length.

use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;

use super::{flatten_strings, resolve_threshold, shuffle_rng, validate_layout, CompressOptions};
use crate::error::Result;
use crate::matcher::PrefixMatcher;

/// Bytes copied per token during decompression regardless of token length.
const FAST_COPY_LEN: usize = 16;

/// Dictionary compressor for string collections with per-string
/// random-access decompression and no cap on token length.
///
/// Training grows a dictionary of up to 65,536 tokens by promoting
/// frequently adjacent token pairs; parsing then re-encodes every string as
/// a sequence of 16-bit token ids. Each string decompresses independently
/// of all others.
pub struct PairZip {
    /// Token ids, all strings back to back.
    token_stream: Vec<u16>,
    /// End position in `token_stream` for each string, leading 0 included.
    string_ends: Vec<usize>,
    /// Literal bytes of every token in id order.
    dict_bytes: Vec<u8>,
    /// End position in `dict_bytes` for each token, leading 0 included.
    dict_ends: Vec<u32>,
}

impl PairZip {
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
            dict_bytes: Vec::with_capacity(1024 * 1024),
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
        self.parse(data, ends, &matcher);

        // Slack so the fixed-size decompression copy never reads past the
        // last token. Not part of the dictionary, see `space_used`.
        self.dict_bytes.extend_from_slice(&[0u8; FAST_COPY_LEN]);
        Ok(())
    }

    /// Phase 1: dictionary training.
    ///
    /// Parses a shuffled traversal of the input through the evolving
    /// matcher, counts adjacent token pairs, and promotes a pair to a new
    /// token once its count reaches the merge threshold. Stops when the
    /// id space (65,536 tokens) is exhausted.
    fn train(&mut self, data: &[u8], ends: &[usize], options: &CompressOptions) -> PrefixMatcher {
        self.dict_ends.push(0);

        let mut pair_counts: FxHashMap<(u16, u16), u32> = FxHashMap::default();
        let mut matcher = PrefixMatcher::new();
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

                let pair = (prev_id, match_id);
                *pair_counts.entry(pair).or_insert(0) += 1;

                let mut promoted = false;
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

    /// Phase 2: greedy parse of every string with the trained matcher.
    fn parse(&mut self, data: &[u8], ends: &[usize], matcher: &PrefixMatcher) {
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
    /// Tokens are written with an unconditional 16-byte copy, so `out` must
    /// hold [`decompressed_len`](Self::decompressed_len) plus 15 trailing
    /// slack bytes; anything smaller is undefined behavior. Debug builds
    /// assert the contract. Panics if `index` is out of range.
    #[inline]
    pub fn decompress_string(&self, index: usize, out: &mut [u8]) -> usize {
        let start = self.string_ends[index];
        let end = self.string_ends[index + 1];
        debug_assert!(
            start == end || out.len() >= self.decompressed_len(index) + FAST_COPY_LEN - 1,
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
                || out.len() >= self.total_decompressed_len() + FAST_COPY_LEN - 1,
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
        let len = end - start;

        unsafe {
            let src = self.dict_bytes.as_ptr().add(start);
            let dst = out.as_mut_ptr().add(at);
            std::ptr::copy_nonoverlapping(src, dst, FAST_COPY_LEN);
            if len > FAST_COPY_LEN {
                std::ptr::copy_nonoverlapping(
                    src.add(FAST_COPY_LEN),
                    dst.add(FAST_COPY_LEN),
                    len - FAST_COPY_LEN,
                );
            }
        }
        len
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

impl Default for PairZip {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tokens_decode_to_their_byte() {
        let mut codec = PairZip::new();
        codec.compress_strings(&["tiny"]).unwrap();

        for id in 0..256u16 {
            assert_eq!(codec.token_len(id), 1);
            assert_eq!(codec.dict_bytes[codec.dict_ends[id as usize] as usize], id as u8);
        }
    }

    #[test]
    fn repeated_single_byte_stays_byte_tokens() {
        // One-token strings never contribute a pair, so nothing promotes.
        let mut codec = PairZip::new();
        codec.compress_strings(&["a", "a", "a"]).unwrap();

        assert_eq!(codec.num_tokens(), 256);
        assert_eq!(codec.token_stream, vec![97, 97, 97]);
        assert_eq!(codec.string_ends, vec![0, 1, 2, 3]);
        // 3 stream entries + 256 dictionary bytes + 257 offsets + 4 ends.
        assert_eq!(codec.space_used(), 3 * 2 + 256 + 257 * 4 + 4 * 8);

        let mut out = vec![0u8; 1 + FAST_COPY_LEN];
        for index in 0..3 {
            assert_eq!(codec.decompress_string(index, &mut out), 1);
            assert_eq!(out[0], b'a');
        }
    }

    #[test]
    fn empty_strings_take_no_tokens() {
        let mut codec = PairZip::new();
        codec.compress_strings(&["", "x", ""]).unwrap();

        assert_eq!(codec.string_ends, vec![0, 0, 1, 1]);
        assert_eq!(codec.decompressed_len(0), 0);
        assert_eq!(codec.decompressed_len(2), 0);

        let mut out = vec![0u8; 1 + FAST_COPY_LEN];
        assert_eq!(codec.decompress_string(0, &mut out), 0);
        assert_eq!(codec.decompress_string(1, &mut out), 1);
        assert_eq!(out[0], b'x');
        assert_eq!(codec.decompress_string(2, &mut out), 0);
    }

    #[test]
    fn offsets_stay_monotone_after_training() {
        let strings: Vec<String> = (0..200).map(|i| format!("item_{i:04}")).collect();
        let mut codec = PairZip::new();
        codec.compress_strings(&strings).unwrap();

        assert_eq!(codec.dict_ends[0], 0);
        assert!(codec.dict_ends.windows(2).all(|w| w[0] <= w[1]));
        assert!(codec.string_ends.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*codec.string_ends.last().unwrap(), codec.token_stream.len());
    }

    #[test]
    #[should_panic(expected = "compress only once")]
    fn second_compression_panics() {
        let mut codec = PairZip::new();
        codec.compress_strings(&["once"]).unwrap();
        codec.compress_strings(&["twice"]).unwrap();
    }
}
