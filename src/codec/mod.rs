//! The two compressor variants and their shared training plumbing.

mod bounded;
mod unbounded;

pub use bounded::PairZip16;
pub use unbounded::PairZip;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Tuning knobs for a compress call.
///
/// The defaults reproduce the standard behavior: the merge threshold is
/// derived from the corpus size and the training order is shuffled with a
/// fresh nondeterministic seed on every call.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Overrides the corpus-size-derived merge threshold. Values below 2
    /// are clamped to 2.
    pub threshold: Option<u16>,
    /// Pins the seed of the training-order shuffle, mainly for tests.
    /// Compressed output is not part of any stability contract.
    pub seed: Option<u64>,
}

/// Checks the prefix-sum layout contract of `ends` against the data buffer.
pub(crate) fn validate_layout(data_len: usize, ends: &[usize]) -> Result<()> {
    let (&first, _) = ends.split_first().ok_or(Error::EmptyLayout)?;
    if first != 0 {
        return Err(Error::NonZeroOrigin { first });
    }
    for (index, pair) in ends.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(Error::UnorderedEnds {
                index: index + 1,
                prev: pair[0],
                next: pair[1],
            });
        }
    }
    if let Some(&last) = ends.last() {
        if last > data_len {
            return Err(Error::EndOutOfRange { last, data_len });
        }
    }
    Ok(())
}

/// Merge threshold: `max(2, floor(log2(corpus size in MiB)))`, so larger
/// corpora demand more evidence before a pair is promoted.
pub(crate) fn resolve_threshold(total_bytes: usize, options: &CompressOptions) -> u32 {
    let resolved = match options.threshold {
        Some(threshold) => u32::from(threshold),
        None => {
            let size_mib = total_bytes as f64 / (1024.0 * 1024.0);
            size_mib.log2().max(2.0) as u32
        }
    };
    resolved.max(2)
}

pub(crate) fn shuffle_rng(options: &CompressOptions) -> StdRng {
    match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Flattens a collection of strings into one byte buffer plus a prefix sum
/// of end offsets, the layout `compress_bytes` consumes.
///
/// The offset array starts with 0 and has one entry per string after it:
/// lengths `[3, 2, 4]` produce `[0, 3, 5, 9]`.
pub fn flatten_strings<S: AsRef<[u8]>>(strings: &[S]) -> (Vec<u8>, Vec<usize>) {
    let total_len = strings.iter().map(|s| s.as_ref().len()).sum();
    let mut data = Vec::with_capacity(total_len);
    let mut ends = Vec::with_capacity(strings.len() + 1);

    ends.push(0);
    for string in strings {
        data.extend_from_slice(string.as_ref());
        ends.push(data.len());
    }

    (data, ends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_builds_prefix_sums() {
        let (data, ends) = flatten_strings(&["abc", "de", "", "fghi"]);
        assert_eq!(data, b"abcdefghi");
        assert_eq!(ends, vec![0, 3, 5, 5, 9]);
    }

    #[test]
    fn layout_validation_rejects_bad_shapes() {
        assert_eq!(validate_layout(4, &[]), Err(Error::EmptyLayout));
        assert_eq!(
            validate_layout(4, &[1, 4]),
            Err(Error::NonZeroOrigin { first: 1 })
        );
        assert_eq!(
            validate_layout(4, &[0, 3, 2]),
            Err(Error::UnorderedEnds { index: 2, prev: 3, next: 2 })
        );
        assert_eq!(
            validate_layout(4, &[0, 5]),
            Err(Error::EndOutOfRange { last: 5, data_len: 4 })
        );
        assert_eq!(validate_layout(4, &[0, 2, 2, 4]), Ok(()));
        assert_eq!(validate_layout(0, &[0]), Ok(()));
    }

    #[test]
    fn threshold_scales_with_corpus_size() {
        let defaults = CompressOptions::default();
        assert_eq!(resolve_threshold(0, &defaults), 2);
        assert_eq!(resolve_threshold(1 << 20, &defaults), 2);
        assert_eq!(resolve_threshold(16 << 20, &defaults), 4);
        assert_eq!(resolve_threshold(1 << 30, &defaults), 10);

        let pinned = CompressOptions { threshold: Some(7), ..Default::default() };
        assert_eq!(resolve_threshold(1 << 30, &pinned), 7);
        let low = CompressOptions { threshold: Some(0), ..Default::default() };
        assert_eq!(resolve_threshold(0, &low), 2);
    }
}
