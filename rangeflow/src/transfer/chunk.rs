//! Chunk descriptors, results and the chunk planner.

use bytes::Bytes;

use super::range::ByteRange;
use crate::error::{TransferError, TransferResult};

/// Upper bound on descriptors in one plan.
pub const MAX_CHUNKS: u64 = 1 << 20;

/// One contiguous, inclusive byte span of an object.
///
/// Produced once by the planner and never mutated. Offsets are absolute
/// positions in the object, also when the job covers only a sub-range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    /// 0-based position in the plan.
    pub index: usize,
    /// First byte of the chunk.
    pub start: u64,
    /// Last byte of the chunk (inclusive).
    pub end: u64,
}

impl ChunkDescriptor {
    /// Create a descriptor. `start` must not exceed `end`.
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "chunk start past end");
        Self { index, start, end }
    }

    /// Number of bytes covered.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Offset one past the last byte.
    pub fn end_exclusive(&self) -> u64 {
        self.end + 1
    }
}

/// Outcome of one descriptor, handed from a worker to its consumer.
///
/// The pool produces exactly one result per descriptor. For downloads the
/// output is the chunk payload; uploads carry a receipt instead.
#[derive(Debug)]
pub struct ChunkResult<T = Bytes> {
    /// The descriptor this result belongs to.
    pub descriptor: ChunkDescriptor,
    /// Payload or the terminal error for this chunk.
    pub outcome: TransferResult<T>,
    /// Attempts made; 0 if the chunk was never dispatched.
    pub attempts: u32,
}

impl<T> ChunkResult<T> {
    /// A successful result.
    pub fn success(descriptor: ChunkDescriptor, output: T, attempts: u32) -> Self {
        Self {
            descriptor,
            outcome: Ok(output),
            attempts,
        }
    }

    /// A failed result.
    pub fn failure(descriptor: ChunkDescriptor, error: TransferError, attempts: u32) -> Self {
        Self {
            descriptor,
            outcome: Err(error),
            attempts,
        }
    }

    /// Index of the chunk.
    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    /// Start offset of the chunk.
    pub fn start(&self) -> u64 {
        self.descriptor.start
    }

    /// Returns true if the chunk succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Plan chunks covering `[0, total_size)`.
///
/// Returns `ceil(total_size / chunk_size)` descriptors; every chunk is
/// `chunk_size` bytes except possibly the last, which is never empty.
/// A zero-sized object yields an empty plan.
pub fn plan(total_size: u64, chunk_size: u64) -> TransferResult<Vec<ChunkDescriptor>> {
    plan_span(0, total_size, chunk_size)
}

/// Plan chunks covering exactly `range`, with absolute offsets.
pub fn plan_range(range: ByteRange, chunk_size: u64) -> TransferResult<Vec<ChunkDescriptor>> {
    plan_span(range.start(), range.len(), chunk_size)
}

fn plan_span(base: u64, len: u64, chunk_size: u64) -> TransferResult<Vec<ChunkDescriptor>> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidArgument(
            "chunk size must be at least 1 byte".to_string(),
        ));
    }
    if base.checked_add(len).is_none() {
        return Err(TransferError::InvalidArgument(format!(
            "span of {} bytes at offset {} overflows",
            len, base
        )));
    }

    let count = len.div_ceil(chunk_size);
    if count > MAX_CHUNKS {
        return Err(TransferError::InvalidArgument(format!(
            "{} bytes in {} byte chunks needs {} chunks (limit {})",
            len, chunk_size, count, MAX_CHUNKS
        )));
    }
    let count = usize::try_from(count).map_err(|_| {
        TransferError::InvalidArgument(format!("{} bytes needs too many chunks", len))
    })?;

    let chunks = (0..count)
        .map(|index| {
            let offset = index as u64 * chunk_size;
            let size = chunk_size.min(len - offset);
            ChunkDescriptor::new(index, base + offset, base + offset + size - 1)
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_has_no_chunks() {
        assert!(plan(0, 5).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            plan(10, 0),
            Err(TransferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_exact_multiple_is_one_chunk() {
        let chunks = plan(1024, 1024).unwrap();
        assert_eq!(chunks, vec![ChunkDescriptor::new(0, 0, 1023)]);
    }

    #[test]
    fn test_one_byte_over_gives_tail_chunk() {
        let chunks = plan(1025, 1024).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], ChunkDescriptor::new(1, 1024, 1024));
        assert_eq!(chunks[1].size(), 1);
    }

    #[test]
    fn test_twenty_three_megabytes_in_five_megabyte_chunks() {
        let chunks = plan(23_000_000, 5_000_000).unwrap();

        let sizes: Vec<u64> = chunks.iter().map(|c| c.size()).collect();
        let offsets: Vec<u64> = chunks.iter().map(|c| c.start).collect();

        assert_eq!(
            sizes,
            vec![5_000_000, 5_000_000, 5_000_000, 5_000_000, 3_000_000]
        );
        assert_eq!(
            offsets,
            vec![0, 5_000_000, 10_000_000, 15_000_000, 20_000_000]
        );
    }

    #[test]
    fn test_chunk_count_is_capped() {
        let err = plan(1 << 40, 1).unwrap_err();
        assert!(matches!(err, TransferError::InvalidArgument(ref msg) if msg.contains("limit")));

        assert_eq!(plan(MAX_CHUNKS, 1).unwrap().len() as u64, MAX_CHUNKS);
        assert!(plan(MAX_CHUNKS + 1, 1).is_err());
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan(12_345, 100).unwrap(), plan(12_345, 100).unwrap());
    }

    #[test]
    fn test_plan_range_uses_absolute_offsets() {
        let range = ByteRange::new(1000, 1999, 10_000).unwrap();
        let chunks = plan_range(range, 5 * 1024 * 1024).unwrap();

        assert_eq!(chunks, vec![ChunkDescriptor::new(0, 1000, 1999)]);
        assert_eq!(chunks[0].size(), 1000);
    }

    #[test]
    fn test_plan_range_splits_sub_range() {
        let range = ByteRange::new(10, 34, 100).unwrap();
        let chunks = plan_range(range, 10).unwrap();

        assert_eq!(
            chunks,
            vec![
                ChunkDescriptor::new(0, 10, 19),
                ChunkDescriptor::new(1, 20, 29),
                ChunkDescriptor::new(2, 30, 34),
            ]
        );
    }

    #[test]
    fn test_chunk_result_accessors() {
        let desc = ChunkDescriptor::new(3, 30, 39);
        let ok = ChunkResult::success(desc, Bytes::from_static(b"x"), 1);
        assert!(ok.is_ok());
        assert_eq!(ok.index(), 3);
        assert_eq!(ok.start(), 30);

        let err: ChunkResult = ChunkResult::failure(desc, TransferError::Cancelled, 0);
        assert!(!err.is_ok());
        assert_eq!(err.attempts, 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_plan_covers_object_exactly(
                total in 0u64..200_000,
                chunk in 1u64..20_000,
            ) {
                let chunks = plan(total, chunk)?;

                prop_assert_eq!(chunks.len() as u64, total.div_ceil(chunk));

                let mut next = 0u64;
                for (i, c) in chunks.iter().enumerate() {
                    prop_assert_eq!(c.index, i);
                    prop_assert_eq!(c.start, next);
                    prop_assert!(c.size() >= 1);
                    prop_assert!(c.size() <= chunk);
                    next = c.end_exclusive();
                }
                prop_assert_eq!(next, total);
            }

            #[test]
            fn test_plan_range_covers_range_exactly(
                total in 1u64..100_000,
                a in 0u64..100_000,
                b in 0u64..100_000,
                chunk in 1u64..5_000,
            ) {
                let start = a % total;
                let end = start.max(b % total);
                let range = ByteRange::new(start, end, total)?;
                let chunks = plan_range(range, chunk)?;

                prop_assert_eq!(chunks.first().map(|c| c.start), Some(start));
                prop_assert_eq!(chunks.last().map(|c| c.end), Some(end));
                for pair in chunks.windows(2) {
                    prop_assert_eq!(pair[1].start, pair[0].end + 1);
                }
                let covered: u64 = chunks.iter().map(|c| c.size()).sum();
                prop_assert_eq!(covered, end - start + 1);
            }
        }
    }
}
