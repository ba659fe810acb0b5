//! Ordered reassembly of out-of-order chunk results.
//!
//! Chunks complete in any order. The sink buffers early arrivals keyed by
//! start offset and releases bytes strictly in offset order, each byte
//! exactly once. The first failure poisons the sink: buffered chunks are
//! dropped and later results are refused.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;

use super::chunk::ChunkResult;
use super::range::ByteRange;
use crate::error::{TransferError, TransferResult};

/// Reorders chunk payloads into a contiguous byte sequence.
#[derive(Debug)]
pub struct ReassemblySink {
    /// Out-of-order payloads by start offset.
    pending: BTreeMap<u64, Bytes>,
    pending_bytes: u64,
    /// In-order payloads not yet drained.
    ready: VecDeque<Bytes>,
    /// Next offset due for output.
    next_offset: u64,
    /// One past the last byte.
    end_offset: u64,
    failure: Option<TransferError>,
}

impl ReassemblySink {
    /// Sink for `len` bytes starting at absolute offset `start`.
    pub fn new(start: u64, len: u64) -> Self {
        Self {
            pending: BTreeMap::new(),
            pending_bytes: 0,
            ready: VecDeque::new(),
            next_offset: start,
            end_offset: start.saturating_add(len),
            failure: None,
        }
    }

    /// Sink for a whole object of `total_size` bytes.
    pub fn for_object(total_size: u64) -> Self {
        Self::new(0, total_size)
    }

    /// Sink for `range`.
    pub fn for_range(range: ByteRange) -> Self {
        Self::new(range.start(), range.len())
    }

    /// Take one chunk result.
    ///
    /// Returns how many payloads became ready for [`drain`](Self::drain).
    /// A failed result, a payload whose length disagrees with its
    /// descriptor, or a chunk that overlaps bytes already accepted poisons
    /// the sink and returns the error.
    pub fn accept(&mut self, result: ChunkResult) -> TransferResult<usize> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let descriptor = result.descriptor;
        let payload = match result.outcome {
            Ok(payload) => payload,
            Err(error) => return Err(self.poison(error)),
        };

        if payload.len() as u64 != descriptor.size() {
            return Err(self.poison(TransferError::TerminalStore(format!(
                "chunk {} returned {} bytes, expected {}",
                descriptor.index,
                payload.len(),
                descriptor.size()
            ))));
        }
        if descriptor.start < self.next_offset
            || descriptor.end_exclusive() > self.end_offset
            || self.pending.contains_key(&descriptor.start)
        {
            return Err(self.poison(TransferError::InvalidArgument(format!(
                "chunk {} at offset {} is a duplicate or outside the transfer",
                descriptor.index, descriptor.start
            ))));
        }

        self.pending_bytes += descriptor.size();
        self.pending.insert(descriptor.start, payload);

        let mut released = 0;
        while let Some(payload) = self.pending.remove(&self.next_offset) {
            let len = payload.len() as u64;
            self.pending_bytes -= len;
            self.next_offset += len;
            self.ready.push_back(payload);
            released += 1;
        }
        Ok(released)
    }

    fn poison(&mut self, error: TransferError) -> TransferError {
        self.pending.clear();
        self.pending_bytes = 0;
        self.failure = Some(error.clone());
        error
    }

    /// Take payloads that are ready, in offset order.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.ready.drain(..).collect()
    }

    /// Returns true once every byte has been released.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.next_offset == self.end_offset
    }

    /// Next offset due for output.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Chunks waiting for an earlier chunk.
    pub fn buffered_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Bytes waiting for an earlier chunk.
    pub fn buffered_bytes(&self) -> u64 {
        self.pending_bytes
    }

    /// The error that poisoned the sink, if any.
    pub fn failure(&self) -> Option<&TransferError> {
        self.failure.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::chunk::{self, ChunkDescriptor};
    use rand::seq::SliceRandom;

    fn object(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn result_for(data: &[u8], d: ChunkDescriptor) -> ChunkResult {
        let bytes = Bytes::copy_from_slice(&data[d.start as usize..=d.end as usize]);
        ChunkResult::success(d, bytes, 1)
    }

    fn feed(sink: &mut ReassemblySink, data: &[u8], order: &[ChunkDescriptor]) -> Vec<u8> {
        let mut out = Vec::new();
        for d in order {
            sink.accept(result_for(data, *d)).unwrap();
            for payload in sink.drain() {
                out.extend_from_slice(&payload);
            }
        }
        out
    }

    #[test]
    fn test_in_order_passes_straight_through() {
        let data = object(95);
        let chunks = chunk::plan(95, 10).unwrap();
        let mut sink = ReassemblySink::for_object(95);

        let out = feed(&mut sink, &data, &chunks);

        assert_eq!(out, data);
        assert!(sink.is_complete());
        assert_eq!(sink.buffered_chunks(), 0);
    }

    #[test]
    fn test_reverse_order_buffers_until_first_arrives() {
        let data = object(50);
        let chunks = chunk::plan(50, 10).unwrap();
        let mut sink = ReassemblySink::for_object(50);

        for d in chunks.iter().skip(1).rev() {
            assert_eq!(sink.accept(result_for(&data, *d)).unwrap(), 0);
        }
        assert_eq!(sink.buffered_chunks(), 4);
        assert_eq!(sink.buffered_bytes(), 40);
        assert!(sink.drain().is_empty());

        assert_eq!(sink.accept(result_for(&data, chunks[0])).unwrap(), 5);
        let out: Vec<u8> = sink.drain().concat();
        assert_eq!(out, data);
        assert!(sink.is_complete());
    }

    #[test]
    fn test_shuffled_order_reassembles() {
        let data = object(1_003);
        let mut chunks = chunk::plan(1_003, 17).unwrap();
        chunks.shuffle(&mut rand::rng());

        let mut sink = ReassemblySink::for_object(1_003);
        let out = feed(&mut sink, &data, &chunks);

        assert_eq!(out, data);
        assert!(sink.is_complete());
    }

    #[test]
    fn test_sub_range_uses_absolute_offsets() {
        let data = object(100);
        let range = ByteRange::new(20, 64, 100).unwrap();
        let chunks = chunk::plan_range(range, 10).unwrap();
        let mut sink = ReassemblySink::for_range(range);

        let out = feed(&mut sink, &data, &chunks);

        assert_eq!(out, &data[20..=64]);
        assert_eq!(sink.next_offset(), 65);
        assert!(sink.is_complete());
    }

    #[test]
    fn test_failure_discards_buffer_and_refuses_more() {
        let data = object(30);
        let chunks = chunk::plan(30, 10).unwrap();
        let mut sink = ReassemblySink::for_object(30);

        sink.accept(result_for(&data, chunks[2])).unwrap();
        assert_eq!(sink.buffered_chunks(), 1);

        let err = sink
            .accept(ChunkResult::failure(
                chunks[1],
                TransferError::TerminalStore("gone".into()),
                3,
            ))
            .unwrap_err();
        assert_eq!(err, TransferError::TerminalStore("gone".into()));
        assert_eq!(sink.buffered_chunks(), 0);
        assert!(!sink.is_complete());

        let again = sink.accept(result_for(&data, chunks[0])).unwrap_err();
        assert_eq!(again, err);
        assert_eq!(sink.failure(), Some(&err));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut sink = ReassemblySink::for_object(20);
        let d = ChunkDescriptor::new(0, 0, 9);
        let err = sink
            .accept(ChunkResult::success(d, Bytes::from_static(b"short"), 1))
            .unwrap_err();
        assert!(matches!(err, TransferError::TerminalStore(_)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let data = object(20);
        let chunks = chunk::plan(20, 10).unwrap();

        let mut sink = ReassemblySink::for_object(20);
        sink.accept(result_for(&data, chunks[1])).unwrap();
        assert!(sink.accept(result_for(&data, chunks[1])).is_err());

        let mut sink = ReassemblySink::for_object(20);
        sink.accept(result_for(&data, chunks[0])).unwrap();
        assert!(sink.accept(result_for(&data, chunks[0])).is_err());
    }

    #[test]
    fn test_empty_sink_is_complete() {
        let sink = ReassemblySink::for_object(0);
        assert!(sink.is_complete());
    }
}
