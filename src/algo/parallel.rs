//! Chunked parallel loops.
//!
//! Every per-vertex pass in this crate has the same shape: split `[0, n)`
//! into contiguous chunks, process each chunk independently, and merge the
//! chunk's results into shared output with one lock acquisition per chunk.
//! Chunk count is `min(n, worker threads)`.
//!
//! Merge order depends on scheduling. Callers that need a stable order sort
//! afterwards or key the results.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;

/// Split `[0, len)` into contiguous chunks.
///
/// Produces `min(len, threads)` chunks of near-equal size; a nonzero
/// `min_chunk` caps the count so no chunk is shorter than that.
pub fn chunk_ranges(len: usize, min_chunk: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let mut chunks = len.min(rayon::current_num_threads().max(1));
    if min_chunk > 0 {
        chunks = chunks.min(len.div_ceil(min_chunk)).max(1);
    }

    let base = len / chunks;
    let extra = len % chunks;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    for c in 0..chunks {
        let size = base + usize::from(c < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Run `body` over every chunk of `[0, len)`.
///
/// With `parallel == false` chunks run in order on the calling thread.
pub fn parallel_for<F>(len: usize, min_chunk: usize, parallel: bool, body: F)
where
    F: Fn(Range<usize>) + Send + Sync,
{
    let ranges = chunk_ranges(len, min_chunk);
    if parallel {
        ranges.into_par_iter().for_each(body);
    } else {
        ranges.into_iter().for_each(body);
    }
}

/// Run `body` per chunk with a thread-local output buffer and gather all
/// buffers into one vector.
///
/// Each chunk's buffer is appended under a single lock acquisition.
pub fn parallel_collect<T, F>(len: usize, min_chunk: usize, parallel: bool, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>, &mut Vec<T>) + Send + Sync,
{
    let shared = Mutex::new(Vec::new());
    parallel_for(len, min_chunk, parallel, |range| {
        let mut local = Vec::new();
        body(range, &mut local);
        if !local.is_empty() {
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(&mut local);
        }
    });
    shared.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Map every index of `[0, len)` to a value, keeping index order.
///
/// Used for snapshot passes where each output slot depends only on the
/// previous buffer.
pub fn parallel_map<T, F>(len: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    if parallel {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_chunks_cover_range() {
        for len in [1, 2, 7, 64, 1001] {
            let ranges = chunk_ranges(len, 0);
            assert!(!ranges.is_empty());
            assert!(ranges.len() <= len);
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges.last().unwrap().end, len);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start, "chunks must be contiguous");
            }
        }
        assert!(chunk_ranges(0, 0).is_empty());
    }

    #[test]
    fn test_min_chunk_limits_count() {
        let ranges = chunk_ranges(10, 8);
        assert!(ranges.len() <= 2);
        assert_eq!(ranges.last().unwrap().end, 10);
    }

    #[test]
    fn test_parallel_for_visits_each_index_once() {
        let hits = AtomicUsize::new(0);
        parallel_for(500, 0, true, |range| {
            hits.fetch_add(range.len(), Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn test_parallel_collect_matches_sequential() {
        let body = |range: Range<usize>, out: &mut Vec<usize>| {
            out.extend(range.filter(|i| i % 3 == 0));
        };
        let mut par = parallel_collect(1000, 0, true, body);
        let seq = parallel_collect(1000, 0, false, body);
        par.sort_unstable();
        assert_eq!(par, seq);
        assert_eq!(seq.len(), 334);
    }

    #[test]
    fn test_parallel_map_keeps_order() {
        let squares = parallel_map(100, true, |i| i * i);
        assert_eq!(squares[9], 81);
        assert_eq!(squares.len(), 100);
    }
}
