//! Resumable chunked rendering (spec §4.J): splits the sample range
//! `[0, total_samples)` into `num_chunks` roughly-even pieces so that
//! multiple cooperating processes can each own one chunk of the same
//! frame.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("num_chunks must be at least 1, got {0}")]
    ZeroChunks(u32),
    #[error("chunk_index {chunk_index} is out of range for num_chunks {num_chunks}")]
    ChunkIndexOutOfRange { chunk_index: u32, num_chunks: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumableChunk {
    pub num_chunks: u32,
    pub chunk_index: u32,
}

impl ResumableChunk {
    pub fn new(num_chunks: u32, chunk_index: u32) -> Result<Self, ChunkError> {
        if num_chunks == 0 {
            return Err(ChunkError::ZeroChunks(num_chunks));
        }
        if chunk_index >= num_chunks {
            return Err(ChunkError::ChunkIndexOutOfRange {
                chunk_index,
                num_chunks,
            });
        }
        Ok(ResumableChunk {
            num_chunks,
            chunk_index,
        })
    }

    /// The `(start, count)` sample sub-range this chunk owns out of
    /// `total_samples`. Chunks are sized `total / num_chunks`, with the
    /// first `total % num_chunks` chunks getting one extra sample so the
    /// whole range is covered exactly once.
    ///
    /// Open question resolved: when `start + count` would overshoot
    /// `total_samples` the range clamps to `total_samples - start`
    /// (not `total_samples - count`), so the final chunk always ends
    /// exactly at `total_samples` rather than short or past it.
    pub fn sample_range(&self, total_samples: u32) -> (u32, u32) {
        if total_samples == 0 {
            return (0, 0);
        }
        let base = total_samples / self.num_chunks;
        let remainder = total_samples % self.num_chunks;
        let start = self.chunk_index * base + self.chunk_index.min(remainder);
        let mut count = base + u32::from(self.chunk_index < remainder);
        if start.saturating_add(count) > total_samples {
            count = total_samples.saturating_sub(start);
        }
        (start, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_partition_the_full_range_exactly() {
        let total = 17;
        let num_chunks = 5;
        let mut covered = 0u32;
        for i in 0..num_chunks {
            let chunk = ResumableChunk::new(num_chunks, i).unwrap();
            let (start, count) = chunk.sample_range(total);
            assert_eq!(start, covered);
            covered += count;
        }
        assert_eq!(covered, total);
    }

    #[test]
    fn single_chunk_covers_everything() {
        let chunk = ResumableChunk::new(1, 0).unwrap();
        assert_eq!(chunk.sample_range(100), (0, 100));
    }

    #[test]
    fn more_chunks_than_samples_leaves_trailing_chunks_empty() {
        let total = 3;
        let num_chunks = 8;
        let mut covered = 0u32;
        for i in 0..num_chunks {
            let chunk = ResumableChunk::new(num_chunks, i).unwrap();
            let (start, count) = chunk.sample_range(total);
            assert!(start <= total);
            assert!(start + count <= total);
            covered += count;
        }
        assert_eq!(covered, total);
    }

    #[test]
    fn rejects_zero_chunks() {
        assert_eq!(ResumableChunk::new(0, 0), Err(ChunkError::ZeroChunks(0)));
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert_eq!(
            ResumableChunk::new(4, 4),
            Err(ChunkError::ChunkIndexOutOfRange {
                chunk_index: 4,
                num_chunks: 4
            })
        );
    }
}
