//! Deterministic input splitting.
//!
//! The split runs on the managing peer before dispatch. Every input byte
//! lands in exactly one chunk, chunk indices are dense from zero, and the
//! same input with the same config always yields the same chunks.

use crate::job::{Chunk, JobConfig, SplitStrategy};
use weft_common::{CommonError, JobId};

/// Split `input` into chunks according to the job's configured strategy.
pub fn split_input(
    job_id: JobId,
    input: &[u8],
    config: &JobConfig,
) -> Result<Vec<Chunk>, CommonError> {
    match config.split {
        SplitStrategy::WholeInput => Ok(vec![Chunk {
            job_id,
            index: 0,
            bytes: input.to_vec(),
        }]),
        SplitStrategy::FixedChunk => split_fixed(job_id, input, config.max_chunk_bytes),
        SplitStrategy::RowBased => {
            split_rows(job_id, input, config.min_chunk_bytes, config.max_chunk_bytes)
        }
    }
}

fn split_fixed(job_id: JobId, input: &[u8], chunk_bytes: usize) -> Result<Vec<Chunk>, CommonError> {
    if input.is_empty() {
        return Err(CommonError::BadManifest(
            "fixed-chunk splitting requires non-empty input".to_string(),
        ));
    }
    let chunks = input
        .chunks(chunk_bytes)
        .enumerate()
        .map(|(i, window)| Chunk {
            job_id,
            index: i as u32,
            bytes: window.to_vec(),
        })
        .collect();
    Ok(chunks)
}

/// Rows are atomic: a newline terminator stays with its row, and a row
/// larger than `max_bytes` still becomes a single chunk. Rows coalesce
/// until a chunk reaches `min_bytes`, never exceeding `max_bytes` once the
/// chunk is non-empty.
fn split_rows(
    job_id: JobId,
    input: &[u8],
    min_bytes: usize,
    max_bytes: usize,
) -> Result<Vec<Chunk>, CommonError> {
    if input.is_empty() {
        return Err(CommonError::BadManifest(
            "row-based splitting requires non-empty input".to_string(),
        ));
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for row in rows_with_terminator(input) {
        if !current.is_empty() && current.len() + row.len() > max_bytes {
            push_chunk(&mut chunks, job_id, std::mem::take(&mut current));
        }
        current.extend_from_slice(row);
        if current.len() >= min_bytes {
            push_chunk(&mut chunks, job_id, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_chunk(&mut chunks, job_id, current);
    }
    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<Chunk>, job_id: JobId, bytes: Vec<u8>) {
    let index = chunks.len() as u32;
    chunks.push(Chunk {
        job_id,
        index,
        bytes,
    });
}

/// Iterate rows of `input`, each including its trailing newline if present.
fn rows_with_terminator(input: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut rest = input;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => rest.len(),
        };
        let (row, tail) = rest.split_at(end);
        rest = tail;
        Some(row)
    })
}
