use std::io::Read;

use crate::error::{CodecError, Result};
use crate::hypothesis::{AttentionVector, Hypothesis};

/// Flag byte values for the optional normalized score.
const NORM_ABSENT: u8 = 0;
const NORM_PRESENT: u8 = 1;

impl Hypothesis {
    /// Encode the hypothesis into its binary record.
    ///
    /// Record layout (all little-endian):
    ///   - u32: beam id
    ///   - u32 n, then n x u32: token ids
    ///   - u32 n, then n x f32: per-step scores
    ///   - u32 n, then n x (u32 m, m x f32): attention vectors
    ///   - u8 flag (0 or 1), then f32 normalized score when the flag is 1
    ///
    /// The empty hypothesis encodes to an empty buffer.
    pub fn encode(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }

        let atten_bytes: usize = self.atten_vecs.iter().map(|v| 4 + 4 * v.probs.len()).sum();
        let mut out = Vec::with_capacity(
            16 + 4 * self.ids.len() + 4 * self.scores.len() + atten_bytes + 5,
        );

        out.extend_from_slice(&self.beam_id.to_le_bytes());

        write_len(&mut out, self.ids.len());
        for id in &self.ids {
            out.extend_from_slice(&id.to_le_bytes());
        }

        write_len(&mut out, self.scores.len());
        for score in &self.scores {
            out.extend_from_slice(&score.to_le_bytes());
        }

        write_len(&mut out, self.atten_vecs.len());
        for vec in &self.atten_vecs {
            write_len(&mut out, vec.probs.len());
            for p in &vec.probs {
                out.extend_from_slice(&p.to_le_bytes());
            }
        }

        match self.normalized_score {
            Some(score) => {
                out.push(NORM_PRESENT);
                out.extend_from_slice(&score.to_le_bytes());
            }
            None => out.push(NORM_ABSENT),
        }
        out
    }

    /// Decode a binary record produced by [`Hypothesis::encode`].
    ///
    /// An empty buffer decodes to the empty hypothesis. Truncated input,
    /// counts larger than the remaining bytes, an unknown flag byte, or
    /// trailing bytes are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Hypothesis> {
        if bytes.is_empty() {
            return Ok(Hypothesis::default());
        }
        let mut input = bytes;

        let beam_id = read_u32(&mut input, "beam_id")?;

        let n_ids = read_count(&mut input, "ids", 4)?;
        let mut ids = Vec::with_capacity(n_ids);
        for _ in 0..n_ids {
            ids.push(read_u32(&mut input, "ids")?);
        }

        let n_scores = read_count(&mut input, "scores", 4)?;
        let mut scores = Vec::with_capacity(n_scores);
        for _ in 0..n_scores {
            scores.push(read_f32(&mut input, "scores")?);
        }

        let n_vecs = read_count(&mut input, "atten_vecs", 4)?;
        let mut atten_vecs = Vec::with_capacity(n_vecs);
        for _ in 0..n_vecs {
            let width = read_count(&mut input, "atten_vecs.probs", 4)?;
            let mut probs = Vec::with_capacity(width);
            for _ in 0..width {
                probs.push(read_f32(&mut input, "atten_vecs.probs")?);
            }
            atten_vecs.push(AttentionVector::new(probs));
        }

        let mut flag = [0u8; 1];
        input
            .read_exact(&mut flag)
            .map_err(|_| CodecError::Truncated { field: "normalized_score" })?;
        let normalized_score = match flag[0] {
            NORM_ABSENT => None,
            NORM_PRESENT => Some(read_f32(&mut input, "normalized_score")?),
            other => return Err(CodecError::InvalidFlag(other)),
        };

        if !input.is_empty() {
            return Err(CodecError::TrailingBytes(input.len()));
        }

        Ok(Hypothesis {
            beam_id,
            ids,
            scores,
            atten_vecs,
            normalized_score,
        })
    }
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    // Path lengths and attention widths are far below u32::MAX.
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn read_u32(input: &mut &[u8], field: &'static str) -> Result<u32> {
    let mut buf4 = [0u8; 4];
    input
        .read_exact(&mut buf4)
        .map_err(|_| CodecError::Truncated { field })?;
    Ok(u32::from_le_bytes(buf4))
}

fn read_f32(input: &mut &[u8], field: &'static str) -> Result<f32> {
    let mut buf4 = [0u8; 4];
    input
        .read_exact(&mut buf4)
        .map_err(|_| CodecError::Truncated { field })?;
    Ok(f32::from_le_bytes(buf4))
}

/// Read an element count and check it against the bytes left, so a corrupt
/// prefix cannot trigger a huge allocation.
fn read_count(input: &mut &[u8], field: &'static str, min_elem_bytes: usize) -> Result<usize> {
    let count = read_u32(input, field)? as usize;
    if count.saturating_mul(min_elem_bytes) > input.len() {
        return Err(CodecError::LengthOverflow {
            field,
            count,
            remaining: input.len(),
        });
    }
    Ok(count)
}
