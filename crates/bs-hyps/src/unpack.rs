use bs_tensor::{Shape, Tensor};
use tracing::warn;

use crate::error::CodecError;
use crate::hypothesis::Hypothesis;

/// A record in a batch that failed to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Position of the record in the input batch.
    pub index: usize,
    pub error: CodecError,
}

/// Parallel arrays decoded from a batch of hypothesis records.
#[derive(Debug, Clone)]
pub struct UnpackedBatch {
    /// Token ids, `[num_records][max_seq_length]`, zero padded.
    pub ids: Tensor<u32>,
    /// Unpadded length of each record, capped at `max_seq_length`.
    pub lengths: Vec<usize>,
    /// Normalized score when present, otherwise the sum of per-step scores.
    pub scores: Vec<f32>,
    /// Records that failed to decode. Their rows are left zeroed.
    pub failures: Vec<RecordFailure>,
}

impl UnpackedBatch {
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// The unpadded ids of record `i`.
    pub fn ids_of(&self, i: usize) -> &[u32] {
        &self.ids.row(i)[..self.lengths[i]]
    }
}

/// Decode a flat batch of records into `ids`, `lengths` and `scores`.
///
/// Sequences longer than `max_seq_length` keep their first `max_seq_length`
/// ids. Empty records decode to a zero row with length 0 and score 0. A
/// malformed record does not affect its siblings; it is reported in
/// `failures` and its row stays zeroed.
pub fn unpack<R: AsRef<[u8]>>(records: &[R], max_seq_length: usize) -> UnpackedBatch {
    let n = records.len();
    let mut ids: Tensor<u32> = Tensor::zeros(Shape::new(vec![n, max_seq_length]));
    let mut lengths = vec![0usize; n];
    let mut scores = vec![0.0f32; n];
    let mut failures = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let hyp = match Hypothesis::decode(record.as_ref()) {
            Ok(h) => h,
            Err(error) => {
                warn!(index = i, %error, "skipping malformed hypothesis record");
                failures.push(RecordFailure { index: i, error });
                continue;
            }
        };

        let len = hyp.ids.len().min(max_seq_length);
        ids.row_mut(i)[..len].copy_from_slice(&hyp.ids[..len]);
        lengths[i] = len;
        scores[i] = hyp.reported_score();
    }

    UnpackedBatch {
        ids,
        lengths,
        scores,
        failures,
    }
}
