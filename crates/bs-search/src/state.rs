use bs_hyps::{AttentionVector, Hypothesis};
use bs_tensor::{Shape, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Initial best score of every beam: lower than any real cumulative score.
pub const MIN_SCORE: f32 = -1e36;

/// Sizing of one batched decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDims {
    /// Number of independent beams.
    pub num_beams: usize,
    /// Hypothesis slots per beam.
    pub hyps_per_beam: usize,
    /// Maximum number of decode steps.
    pub seq_len: usize,
    /// Width of each probability row.
    pub vocab_size: usize,
    /// Width of each attention vector (may be 0).
    pub attn_dim: usize,
}

impl SearchDims {
    /// Total number of hypothesis slots.
    pub fn hyp_size(&self) -> usize {
        self.num_beams * self.hyps_per_beam
    }

    /// Beam that owns `slot`. Slots are laid out contiguously per beam.
    pub fn beam_of(&self, slot: usize) -> usize {
        slot / self.hyps_per_beam
    }

    /// Slot range owned by `beam`.
    pub fn slots_of(&self, beam: usize) -> std::ops::Range<usize> {
        beam * self.hyps_per_beam..(beam + 1) * self.hyps_per_beam
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_beams == 0 {
            return Err(SearchError::InvalidDims("num_beams must be positive".to_string()));
        }
        if self.hyps_per_beam == 0 {
            return Err(SearchError::InvalidDims("hyps_per_beam must be positive".to_string()));
        }
        if self.seq_len == 0 {
            return Err(SearchError::InvalidDims("seq_len must be positive".to_string()));
        }
        if self.vocab_size == 0 {
            return Err(SearchError::InvalidDims("vocab_size must be positive".to_string()));
        }
        if self.vocab_size > u32::MAX as usize || self.hyp_size() > u32::MAX as usize {
            return Err(SearchError::InvalidDims(
                "vocab_size and hyp_size must fit in u32".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-beam stopping state. The only transition is `Active -> Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeamStatus {
    #[default]
    Active,
    Exhausted,
}

impl BeamStatus {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, BeamStatus::Exhausted)
    }

    /// Latch the beam as exhausted. Never reverts.
    pub fn latch(&mut self) {
        *self = BeamStatus::Exhausted;
    }
}

/// All mutable state of one batched decode.
///
/// History is stored as flat `[step][slot]` grids. A hypothesis is the index
/// path obtained by following `backpointers` from a slot at some step back to
/// step 0. Cells for steps that have not run yet hold zeros (empty buffers
/// for `done_hyps`).
#[derive(Debug, Clone)]
pub struct SearchState {
    pub(crate) dims: SearchDims,
    pub(crate) best_scores: Vec<f32>,
    pub(crate) cumulative_scores: Vec<f32>,
    pub(crate) live: Vec<bool>,
    pub(crate) scores: Tensor<f32>,
    pub(crate) ids: Tensor<u32>,
    pub(crate) backpointers: Tensor<u32>,
    pub(crate) attention: Tensor<f32>,
    pub(crate) done_hyps: Tensor<Vec<u8>>,
    pub(crate) terminated_counts: Vec<usize>,
    pub(crate) beam_status: Vec<BeamStatus>,
    pub(crate) next_step: usize,
}

impl SearchState {
    /// Allocate the state for a decode of the given size.
    ///
    /// Best scores start at [`MIN_SCORE`]. Only the first slot of each beam
    /// is live: every slot shares the same empty prefix, and expanding more
    /// than one of them would fill the beam with duplicates.
    pub fn new(dims: SearchDims) -> Result<Self> {
        dims.validate()?;
        let hyp_size = dims.hyp_size();
        let grid = Shape::new(vec![dims.seq_len, hyp_size]);

        let mut live = vec![false; hyp_size];
        for beam in 0..dims.num_beams {
            live[beam * dims.hyps_per_beam] = true;
        }

        Ok(SearchState {
            dims,
            best_scores: vec![MIN_SCORE; dims.num_beams],
            cumulative_scores: vec![0.0; hyp_size],
            live,
            scores: Tensor::zeros(grid.clone()),
            ids: Tensor::zeros(grid.clone()),
            backpointers: Tensor::zeros(grid.clone()),
            attention: Tensor::zeros(Shape::new(vec![dims.seq_len, hyp_size, dims.attn_dim])),
            done_hyps: Tensor::zeros(grid),
            terminated_counts: vec![0; dims.num_beams],
            beam_status: vec![BeamStatus::Active; dims.num_beams],
            next_step: 0,
        })
    }

    /// Replace the initial best scores (one per beam).
    pub fn with_best_scores(mut self, best_scores: Vec<f32>) -> Result<Self> {
        if best_scores.len() != self.dims.num_beams {
            return Err(SearchError::InvalidDims(format!(
                "expected {} initial best scores, got {}",
                self.dims.num_beams,
                best_scores.len()
            )));
        }
        self.best_scores = best_scores;
        Ok(self)
    }

    pub fn dims(&self) -> &SearchDims {
        &self.dims
    }

    /// Best terminated cumulative score per beam.
    pub fn best_scores(&self) -> &[f32] {
        &self.best_scores
    }

    /// Running cumulative score per slot. Dropped slots hold `-inf`.
    pub fn cumulative_scores(&self) -> &[f32] {
        &self.cumulative_scores
    }

    /// Whether each slot currently holds a hypothesis that will be expanded.
    pub fn live_slots(&self) -> &[bool] {
        &self.live
    }

    /// Per-step marginal scores, `[seq_len][hyp_size]`.
    pub fn scores(&self) -> &Tensor<f32> {
        &self.scores
    }

    /// Per-step chosen token ids, `[seq_len][hyp_size]`.
    pub fn ids(&self) -> &Tensor<u32> {
        &self.ids
    }

    /// Per-step backpointers into the previous step's slots.
    pub fn backpointers(&self) -> &Tensor<u32> {
        &self.backpointers
    }

    /// Per-step attention history, `[seq_len][hyp_size][attn_dim]`.
    pub fn attention(&self) -> &Tensor<f32> {
        &self.attention
    }

    /// Encoded terminated hypotheses, `[seq_len][hyp_size]`.
    pub fn done_hyps(&self) -> &Tensor<Vec<u8>> {
        &self.done_hyps
    }

    /// Number of terminated hypotheses recorded per beam so far.
    pub fn terminated_counts(&self) -> &[usize] {
        &self.terminated_counts
    }

    pub fn beam_status(&self) -> &[BeamStatus] {
        &self.beam_status
    }

    /// The step the next kernel invocation must process.
    pub fn next_step(&self) -> usize {
        self.next_step
    }

    /// Attention vector recorded at `(step, slot)`.
    ///
    /// # Panics
    /// Panics if `step >= seq_len` or `slot >= hyp_size`.
    pub fn attention_at(&self, step: usize, slot: usize) -> &[f32] {
        let width = self.dims.attn_dim;
        &self.attention.row(step)[slot * width..(slot + 1) * width]
    }

    /// Slots visited by the hypothesis held at `(last_step, slot)`, indexed by
    /// step `0..=last_step`.
    ///
    /// # Panics
    /// Panics if `last_step >= seq_len` or `slot >= hyp_size`.
    pub fn trace_path(&self, last_step: usize, slot: usize) -> Vec<usize> {
        let mut path = vec![0usize; last_step + 1];
        let mut current = slot;
        for step in (0..=last_step).rev() {
            path[step] = current;
            current = self.backpointers.row(step)[current] as usize;
        }
        path
    }

    /// Build the terminated hypothesis for `src` (live at the end of step
    /// `step - 1`) extended with EOS at `step`.
    pub(crate) fn terminated_hypothesis(
        &self,
        src: usize,
        step: usize,
        eos_id: u32,
        eos_score: f32,
        eos_attention: &[f32],
    ) -> Hypothesis {
        let mut ids = Vec::with_capacity(step + 1);
        let mut scores = Vec::with_capacity(step + 1);
        let mut atten_vecs = Vec::with_capacity(step + 1);

        if step > 0 {
            for (t, &slot) in self.trace_path(step - 1, src).iter().enumerate() {
                ids.push(self.ids.row(t)[slot]);
                scores.push(self.scores.row(t)[slot]);
                atten_vecs.push(AttentionVector::from(self.attention_at(t, slot)));
            }
        }
        ids.push(eos_id);
        scores.push(eos_score);
        atten_vecs.push(AttentionVector::from(eos_attention));

        Hypothesis {
            beam_id: self.dims.beam_of(src) as u32,
            ids,
            scores,
            atten_vecs,
            normalized_score: None,
        }
    }
}
