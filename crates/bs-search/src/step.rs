use bs_tensor::Tensor;
use tracing::{debug, debug_span, trace, warn};

use crate::candidate::{select_top, Candidate};
use crate::error::{Result, SearchError};
use crate::options::StepOptions;
use crate::state::SearchState;
use crate::stopping::{StepOutcome, StoppingPolicy};

/// Model outputs for one decode step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Log-probabilities, `[hyp_size][vocab_size]`.
    pub probs: &'a Tensor<f32>,
    /// Attention vector of each slot's current hypothesis, `[hyp_size][attn_dim]`.
    pub attn: &'a Tensor<f32>,
}

impl<'a> StepInput<'a> {
    pub fn new(probs: &'a Tensor<f32>, attn: &'a Tensor<f32>) -> Self {
        Self { probs, attn }
    }
}

/// A termination admitted during the current step.
struct Termination {
    src: usize,
    eos_score: f32,
}

/// The single-step beam expansion and termination kernel.
///
/// Each call consumes the log-probabilities of step `t`, extends every live
/// hypothesis, records the hypotheses that terminate with EOS, and reports
/// whether the search can still improve.
#[derive(Debug, Clone)]
pub struct BeamSearchStep {
    options: StepOptions,
}

impl BeamSearchStep {
    pub fn new(options: StepOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &StepOptions {
        &self.options
    }

    /// Run step `t` against `state`.
    ///
    /// All inputs are validated before the state is touched: on error the
    /// state is unchanged.
    pub fn step(
        &self,
        state: &mut SearchState,
        input: &StepInput<'_>,
        t: usize,
    ) -> Result<StepOutcome> {
        self.validate(state, input, t)?;

        let _span = debug_span!("beam_search_step", step = t).entered();

        let dims = *state.dims();
        let hpb = dims.hyps_per_beam;
        let eos = self.options.eos_id as usize;
        let force_eos = self.options.force_eos_in_last_step && t + 1 == dims.seq_len;
        let freeze = self.options.variant.freezes_exhausted_beams();
        let policy = StoppingPolicy::new(&self.options, hpb);

        let mut next_cum = state.cumulative_scores.clone();
        let mut next_live = state.live.clone();
        let mut local_exhausted = vec![true; dims.num_beams];
        let mut nan_count = 0usize;

        for beam in 0..dims.num_beams {
            if freeze && state.beam_status[beam].is_exhausted() {
                continue;
            }
            let slots = dims.slots_of(beam);

            let mut candidates = Vec::with_capacity(hpb * dims.vocab_size);
            let mut terminations = Vec::new();
            for src in slots.clone() {
                if !state.live[src] {
                    continue;
                }
                let row = input.probs.row(src);
                let cum = state.cumulative_scores[src];
                let mut best_alternative = f32::NEG_INFINITY;
                for (id, &p) in row.iter().enumerate() {
                    if id == eos {
                        continue;
                    }
                    if p.is_nan() {
                        nan_count += 1;
                        continue;
                    }
                    best_alternative = best_alternative.max(p);
                    candidates.push(Candidate {
                        score: cum + p,
                        slot: src,
                        token: id as u32,
                    });
                }

                let eos_score = row[eos];
                if eos_score.is_nan() {
                    nan_count += 1;
                } else if self.admits_eos(eos_score, best_alternative, t, force_eos) {
                    terminations.push(Termination { src, eos_score });
                }
            }

            let survivors = select_top(candidates, hpb);

            // Records read history up to t - 1 only, so build them before
            // step t is written.
            let records: Vec<(usize, Vec<u8>)> = terminations
                .iter()
                .map(|term| {
                    let hyp = state.terminated_hypothesis(
                        term.src,
                        t,
                        self.options.eos_id,
                        term.eos_score,
                        input.attn.row(term.src),
                    );
                    trace!(beam, slot = term.src, eos_score = term.eos_score, hyp = %hyp, "terminated");
                    (term.src, hyp.encode())
                })
                .collect();

            for term in &terminations {
                let total = state.cumulative_scores[term.src] + term.eos_score;
                state.best_scores[beam] = state.best_scores[beam].max(total);
            }
            state.terminated_counts[beam] += records.len();
            for (src, record) in records {
                state.done_hyps.row_mut(t)[src] = record;
            }

            for slot in slots {
                next_live[slot] = false;
                next_cum[slot] = f32::NEG_INFINITY;
            }
            let width = dims.attn_dim;
            for (rank, c) in survivors.iter().enumerate() {
                let dst = beam * hpb + rank;
                let token = c.token as usize;
                state.ids.row_mut(t)[dst] = c.token;
                state.backpointers.row_mut(t)[dst] = c.slot as u32;
                state.scores.row_mut(t)[dst] = input.probs.row(c.slot)[token];
                state.attention.row_mut(t)[dst * width..(dst + 1) * width]
                    .copy_from_slice(input.attn.row(c.slot));
                next_cum[dst] = c.score;
                next_live[dst] = true;
            }

            local_exhausted[beam] = policy.beam_exhausted(
                state.best_scores[beam],
                survivors.iter().map(|c| c.score),
                state.terminated_counts[beam],
            );
            if local_exhausted[beam] && !state.beam_status[beam].is_exhausted() {
                debug!(beam, best_score = state.best_scores[beam], "beam exhausted");
            }
        }

        if nan_count > 0 {
            warn!(step = t, count = nan_count, "discarded NaN log-probabilities");
        }

        state.cumulative_scores = next_cum;
        state.live = next_live;
        state.next_step = t + 1;

        let outcome = policy.conclude(&local_exhausted, &mut state.beam_status);
        debug!(
            done = outcome.done,
            exhausted = outcome.beam_done.iter().filter(|&&d| d).count(),
            "step complete"
        );
        Ok(outcome)
    }

    fn admits_eos(&self, eos_score: f32, best_alternative: f32, t: usize, force_eos: bool) -> bool {
        if t == 0 && !self.options.allow_empty_terminated_hyp {
            return false;
        }
        if force_eos {
            return true;
        }
        eos_score > self.options.local_eos_threshold
            && eos_score >= best_alternative - self.options.valid_eos_max_logit_delta
    }

    fn validate(&self, state: &SearchState, input: &StepInput<'_>, t: usize) -> Result<()> {
        let dims = state.dims();
        if t >= dims.seq_len {
            return Err(SearchError::StepOutOfRange {
                step: t,
                seq_len: dims.seq_len,
            });
        }
        if t != state.next_step() {
            return Err(SearchError::StepOutOfOrder {
                expected: state.next_step(),
                got: t,
            });
        }
        input
            .probs
            .shape()
            .expect(&[dims.hyp_size(), dims.vocab_size])
            .map_err(SearchError::ProbsShape)?;
        input
            .attn
            .shape()
            .expect(&[dims.hyp_size(), dims.attn_dim])
            .map_err(SearchError::AttnShape)?;
        if self.options.eos_id as usize >= dims.vocab_size {
            return Err(SearchError::InvalidOption {
                name: "eos_id",
                reason: format!(
                    "{} is outside the vocabulary of size {}",
                    self.options.eos_id, dims.vocab_size
                ),
            });
        }
        Ok(())
    }
}
