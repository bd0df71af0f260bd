use crate::options::{KernelVariant, StepOptions};
use crate::state::BeamStatus;

/// Stopping signals returned by one kernel step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// No beam can improve any more; the caller may stop decoding.
    pub done: bool,
    /// Per-beam done flags. Sticky for the per-beam variant.
    pub beam_done: Vec<bool>,
}

/// Decides whether a beam can still produce a better terminated hypothesis.
#[derive(Debug, Clone, Copy)]
pub struct StoppingPolicy {
    beam_size: f32,
    ensure_full_beam: bool,
    hyps_per_beam: usize,
    variant: KernelVariant,
}

impl StoppingPolicy {
    pub fn new(options: &StepOptions, hyps_per_beam: usize) -> Self {
        Self {
            beam_size: options.beam_size,
            ensure_full_beam: options.ensure_full_beam,
            hyps_per_beam,
            variant: options.variant,
        }
    }

    /// A beam is exhausted when no live survivor is within `beam_size` of the
    /// best terminated score and, if a full beam is required, at least
    /// `hyps_per_beam` hypotheses have terminated.
    pub fn beam_exhausted<I>(&self, best_score: f32, live_scores: I, terminated: usize) -> bool
    where
        I: IntoIterator<Item = f32>,
    {
        let floor = best_score - self.beam_size;
        let can_improve = live_scores.into_iter().any(|score| score > floor);
        !can_improve && (!self.ensure_full_beam || terminated >= self.hyps_per_beam)
    }

    /// Fold this step's local results into the step outcome, latching beam
    /// flags for the per-beam variant.
    pub fn conclude(&self, local: &[bool], status: &mut [BeamStatus]) -> StepOutcome {
        match self.variant {
            KernelVariant::Baseline => StepOutcome {
                done: local.iter().all(|&d| d),
                beam_done: local.to_vec(),
            },
            KernelVariant::PerBeam { .. } => {
                for (s, &exhausted) in status.iter_mut().zip(local) {
                    if exhausted {
                        s.latch();
                    }
                }
                let beam_done: Vec<bool> = status.iter().map(BeamStatus::is_exhausted).collect();
                StepOutcome {
                    done: beam_done.iter().all(|&d| d),
                    beam_done,
                }
            }
        }
    }
}
