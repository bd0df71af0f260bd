use bs_search::{BeamSearchStep, SearchDims, SearchState, StepOptions, StepOutcome};

/// Opaque session handle that owns the step kernel and the search state.
pub struct BSSession {
    pub kernel: BeamSearchStep,
    pub state: SearchState,
    /// Outcome of the most recent successful step.
    pub last_outcome: Option<StepOutcome>,
}

impl BSSession {
    pub fn new(dims: SearchDims, options: StepOptions) -> bs_search::Result<Self> {
        Ok(Self {
            kernel: BeamSearchStep::new(options)?,
            state: SearchState::new(dims)?,
            last_outcome: None,
        })
    }

    /// Per-beam done flags as of the last step; all false before the first.
    pub fn beam_done(&self) -> Vec<bool> {
        match &self.last_outcome {
            Some(outcome) => outcome.beam_done.clone(),
            None => vec![false; self.state.dims().num_beams],
        }
    }
}
