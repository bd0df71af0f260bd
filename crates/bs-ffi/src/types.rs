use bs_search::{KernelVariant, SearchDims, StepOptions, TopKOptions};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BSStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorStep = 2,
    ErrorTopK = 3,
    ErrorInternal = 4,
}

/// Sizing of a decode session.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BSDims {
    pub num_beams: u32,
    pub hyps_per_beam: u32,
    pub seq_len: u32,
    pub vocab_size: u32,
    pub attn_dim: u32,
}

impl From<BSDims> for SearchDims {
    fn from(d: BSDims) -> Self {
        SearchDims {
            num_beams: d.num_beams as usize,
            hyps_per_beam: d.hyps_per_beam as usize,
            seq_len: d.seq_len as usize,
            vocab_size: d.vocab_size as usize,
            attn_dim: d.attn_dim as usize,
        }
    }
}

/// Step kernel flavour.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BSKernelVariant {
    Baseline = 0,
    PerBeam = 1,
    PerBeamIndependent = 2,
}

impl From<BSKernelVariant> for KernelVariant {
    fn from(v: BSKernelVariant) -> Self {
        match v {
            BSKernelVariant::Baseline => KernelVariant::Baseline,
            BSKernelVariant::PerBeam => KernelVariant::PerBeam { independence: false },
            BSKernelVariant::PerBeamIndependent => KernelVariant::PerBeam { independence: true },
        }
    }
}

/// Parameters of the step kernel.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct BSStepParams {
    pub eos_id: u32,
    pub beam_size: f32,
    pub ensure_full_beam: bool,
    pub valid_eos_max_logit_delta: f32,
    pub force_eos_in_last_step: bool,
    pub local_eos_threshold: f32,
    pub allow_empty_terminated_hyp: bool,
    pub variant: BSKernelVariant,
}

impl Default for BSStepParams {
    fn default() -> Self {
        Self::from(&StepOptions::new(0))
    }
}

impl From<&StepOptions> for BSStepParams {
    fn from(o: &StepOptions) -> Self {
        let variant = match o.variant {
            KernelVariant::Baseline => BSKernelVariant::Baseline,
            KernelVariant::PerBeam { independence: false } => BSKernelVariant::PerBeam,
            KernelVariant::PerBeam { independence: true } => BSKernelVariant::PerBeamIndependent,
        };
        Self {
            eos_id: o.eos_id,
            beam_size: o.beam_size,
            ensure_full_beam: o.ensure_full_beam,
            valid_eos_max_logit_delta: o.valid_eos_max_logit_delta,
            force_eos_in_last_step: o.force_eos_in_last_step,
            local_eos_threshold: o.local_eos_threshold,
            allow_empty_terminated_hyp: o.allow_empty_terminated_hyp,
            variant,
        }
    }
}

impl From<&BSStepParams> for StepOptions {
    fn from(p: &BSStepParams) -> Self {
        StepOptions {
            eos_id: p.eos_id,
            beam_size: p.beam_size,
            ensure_full_beam: p.ensure_full_beam,
            valid_eos_max_logit_delta: p.valid_eos_max_logit_delta,
            force_eos_in_last_step: p.force_eos_in_last_step,
            local_eos_threshold: p.local_eos_threshold,
            allow_empty_terminated_hyp: p.allow_empty_terminated_hyp,
            variant: p.variant.into(),
        }
    }
}

/// Parameters of final ranking and unpacking.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct BSTopKParams {
    pub k: u32,
    pub length_normalization: f32,
    pub coverage_penalty: f32,
    pub target_seq_length_ratio: f32,
    /// Width of each unpacked id row.
    pub max_seq_length: u32,
}

impl BSTopKParams {
    pub(crate) fn to_options(&self, hyps_per_beam: usize) -> TopKOptions {
        TopKOptions {
            k: self.k as usize,
            hyps_per_beam,
            length_normalization: self.length_normalization,
            coverage_penalty: self.coverage_penalty,
            target_seq_length_ratio: self.target_seq_length_ratio,
        }
    }
}
