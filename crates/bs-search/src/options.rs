use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Which flavour of the step kernel to run.
///
/// Both share one expansion path; they differ only in how stopping is
/// reported and whether exhausted beams keep expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelVariant {
    /// One global `done` flag computed from this step alone.
    Baseline,
    /// Sticky per-beam done flags. With `independence`, a beam whose flag is
    /// set stops expanding and stops recording terminations.
    PerBeam { independence: bool },
}

impl KernelVariant {
    /// True when exhausted beams are frozen.
    pub fn freezes_exhausted_beams(&self) -> bool {
        matches!(self, KernelVariant::PerBeam { independence: true })
    }
}

impl Default for KernelVariant {
    fn default() -> Self {
        KernelVariant::PerBeam {
            independence: false,
        }
    }
}

/// Options for a single beam-search step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOptions {
    /// End-of-sequence token id.
    pub eos_id: u32,
    /// Margin below the best terminated score within which active
    /// hypotheses are still worth expanding.
    #[serde(default = "default_beam_size")]
    pub beam_size: f32,
    /// Require `hyps_per_beam` terminated hypotheses before a beam may stop.
    #[serde(default)]
    pub ensure_full_beam: bool,
    /// EOS may terminate only if its log-prob is within this delta of the
    /// best non-EOS token of the same hypothesis.
    #[serde(default = "default_valid_eos_max_logit_delta")]
    pub valid_eos_max_logit_delta: f32,
    /// Terminate every live hypothesis with EOS on the last step.
    #[serde(default)]
    pub force_eos_in_last_step: bool,
    /// EOS may terminate only if its log-prob exceeds this threshold.
    #[serde(default = "default_local_eos_threshold")]
    pub local_eos_threshold: f32,
    /// Whether a hypothesis made of a single EOS may terminate at step 0.
    #[serde(default = "default_true")]
    pub allow_empty_terminated_hyp: bool,
    #[serde(default)]
    pub variant: KernelVariant,
}

fn default_beam_size() -> f32 {
    3.0
}

fn default_valid_eos_max_logit_delta() -> f32 {
    5.0
}

fn default_local_eos_threshold() -> f32 {
    -100.0
}

fn default_true() -> bool {
    true
}

impl StepOptions {
    /// Options with the default search knobs for the given EOS id.
    pub fn new(eos_id: u32) -> Self {
        Self {
            eos_id,
            beam_size: default_beam_size(),
            ensure_full_beam: false,
            valid_eos_max_logit_delta: default_valid_eos_max_logit_delta(),
            force_eos_in_last_step: false,
            local_eos_threshold: default_local_eos_threshold(),
            allow_empty_terminated_hyp: true,
            variant: KernelVariant::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.beam_size.is_finite() || self.beam_size < 0.0 {
            return Err(SearchError::InvalidOption {
                name: "beam_size",
                reason: format!("must be finite and non-negative, got {}", self.beam_size),
            });
        }
        if self.valid_eos_max_logit_delta.is_nan() || self.valid_eos_max_logit_delta < 0.0 {
            return Err(SearchError::InvalidOption {
                name: "valid_eos_max_logit_delta",
                reason: format!("must be non-negative, got {}", self.valid_eos_max_logit_delta),
            });
        }
        if self.local_eos_threshold.is_nan() {
            return Err(SearchError::InvalidOption {
                name: "local_eos_threshold",
                reason: "must not be NaN".to_string(),
            });
        }
        Ok(())
    }
}

/// Options for ranking terminated hypotheses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKOptions {
    /// Number of hypotheses to return per beam.
    pub k: usize,
    /// Hypotheses per beam in the search that produced the records.
    pub hyps_per_beam: usize,
    /// Exponent of the length penalty. 0 disables length normalization.
    #[serde(default)]
    pub length_normalization: f32,
    /// Weight of the attention coverage term. 0 disables it.
    #[serde(default)]
    pub coverage_penalty: f32,
    /// Expected ratio of target length to source length.
    #[serde(default = "default_target_seq_length_ratio")]
    pub target_seq_length_ratio: f32,
}

fn default_target_seq_length_ratio() -> f32 {
    1.0
}

impl TopKOptions {
    pub fn new(k: usize, hyps_per_beam: usize) -> Self {
        Self {
            k,
            hyps_per_beam,
            length_normalization: 0.0,
            coverage_penalty: 0.0,
            target_seq_length_ratio: default_target_seq_length_ratio(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hyps_per_beam == 0 {
            return Err(SearchError::InvalidOption {
                name: "hyps_per_beam",
                reason: "must be positive".to_string(),
            });
        }
        if !self.length_normalization.is_finite() {
            return Err(SearchError::InvalidOption {
                name: "length_normalization",
                reason: format!("must be finite, got {}", self.length_normalization),
            });
        }
        if !self.coverage_penalty.is_finite() {
            return Err(SearchError::InvalidOption {
                name: "coverage_penalty",
                reason: format!("must be finite, got {}", self.coverage_penalty),
            });
        }
        if !(self.target_seq_length_ratio.is_finite() && self.target_seq_length_ratio > 0.0) {
            return Err(SearchError::InvalidOption {
                name: "target_seq_length_ratio",
                reason: format!("must be positive, got {}", self.target_seq_length_ratio),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults() {
        let opts = StepOptions::new(2);
        assert_eq!(opts.beam_size, 3.0);
        assert_eq!(opts.local_eos_threshold, -100.0);
        assert!(opts.allow_empty_terminated_hyp);
        assert_eq!(opts.variant, KernelVariant::PerBeam { independence: false });
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_step_options_from_json() {
        let opts: StepOptions = serde_json::from_str(
            r#"{"eos_id": 2, "beam_size": 0.1, "variant": {"kind": "per_beam", "independence": true}}"#,
        )
        .unwrap();
        assert_eq!(opts.eos_id, 2);
        assert_eq!(opts.beam_size, 0.1);
        assert_eq!(opts.valid_eos_max_logit_delta, 5.0);
        assert!(opts.variant.freezes_exhausted_beams());

        let baseline: StepOptions =
            serde_json::from_str(r#"{"eos_id": 1, "variant": {"kind": "baseline"}}"#).unwrap();
        assert_eq!(baseline.variant, KernelVariant::Baseline);
        assert!(!baseline.variant.freezes_exhausted_beams());
    }

    #[test]
    fn test_step_options_rejected() {
        let bad = StepOptions {
            beam_size: f32::NAN,
            ..StepOptions::new(2)
        };
        assert!(matches!(
            bad.validate(),
            Err(SearchError::InvalidOption { name: "beam_size", .. })
        ));
        let bad = StepOptions {
            valid_eos_max_logit_delta: -1.0,
            ..StepOptions::new(2)
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_top_k_options() {
        let opts: TopKOptions =
            serde_json::from_str(r#"{"k": 2, "hyps_per_beam": 4, "coverage_penalty": 0.2}"#).unwrap();
        assert_eq!(opts.target_seq_length_ratio, 1.0);
        assert_eq!(opts.length_normalization, 0.0);
        assert!(opts.validate().is_ok());
        assert!(TopKOptions::new(2, 0).validate().is_err());
        let bad = TopKOptions {
            target_seq_length_ratio: 0.0,
            ..TopKOptions::new(1, 1)
        };
        assert!(bad.validate().is_err());
    }
}
