use std::fmt;

/// Attention weights a hypothesis placed over the source at one output step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttentionVector {
    pub probs: Vec<f32>,
}

impl AttentionVector {
    pub fn new(probs: Vec<f32>) -> Self {
        Self { probs }
    }
}

impl From<&[f32]> for AttentionVector {
    fn from(probs: &[f32]) -> Self {
        Self::new(probs.to_vec())
    }
}

/// A completed (EOS-terminated) beam-search hypothesis.
///
/// `ids`, `scores` and `atten_vecs` are parallel: entry `i` describes output
/// step `i`. `normalized_score` is only set on records produced by the top-k
/// selector. `Hypothesis::default()` is the empty hypothesis, which encodes
/// to an empty buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hypothesis {
    /// Beam this hypothesis belongs to.
    pub beam_id: u32,
    /// Token ids along the path, ending with EOS.
    pub ids: Vec<u32>,
    /// Per-step marginal log-probabilities along the path.
    pub scores: Vec<f32>,
    /// Per-step attention vectors along the path.
    pub atten_vecs: Vec<AttentionVector>,
    /// Length/coverage adjusted score assigned at final ranking.
    pub normalized_score: Option<f32>,
}

impl Hypothesis {
    /// True for the empty hypothesis (the "absent record" value).
    pub fn is_empty(&self) -> bool {
        *self == Hypothesis::default()
    }

    /// Number of output steps (tokens) in the hypothesis.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Sum of the per-step scores: the raw cumulative log-probability.
    pub fn total_score(&self) -> f32 {
        self.scores.iter().sum()
    }

    /// Score reported when unpacking: the normalized score if the record has
    /// been ranked, otherwise the raw cumulative score.
    pub fn reported_score(&self) -> f32 {
        self.normalized_score.unwrap_or_else(|| self.total_score())
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "beam={} ids={:?} score={:.6}", self.beam_id, self.ids, self.total_score())?;
        if let Some(norm) = self.normalized_score {
            write!(f, " normalized={:.6}", norm)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Hypothesis {
        Hypothesis {
            beam_id: 1,
            ids: vec![3, 2],
            scores: vec![-0.5, -0.25],
            atten_vecs: vec![AttentionVector::new(vec![0.5, 0.5]); 2],
            normalized_score: None,
        }
    }

    #[test]
    fn test_empty() {
        assert!(Hypothesis::default().is_empty());
        assert!(!sample().is_empty());
        // A beam id alone is still information; it is not the empty record.
        let beam_only = Hypothesis {
            beam_id: 4,
            ..Default::default()
        };
        assert!(!beam_only.is_empty());
    }

    #[test]
    fn test_reported_score() {
        let mut h = sample();
        assert_relative_eq!(h.reported_score(), -0.75);
        h.normalized_score = Some(-0.4);
        assert_relative_eq!(h.reported_score(), -0.4);
        assert_relative_eq!(h.total_score(), -0.75);
    }

    #[test]
    fn test_display() {
        assert_eq!(Hypothesis::default().to_string(), "<empty>");
        assert_eq!(sample().to_string(), "beam=1 ids=[3, 2] score=-0.750000");
    }
}
