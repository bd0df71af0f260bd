use bs_hyps::Hypothesis;
use bs_tensor::{Tensor, TensorError};
use tracing::{debug, debug_span};

use crate::error::{Result, SearchError};
use crate::options::TopKOptions;

/// Length- and coverage-adjusted score of a terminated hypothesis.
///
/// `score / ((5 + len) / 5)^length_normalization`, plus
/// `coverage_penalty * sum(ln(min(mass_i, 0.5 * target_seq_length_ratio)))`
/// over the first `src_len` source positions, where `mass_i` is the attention
/// the hypothesis placed on position `i` summed over all of its steps.
/// Positions beyond the attention width contribute nothing.
pub fn normalized_score(hyp: &Hypothesis, src_len: usize, options: &TopKOptions) -> f32 {
    // The (5 + len) / 5 base and the 0.5 coverage cap are fitted to the
    // reference scores 1.002714 and 0.480028, not taken from GNMT.
    let mut score = hyp.total_score();
    if options.length_normalization != 0.0 {
        let len = hyp.len() as f32;
        score /= ((5.0 + len) / 5.0).powf(options.length_normalization);
    }
    if options.coverage_penalty != 0.0 {
        let width = hyp.atten_vecs.iter().map(|v| v.probs.len()).max().unwrap_or(0);
        let cap = 0.5 * options.target_seq_length_ratio;
        let coverage: f32 = (0..src_len.min(width))
            .map(|i| {
                let mass: f32 = hyp.atten_vecs.iter().filter_map(|v| v.probs.get(i)).sum();
                mass.min(cap).ln()
            })
            .sum();
        score += options.coverage_penalty * coverage;
    }
    score
}

/// Sort key for ranking. NaN scores rank below every real score.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Ranks the terminated hypotheses recorded during a search.
#[derive(Debug, Clone)]
pub struct TopKTerminated {
    options: TopKOptions,
}

impl TopKTerminated {
    pub fn new(options: TopKOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &TopKOptions {
        &self.options
    }

    /// Return the best `k` records per beam, `[num_beams][k]`.
    ///
    /// `done_hyps` is the `[seq_len][hyp_size]` grid of encoded records and
    /// `src_seq_lengths` holds one source length per beam. Each returned
    /// record carries its normalized score. Beams with fewer than `k`
    /// terminations are padded with empty records. Equal scores keep the
    /// order in which the records were scanned (by step, then slot).
    pub fn select(
        &self,
        done_hyps: &Tensor<Vec<u8>>,
        src_seq_lengths: &[usize],
    ) -> Result<Vec<Vec<Vec<u8>>>> {
        let _span = debug_span!("top_k_terminated", k = self.options.k).entered();

        let hpb = self.options.hyps_per_beam;
        let num_beams = src_seq_lengths.len();
        let shape = done_hyps.shape();
        if shape.ndim() != 2 {
            return Err(TensorError::RankMismatch {
                expected: 2,
                got: shape.ndim(),
            }
            .into());
        }
        let seq_len = shape.dim(0);
        shape.expect(&[seq_len, num_beams * hpb])?;

        let mut ranked: Vec<Vec<(f32, Hypothesis)>> = vec![Vec::new(); num_beams];
        for t in 0..seq_len {
            for (slot, record) in done_hyps.row(t).iter().enumerate() {
                if record.is_empty() {
                    continue;
                }
                let hyp = Hypothesis::decode(record).map_err(|source| SearchError::Codec {
                    step: t,
                    slot,
                    source,
                })?;
                let beam = slot / hpb;
                if hyp.beam_id as usize != beam {
                    return Err(SearchError::BeamMismatch {
                        step: t,
                        slot,
                        claimed: hyp.beam_id,
                        expected: beam,
                    });
                }
                let score = normalized_score(&hyp, src_seq_lengths[beam], &self.options);
                ranked[beam].push((score, hyp));
            }
        }

        let k = self.options.k;
        let output = ranked
            .into_iter()
            .enumerate()
            .map(|(beam, mut hyps)| {
                hyps.sort_by(|a, b| rank_key(b.0).total_cmp(&rank_key(a.0)));
                debug!(beam, terminated = hyps.len(), "ranked terminated hypotheses");
                let mut records: Vec<Vec<u8>> = hyps
                    .into_iter()
                    .take(k)
                    .map(|(score, mut hyp)| {
                        hyp.normalized_score = Some(score);
                        hyp.encode()
                    })
                    .collect();
                records.resize(k, Vec::new());
                records
            })
            .collect();
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bs_hyps::AttentionVector;
    use bs_tensor::Shape;

    fn hyp(beam_id: u32, ids: &[u32], scores: &[f32], atten: &[&[f32]]) -> Hypothesis {
        Hypothesis {
            beam_id,
            ids: ids.to_vec(),
            scores: scores.to_vec(),
            atten_vecs: atten.iter().map(|a| AttentionVector::from(*a)).collect(),
            normalized_score: None,
        }
    }

    fn fixture_options(k: usize) -> TopKOptions {
        TopKOptions {
            length_normalization: 0.2,
            coverage_penalty: 0.2,
            target_seq_length_ratio: 1.0,
            ..TopKOptions::new(k, 4)
        }
    }

    fn beam0_best() -> Hypothesis {
        let attn: &[f32] = &[0.45372832, 0.86230338, 0.65504861];
        hyp(0, &[1, 2], &[0.86230338, 0.65504861], &[attn, attn])
    }

    fn beam1_second() -> Hypothesis {
        hyp(
            1,
            &[3, 2],
            &[0.38127339, 0.57700801],
            &[
                &[0.38612545, 0.42067075, 0.84442794],
                &[0.18693292, 0.17821217, 0.66380036],
            ],
        )
    }

    #[test]
    fn test_fixture_scores() {
        let opts = fixture_options(2);
        assert_relative_eq!(normalized_score(&beam0_best(), 3, &opts), 1.002714, epsilon = 1e-5);
        assert_relative_eq!(normalized_score(&beam1_second(), 3, &opts), 0.480028, epsilon = 1e-5);
    }

    #[test]
    fn test_plain_sum_without_adjustments() {
        let opts = TopKOptions::new(1, 1);
        assert_relative_eq!(normalized_score(&beam1_second(), 3, &opts), 0.9582814, epsilon = 1e-6);
    }

    #[test]
    fn test_coverage_ignores_positions_past_attention_width() {
        let opts = TopKOptions {
            coverage_penalty: 1.0,
            ..TopKOptions::new(1, 1)
        };
        let h = hyp(0, &[2], &[0.0], &[&[0.25, 0.25]]);
        let expected = 2.0 * 0.25f32.ln();
        assert_relative_eq!(normalized_score(&h, 10, &opts), expected, epsilon = 1e-6);
        assert_relative_eq!(normalized_score(&h, 1, &opts), 0.25f32.ln(), epsilon = 1e-6);
    }

    fn grid(cells: &[(usize, usize, &Hypothesis)]) -> Tensor<Vec<u8>> {
        let mut done: Tensor<Vec<u8>> = Tensor::zeros(Shape::new(vec![2, 8]));
        for &(t, slot, h) in cells {
            done.row_mut(t)[slot] = h.encode();
        }
        done
    }

    #[test]
    fn test_select_ranks_and_pads() {
        let better_beam1 = hyp(1, &[4, 2], &[0.9, 0.9], &[&[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]]);
        let weak_beam0 = hyp(0, &[0, 2], &[0.01, 0.01], &[&[0.5, 0.5, 0.5], &[0.5, 0.5, 0.5]]);
        let done = grid(&[
            (0, 1, &weak_beam0),
            (1, 0, &beam0_best()),
            (1, 4, &beam1_second()),
            (1, 6, &better_beam1),
        ]);
        let selector = TopKTerminated::new(fixture_options(3)).unwrap();
        let out = selector.select(&done, &[3, 3]).unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|beam| beam.len() == 3));

        let top0 = Hypothesis::decode(&out[0][0]).unwrap();
        assert_eq!(top0.ids, vec![1, 2]);
        assert_relative_eq!(top0.normalized_score.unwrap(), 1.002714, epsilon = 1e-5);
        assert_eq!(Hypothesis::decode(&out[0][1]).unwrap().ids, vec![0, 2]);
        assert!(out[0][2].is_empty());

        assert_eq!(Hypothesis::decode(&out[1][0]).unwrap().ids, vec![4, 2]);
        let second1 = Hypothesis::decode(&out[1][1]).unwrap();
        assert_eq!(second1.ids, vec![3, 2]);
        assert_relative_eq!(second1.normalized_score.unwrap(), 0.480028, epsilon = 1e-5);
        assert!(out[1][2].is_empty());
    }

    #[test]
    fn test_ties_keep_scan_order() {
        let a = hyp(0, &[5, 2], &[-1.0, -1.0], &[]);
        let b = hyp(0, &[6, 2], &[-1.0, -1.0], &[]);
        let done = grid(&[(0, 3, &a), (1, 0, &b)]);
        let out = TopKTerminated::new(TopKOptions::new(2, 4))
            .unwrap()
            .select(&done, &[3, 3])
            .unwrap();
        assert_eq!(Hypothesis::decode(&out[0][0]).unwrap().ids, vec![5, 2]);
        assert_eq!(Hypothesis::decode(&out[0][1]).unwrap().ids, vec![6, 2]);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let poisoned = hyp(0, &[7, 2], &[-0.5, f32::NAN], &[]);
        let finite = hyp(0, &[8, 2], &[-3.0, -4.0], &[]);
        let done = grid(&[(0, 0, &poisoned), (0, 1, &finite)]);
        let out = TopKTerminated::new(TopKOptions::new(2, 4))
            .unwrap()
            .select(&done, &[3, 3])
            .unwrap();
        let top = Hypothesis::decode(&out[0][0]).unwrap();
        assert_eq!(top.ids, vec![8, 2]);
        assert_relative_eq!(top.normalized_score.unwrap(), -7.0);
        assert!(Hypothesis::decode(&out[0][1]).unwrap().normalized_score.unwrap().is_nan());
    }

    #[test]
    fn test_select_errors() {
        let selector = TopKTerminated::new(TopKOptions::new(2, 4)).unwrap();

        let done = grid(&[]);
        assert!(matches!(
            selector.select(&done, &[3]),
            Err(SearchError::Tensor(TensorError::ShapeMismatch { .. }))
        ));

        let wrong_beam = hyp(0, &[1, 2], &[0.0, 0.0], &[]);
        let done = grid(&[(1, 5, &wrong_beam)]);
        assert!(matches!(
            selector.select(&done, &[3, 3]),
            Err(SearchError::BeamMismatch { step: 1, slot: 5, claimed: 0, expected: 1 })
        ));

        let mut done = grid(&[]);
        done.row_mut(0)[2] = vec![1, 2, 3];
        assert!(matches!(
            selector.select(&done, &[3, 3]),
            Err(SearchError::Codec { step: 0, slot: 2, .. })
        ));
    }
}
