//! Property tests for the step kernel over random log-probabilities.

use bs_search::{
    BeamSearchStep, KernelVariant, SearchDims, SearchState, StepInput, StepOptions, StepOutcome,
};
use bs_tensor::{Shape, Tensor};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EOS: u32 = 0;

/// One step of normalized log-probabilities and attention.
fn random_step(rng: &mut StdRng, dims: &SearchDims) -> (Tensor<f32>, Tensor<f32>) {
    let hyp_size = dims.hyp_size();
    let mut probs = Vec::with_capacity(hyp_size * dims.vocab_size);
    for _ in 0..hyp_size {
        let raw: Vec<f32> = (0..dims.vocab_size).map(|_| rng.gen_range(0.01f32..1.0)).collect();
        let total: f32 = raw.iter().sum();
        probs.extend(raw.iter().map(|p| (p / total).ln()));
    }
    let attn: Vec<f32> = (0..hyp_size * dims.attn_dim).map(|_| rng.gen::<f32>()).collect();
    (
        Tensor::from_vec(probs, Shape::new(vec![hyp_size, dims.vocab_size])).unwrap(),
        Tensor::from_vec(attn, Shape::new(vec![hyp_size, dims.attn_dim])).unwrap(),
    )
}

fn arb_dims() -> impl Strategy<Value = SearchDims> {
    (1usize..4, 1usize..4, 2usize..7, 2usize..8, 0usize..3).prop_map(
        |(num_beams, hyps_per_beam, seq_len, vocab_size, attn_dim)| SearchDims {
            num_beams,
            hyps_per_beam,
            seq_len,
            vocab_size,
            attn_dim,
        },
    )
}

fn arb_variant() -> impl Strategy<Value = KernelVariant> {
    prop_oneof![
        Just(KernelVariant::Baseline),
        Just(KernelVariant::PerBeam { independence: false }),
        Just(KernelVariant::PerBeam { independence: true }),
    ]
}

/// Runs a full decode, recording a snapshot of the state after every step.
fn decode(
    dims: SearchDims,
    options: StepOptions,
    seed: u64,
) -> (Vec<SearchState>, Vec<StepOutcome>) {
    let kernel = BeamSearchStep::new(options).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = SearchState::new(dims).unwrap();
    let mut snapshots = Vec::new();
    let mut outcomes = Vec::new();
    for t in 0..dims.seq_len {
        let (probs, attn) = random_step(&mut rng, &dims);
        outcomes.push(kernel.step(&mut state, &StepInput::new(&probs, &attn), t).unwrap());
        snapshots.push(state.clone());
    }
    (snapshots, outcomes)
}

fn step_options(beam_size: f32, variant: KernelVariant) -> StepOptions {
    StepOptions {
        beam_size,
        valid_eos_max_logit_delta: 1.0,
        variant,
        ..StepOptions::new(EOS)
    }
}

proptest! {
    #[test]
    fn decoding_is_deterministic(dims in arb_dims(), variant in arb_variant(), seed in any::<u64>()) {
        let (a, oa) = decode(dims, step_options(2.0, variant), seed);
        let (b, ob) = decode(dims, step_options(2.0, variant), seed);
        prop_assert_eq!(oa, ob);
        let (a, b) = (a.last().unwrap(), b.last().unwrap());
        prop_assert_eq!(a.ids(), b.ids());
        prop_assert_eq!(a.backpointers(), b.backpointers());
        prop_assert_eq!(a.done_hyps(), b.done_hyps());
        prop_assert_eq!(a.best_scores(), b.best_scores());
    }

    #[test]
    fn best_scores_never_decrease(dims in arb_dims(), variant in arb_variant(), seed in any::<u64>()) {
        let (snapshots, _) = decode(dims, step_options(2.0, variant), seed);
        for pair in snapshots.windows(2) {
            for (before, after) in pair[0].best_scores().iter().zip(pair[1].best_scores()) {
                prop_assert!(after >= before);
            }
        }
    }

    #[test]
    fn live_slots_point_into_their_own_beam(dims in arb_dims(), seed in any::<u64>()) {
        let options = step_options(2.0, KernelVariant::PerBeam { independence: false });
        let (snapshots, _) = decode(dims, options, seed);
        for (t, state) in snapshots.iter().enumerate() {
            for (slot, &live) in state.live_slots().iter().enumerate() {
                if !live {
                    continue;
                }
                let src = state.backpointers().row(t)[slot] as usize;
                prop_assert_eq!(dims.beam_of(src), dims.beam_of(slot));
                prop_assert!(state.ids().row(t)[slot] != EOS);
            }
        }
    }

    #[test]
    fn cumulative_score_is_the_sum_along_the_path(dims in arb_dims(), seed in any::<u64>()) {
        let options = step_options(2.0, KernelVariant::Baseline);
        let (snapshots, _) = decode(dims, options, seed);
        let last = dims.seq_len - 1;
        let state = &snapshots[last];
        for (slot, &live) in state.live_slots().iter().enumerate() {
            if !live {
                continue;
            }
            let total: f32 = state
                .trace_path(last, slot)
                .iter()
                .enumerate()
                .map(|(t, &s)| state.scores().row(t)[s])
                .sum();
            prop_assert!((total - state.cumulative_scores()[slot]).abs() < 1e-3);
        }
    }

    #[test]
    fn records_are_never_rewritten(dims in arb_dims(), variant in arb_variant(), seed in any::<u64>()) {
        let (snapshots, _) = decode(dims, step_options(2.0, variant), seed);
        let last = snapshots.last().unwrap();
        for (t, state) in snapshots.iter().enumerate() {
            for earlier in 0..=t {
                prop_assert_eq!(state.done_hyps().row(earlier), last.done_hyps().row(earlier));
                prop_assert_eq!(state.ids().row(earlier), last.ids().row(earlier));
            }
        }
    }

    #[test]
    fn exhausted_independent_beams_record_nothing_more(
        dims in arb_dims(),
        beam_size in 0.0f32..1.5,
        seed in any::<u64>(),
    ) {
        let options = step_options(beam_size, KernelVariant::PerBeam { independence: true });
        let (snapshots, outcomes) = decode(dims, options, seed);
        let last = snapshots.last().unwrap();
        for beam in 0..dims.num_beams {
            let Some(latched) = outcomes.iter().position(|o| o.beam_done[beam]) else {
                continue;
            };
            for outcome in &outcomes[latched..] {
                prop_assert!(outcome.beam_done[beam]);
            }
            for t in latched + 1..dims.seq_len {
                for slot in dims.slots_of(beam) {
                    prop_assert!(last.done_hyps().row(t)[slot].is_empty());
                }
            }
        }
    }
}
