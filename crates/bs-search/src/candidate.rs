use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A possible extension of a live slot by one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Cumulative score of the source slot plus the token log-prob.
    pub score: f32,
    /// Absolute source slot.
    pub slot: usize,
    pub token: u32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    /// Better candidates compare greater: higher score, then lower slot, then
    /// lower token id. NaN scores must be filtered out before ranking.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.slot.cmp(&self.slot))
            .then_with(|| other.token.cmp(&self.token))
    }
}

/// Keep the best `k` candidates, best first.
pub fn select_top<I>(candidates: I, k: usize) -> Vec<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
    for c in candidates {
        if heap.len() < k {
            heap.push(Reverse(c));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if c > *worst {
                heap.pop();
                heap.push(Reverse(c));
            }
        }
    }
    heap.into_sorted_vec().into_iter().map(|Reverse(c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(score: f32, slot: usize, token: u32) -> Candidate {
        Candidate { score, slot, token }
    }

    #[test]
    fn test_ordering() {
        assert!(c(-1.0, 3, 3) > c(-2.0, 0, 0));
        assert!(c(-1.0, 0, 5) > c(-1.0, 1, 0));
        assert!(c(-1.0, 0, 1) > c(-1.0, 0, 2));
        assert!(c(f32::NEG_INFINITY, 0, 0) < c(-1e30, 5, 5));
    }

    #[test]
    fn test_select_top() {
        let all = vec![c(-3.0, 0, 0), c(-1.0, 0, 1), c(-2.0, 1, 0), c(-1.0, 1, 1), c(-5.0, 1, 3)];
        let top = select_top(all, 3);
        assert_eq!(top, vec![c(-1.0, 0, 1), c(-1.0, 1, 1), c(-2.0, 1, 0)]);
    }

    #[test]
    fn test_select_top_fewer_than_k() {
        let top = select_top(vec![c(-2.0, 0, 0), c(-1.0, 0, 1)], 4);
        assert_eq!(top, vec![c(-1.0, 0, 1), c(-2.0, 0, 0)]);
        assert!(select_top(vec![c(0.0, 0, 0)], 0).is_empty());
    }

    #[test]
    fn test_neg_infinity_kept_last() {
        let top = select_top(vec![c(f32::NEG_INFINITY, 0, 0), c(-4.0, 0, 1)], 2);
        assert_eq!(top[0].token, 1);
        assert_eq!(top[1].score, f32::NEG_INFINITY);
    }
}
