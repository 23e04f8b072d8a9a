//! Lexicographic permutations addressed by rank.
//!
//! Rank `k` is the k-th permutation of `0..n` in lexicographic order. The
//! schedule search splits the rank range across threads.

/// `n!`, or `None` on overflow.
#[must_use]
pub fn factorial(n: usize) -> Option<usize> {
    (2..=n).try_fold(1usize, usize::checked_mul)
}

/// The `rank`-th permutation of `0..n` in lexicographic order.
///
/// `rank` is reduced modulo `n!`.
#[must_use]
pub fn nth_permutation(n: usize, rank: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    let mut out = Vec::with_capacity(n);
    let mut rank = factorial(n).map_or(rank, |total| rank % total);
    for remaining in (1..=n).rev() {
        let block = factorial(remaining - 1).unwrap_or(usize::MAX);
        let index = rank / block;
        rank %= block;
        out.push(pool.remove(index));
    }
    out
}

/// Advances `perm` to the next permutation in lexicographic order.
///
/// Returns false (leaving `perm` sorted ascending) after the last one.
pub fn next_permutation(perm: &mut [usize]) -> bool {
    let Some(pivot) = perm.windows(2).rposition(|w| w[0] < w[1]) else {
        perm.reverse();
        return false;
    };
    let successor = perm
        .iter()
        .rposition(|&v| v > perm[pivot])
        .unwrap_or(pivot + 1);
    perm.swap(pivot, successor);
    perm[pivot + 1..].reverse();
    true
}

/// Iterator over all permutations of `0..n` in lexicographic order.
#[derive(Debug, Clone)]
pub struct LexicographicPermutations {
    current: Vec<usize>,
    done: bool,
}

impl LexicographicPermutations {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            current: (0..n).collect(),
            done: false,
        }
    }
}

impl Iterator for LexicographicPermutations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.current.clone();
        self.done = !next_permutation(&mut self.current);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0), Some(1));
        assert_eq!(factorial(1), Some(1));
        assert_eq!(factorial(5), Some(120));
        assert_eq!(factorial(10), Some(3_628_800));
        assert_eq!(factorial(100), None);
    }

    #[test]
    fn test_iterator_order() {
        let all: Vec<_> = LexicographicPermutations::new(3).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
        assert_eq!(LexicographicPermutations::new(0).count(), 1);
    }

    #[test]
    fn test_unranking_matches_iterator() {
        for n in 0..=6 {
            for (rank, perm) in LexicographicPermutations::new(n).enumerate() {
                assert_eq!(nth_permutation(n, rank), perm, "n={n} rank={rank}");
            }
        }
    }
}
