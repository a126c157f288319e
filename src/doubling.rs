use std::cmp::Ordering;
use std::fmt::Debug;

use anyhow::{anyhow, Result};
use bitvec::vec::BitVec;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::Alphabet;

/// Dense rank of the terminator, the first symbol of every alphabet.
const TERMINATOR: usize = 0;

/// A single suffix array construction run.
///
/// Created by [`SuffixArrayBuilder::new`], which validates the sequence
/// against its alphabet eagerly; [`SuffixArrayBuilder::build`] then runs the
/// doubling loop to completion and cannot fail. Every run owns its arrays
/// and its random generator, so independent runs never interfere.
///
/// # Examples
///
/// ```rust
/// use sa_doubling::{Alphabet, SuffixArrayBuilder};
///
/// let alphabet = Alphabet::dna();
/// let sa = SuffixArrayBuilder::new(b"GATTACA$", &alphabet)?.seed(7).build();
/// assert_eq!(sa.positions(), [7, 6, 4, 1, 5, 0, 3, 2]);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct SuffixArrayBuilder {
    codes: Vec<usize>,
    num_symbols: usize,
    rng: SmallRng,
}

impl SuffixArrayBuilder {
    /// Validates `seq` against `alphabet` and prepares a construction run.
    ///
    /// The sequence must be non-empty, wholly covered by the alphabet, and
    /// end with the alphabet's terminator; the terminator may appear nowhere
    /// else. The unique terminator guarantees that no suffix is a proper
    /// prefix of another, which the doubling loop relies on to finish.
    ///
    /// # Errors
    ///
    /// Fails if any of the above is violated. No partial result exists on
    /// failure.
    pub fn new<S>(seq: &[S], alphabet: &Alphabet<S>) -> Result<Self>
    where
        S: Ord + Copy + Debug,
    {
        let codes = alphabet.encode(seq)?;
        if codes.is_empty() {
            return Err(anyhow!("sequence must not be empty."));
        }
        if codes[codes.len() - 1] != TERMINATOR {
            return Err(anyhow!(
                "sequence must end with the terminator {:?}.",
                alphabet.terminator()
            ));
        }
        if codes[..codes.len() - 1].contains(&TERMINATOR) {
            return Err(anyhow!(
                "terminator {:?} must not appear before the end of the sequence.",
                alphabet.terminator()
            ));
        }
        Ok(Self {
            codes,
            num_symbols: alphabet.len(),
            rng: SmallRng::from_entropy(),
        })
    }

    /// Replaces the entropy-seeded generator with a seeded one, making the
    /// run reproducible. Seeding only affects pivot choices; the finished
    /// array is the same for every seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Runs the construction to completion.
    ///
    /// Positions are bucketed by their leading symbol, then each round
    /// doubles the comparison depth `h`, reorders every unsorted bucket by
    /// the rank of the suffix `h` positions later, and freezes positions
    /// whose rank has become unique. The loop ends when every position is
    /// frozen.
    #[must_use]
    pub fn build(mut self) -> SuffixArray {
        let n = self.codes.len();
        let mut sa = vec![0; n];
        let mut ranks = vec![0; n];
        let mut finalized: BitVec = bitvec::bitvec![0; n];
        let mut num_finalized = 0;

        initial_ranking(
            &self.codes,
            self.num_symbols,
            &mut sa,
            &mut ranks,
            &mut finalized,
            &mut num_finalized,
        );

        let mut order = 1;
        let mut rounds = 0;
        // The order <= n guard stops the degenerate round where doubling has
        // outrun the sequence without every position being frozen.
        while num_finalized < n && order <= n {
            let mut left = 0;
            while left < n {
                if finalized[left] {
                    left += 1;
                    continue;
                }
                // An unsorted bucket occupies a contiguous slot range, and
                // bucket boundaries never move once established.
                let bucket = ranks[sa[left]];
                let mut right = left;
                while right + 1 < n && !finalized[right + 1] && ranks[sa[right + 1]] == bucket {
                    right += 1;
                }
                partition(&mut sa[left..=right], &ranks, order, &mut self.rng);
                refine(
                    &sa,
                    left,
                    right,
                    order,
                    &mut ranks,
                    &mut finalized,
                    &mut num_finalized,
                );
                left = right + 1;
            }
            order *= 2;
            rounds += 1;
            debug_assert!(is_permutation(&sa));
        }

        SuffixArray {
            positions: sa,
            ranks,
            rounds,
        }
    }
}

/// A completed suffix array and its inverse.
///
/// Frozen once [`SuffixArrayBuilder::build`] returns; nothing is shared with
/// later construction runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixArray {
    positions: Vec<usize>,
    ranks: Vec<usize>,
    rounds: usize,
}

impl SuffixArray {
    /// Suffix starting positions, ordered by the suffixes they start.
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Rank of every position: `ranks()[positions()[i]] == i`.
    #[must_use]
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// Number of doubling rounds the construction ran.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Length of the underlying sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always `false`; construction rejects empty sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Consumes the result, returning the position and rank vectors.
    #[must_use]
    pub fn into_parts(self) -> (Vec<usize>, Vec<usize>) {
        (self.positions, self.ranks)
    }
}

/// Buckets positions by their leading symbol and assigns round-zero ranks.
///
/// A stable counting sort: the symbol histogram becomes bucket start
/// offsets, and left-to-right placement keeps equal-symbol runs in position
/// order. Every member of a bucket is ranked by the bucket's right-end slot,
/// and singleton buckets are frozen immediately.
fn initial_ranking(
    codes: &[usize],
    num_symbols: usize,
    sa: &mut [usize],
    ranks: &mut [usize],
    finalized: &mut BitVec,
    num_finalized: &mut usize,
) {
    let n = codes.len();
    let mut offsets = vec![0; num_symbols];
    for &code in codes {
        offsets[code] += 1;
    }
    let mut start = 0;
    for offset in &mut offsets {
        let count = *offset;
        *offset = start;
        start += count;
    }
    for (pos, &code) in codes.iter().enumerate() {
        sa[offsets[code]] = pos;
        offsets[code] += 1;
    }

    let mut left = 0;
    while left < n {
        let mut right = left;
        while right + 1 < n && codes[sa[right + 1]] == codes[sa[left]] {
            right += 1;
        }
        for slot in left..=right {
            ranks[sa[slot]] = right;
        }
        if left == right {
            finalized.set(left, true);
            *num_finalized += 1;
        }
        left = right + 1;
    }
}

/// Rank of the suffix starting `order` positions after `pos`. Past the end
/// of the sequence there is nothing left to compare, so `None` sorts before
/// every in-range rank.
fn key_at(ranks: &[usize], pos: usize, order: usize) -> Option<usize> {
    ranks.get(pos + order).copied()
}

/// Reorders one bucket of suffix array entries so their offset-`order` keys
/// are non-decreasing.
///
/// Ternary split around the key of a uniformly random element: one pass
/// collects the strictly-smaller, equal, and strictly-larger entries in
/// encounter order, then the small and large groups recurse. The equal
/// group needs no further work at this order.
fn partition(run: &mut [usize], ranks: &[usize], order: usize, rng: &mut SmallRng) {
    if run.len() <= 1 {
        return;
    }
    let pivot = key_at(ranks, run[rng.gen_range(0..run.len())], order);

    let mut small = Vec::new();
    let mut equal = Vec::new();
    let mut large = Vec::new();
    for &pos in run.iter() {
        match key_at(ranks, pos, order).cmp(&pivot) {
            Ordering::Less => small.push(pos),
            Ordering::Equal => equal.push(pos),
            Ordering::Greater => large.push(pos),
        }
    }

    run[..small.len()].copy_from_slice(&small);
    run[small.len()..small.len() + equal.len()].copy_from_slice(&equal);
    run[small.len() + equal.len()..].copy_from_slice(&large);

    partition(&mut run[..small.len()], ranks, order, rng);
    let large_start = run.len() - large.len();
    partition(&mut run[large_start..], ranks, order, rng);
}

/// Splits one freshly partitioned bucket `[left, right]` into sub-buckets by
/// offset-`order` key, re-ranking every member to its sub-bucket's right-end
/// slot and freezing singletons.
///
/// All keys are read before any rank is written, so every comparison in the
/// bucket sees one consistent rank state.
fn refine(
    sa: &[usize],
    left: usize,
    right: usize,
    order: usize,
    ranks: &mut [usize],
    finalized: &mut BitVec,
    num_finalized: &mut usize,
) {
    let mut reps = vec![0; right - left + 1];
    let mut rep = right;
    for slot in (left..=right).rev() {
        if key_at(ranks, sa[slot], order) != key_at(ranks, sa[rep], order) {
            rep = slot;
        }
        reps[slot - left] = rep;
    }
    for slot in left..=right {
        ranks[sa[slot]] = reps[slot - left];
    }

    // Slots outside [left, right] belong to other buckets already, so only
    // in-bucket neighbors decide whether a sub-bucket is a singleton.
    for slot in left..=right {
        let rep = reps[slot - left];
        let starts_group = slot == left || reps[slot - left - 1] != rep;
        let ends_group = slot == right || reps[slot - left + 1] != rep;
        if starts_group && ends_group {
            finalized.set(slot, true);
            *num_finalized += 1;
        }
    }
}

fn is_permutation(sa: &[usize]) -> bool {
    let mut seen: BitVec = bitvec::bitvec![0; sa.len()];
    for &pos in sa {
        if pos >= sa.len() || seen[pos] {
            return false;
        }
        seen.set(pos, true);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn alphabet(symbols: &[u8]) -> Alphabet<u8> {
        Alphabet::new(symbols.iter().copied()).unwrap()
    }

    #[rstest]
    #[case(b"$", b"$A", &[0])]
    #[case(b"A$", b"$A", &[1, 0])]
    #[case(b"AAAA$", b"$A", &[4, 3, 2, 1, 0])]
    #[case(b"BANANA$", b"$ABN", &[6, 5, 3, 1, 0, 4, 2])]
    #[case(b"GATTACA$", b"$ACGT", &[7, 6, 4, 1, 5, 0, 3, 2])]
    #[case(b"MISSISSIPPI$", b"$IMPS", &[11, 10, 7, 4, 1, 0, 9, 8, 6, 3, 5, 2])]
    #[case(b"TGGGCCCCA$", b"$ACGT", &[9, 8, 7, 6, 5, 4, 3, 2, 1, 0])]
    fn test_build_known_arrays(
        #[case] seq: &[u8],
        #[case] symbols: &[u8],
        #[case] expected: &[usize],
    ) {
        let sa = SuffixArrayBuilder::new(seq, &alphabet(symbols))
            .unwrap()
            .seed(42)
            .build();
        assert_eq!(expected, sa.positions());
        for (slot, &pos) in sa.positions().iter().enumerate() {
            assert_eq!(slot, sa.ranks()[pos]);
        }
    }

    #[test]
    fn test_single_terminator_completes_without_rounds() {
        let sa = SuffixArrayBuilder::new(b"$", &alphabet(b"$A"))
            .unwrap()
            .build();
        assert_eq!(sa.positions(), [0]);
        assert_eq!(sa.ranks(), [0]);
        assert_eq!(0, sa.rounds());
        assert_eq!(1, sa.len());
        assert!(!sa.is_empty());

        let (positions, ranks) = sa.into_parts();
        assert_eq!(vec![0], positions);
        assert_eq!(vec![0], ranks);
    }

    #[test]
    fn test_round_count_stays_within_doubling_bound() {
        let inputs: [&[u8]; 4] = [b"AAAA$", b"BANANA$", b"MISSISSIPPI$", b"TGGGCCCCA$"];
        for seq in inputs {
            let symbols: Vec<u8> = {
                let mut s = seq.to_vec();
                s.sort_unstable();
                s.dedup();
                s
            };
            let sa = SuffixArrayBuilder::new(seq, &alphabet(&symbols))
                .unwrap()
                .build();
            let bound = seq.len().next_power_of_two().trailing_zeros() as usize + 1;
            assert!(sa.rounds() <= bound, "{} rounds for length {}", sa.rounds(), seq.len());
        }
    }

    #[rstest]
    #[case(b"", "must not be empty")]
    #[case(b"BANANA", "end with the terminator")]
    #[case(b"BAN$ANA$", "must not appear before the end")]
    #[case(b"BANANAS$", "not in the alphabet")]
    fn test_construct_rejects(#[case] seq: &[u8], #[case] message: &str) {
        let err = SuffixArrayBuilder::new(seq, &alphabet(b"$ABN")).unwrap_err();
        assert!(err.to_string().contains(message), "error: {err}");
    }

    #[test]
    fn test_seed_does_not_change_the_result() {
        let alphabet = Alphabet::dna();
        let seq = b"GGGGGATTTCTTTCTTCTCAACGGGTACC$";
        let first = SuffixArrayBuilder::new(seq, &alphabet).unwrap().seed(1).build();
        let second = SuffixArrayBuilder::new(seq, &alphabet).unwrap().seed(2).build();
        assert_eq!(first, second);
    }

    #[test]
    fn test_initial_ranking_buckets_and_freezes() {
        // "BANANA$" over $ABN: codes [2, 1, 3, 1, 3, 1, 0].
        let codes = vec![2, 1, 3, 1, 3, 1, 0];
        let mut sa = vec![0; 7];
        let mut ranks = vec![0; 7];
        let mut finalized: BitVec = bitvec::bitvec![0; 7];
        let mut num_finalized = 0;

        initial_ranking(&codes, 4, &mut sa, &mut ranks, &mut finalized, &mut num_finalized);

        assert_eq!(vec![6, 1, 3, 5, 0, 2, 4], sa);
        assert_eq!(vec![4, 3, 6, 3, 6, 3, 0], ranks);
        // The lone terminator and the lone B are frozen at once.
        assert!(finalized[0]);
        assert!(finalized[4]);
        assert_eq!(2, num_finalized);
        assert_eq!(2, finalized.count_ones());
    }

    #[test]
    fn test_partition_orders_by_offset_key() {
        let ranks = vec![5, 1, 4, 1, 0, 3];
        let mut run = vec![0, 1, 2, 3];
        // Keys at order 1: ranks[1] = 1, ranks[2] = 4, ranks[3] = 1, ranks[4] = 0.
        let mut rng = SmallRng::seed_from_u64(0);
        partition(&mut run, &ranks, 1, &mut rng);
        // Equal keys keep their encounter order: 0 before 2.
        assert_eq!(vec![3, 0, 2, 1], run);
    }

    #[test]
    fn test_partition_sorts_out_of_range_keys_first() {
        let ranks = vec![5, 1, 4, 1, 0, 3];
        let mut run = vec![2, 5];
        // Position 5 has no suffix at offset 1, so it must come first.
        let mut rng = SmallRng::seed_from_u64(0);
        partition(&mut run, &ranks, 1, &mut rng);
        assert_eq!(vec![5, 2], run);
    }

    #[test]
    fn test_refine_reranks_and_freezes_singletons() {
        // One bucket of three A-suffixes of "BANANA$" at slots 1..=3, already
        // partitioned at order 1: position 5 sorts first because its key is
        // the terminator's rank.
        let sa = vec![6, 5, 1, 3, 0, 2, 4];
        let mut ranks = vec![4, 3, 6, 3, 6, 3, 0];
        let mut finalized: BitVec = bitvec::bitvec![0; 7];
        finalized.set(0, true);
        finalized.set(4, true);
        let mut num_finalized = 2;

        refine(&sa, 1, 3, 1, &mut ranks, &mut finalized, &mut num_finalized);

        // Position 5 splits off as a singleton; 1 and 3 still share a bucket.
        assert_eq!(1, ranks[5]);
        assert_eq!(3, ranks[1]);
        assert_eq!(3, ranks[3]);
        assert!(finalized[1]);
        assert!(!finalized[2]);
        assert!(!finalized[3]);
        assert_eq!(3, num_finalized);
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1]));
        assert!(!is_permutation(&[2, 0, 2]));
        assert!(!is_permutation(&[3, 0, 1]));
    }
}
