#![doc = include_str!("../README.md")]

use std::fmt::Debug;

use anyhow::Result;

mod alphabet;
mod doubling;
mod verify;

pub use alphabet::Alphabet;
pub use doubling::{SuffixArray, SuffixArrayBuilder};
pub use verify::{verify_order, OrderViolation};

/// Builds the suffix array of `seq` over `alphabet` in one call.
///
/// Equivalent to constructing a [`SuffixArrayBuilder`] and running it with
/// an entropy-seeded generator.
///
/// # Errors
///
/// Fails if `seq` contains a symbol outside `alphabet`, is empty, or does
/// not end with a unique terminator (see [`SuffixArrayBuilder::new`]).
///
/// # Examples
///
/// ```rust
/// use sa_doubling::{make_suffix_array, Alphabet};
///
/// let alphabet = Alphabet::new(*b"$ABN")?;
/// let sa = make_suffix_array(b"BANANA$", &alphabet)?;
/// assert_eq!(sa.positions(), [6, 5, 3, 1, 0, 4, 2]);
/// assert_eq!(sa.ranks(), [4, 3, 6, 2, 5, 1, 0]);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn make_suffix_array<S>(seq: &[S], alphabet: &Alphabet<S>) -> Result<SuffixArray>
where
    S: Ord + Copy + Debug,
{
    Ok(SuffixArrayBuilder::new(seq, alphabet)?.build())
}
