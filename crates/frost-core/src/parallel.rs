//! Independent verification checks, run on the rayon pool when available

use crate::Identifier;

/// Run `check` over `items` and return the first participant it flags
///
/// Results are reported in input order regardless of which check finishes
/// first, so the outcome is deterministic.
pub(crate) fn first_failure<T, F>(items: &[T], check: F) -> Option<Identifier>
where
    T: Sync,
    F: Fn(&T) -> Option<Identifier> + Sync + Send,
{
    #[cfg(feature = "multi-thread")]
    {
        use rayon::prelude::*;
        items.par_iter().find_map_first(check)
    }

    #[cfg(not(feature = "multi-thread"))]
    {
        items.iter().find_map(check)
    }
}
