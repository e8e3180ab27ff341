//! General utilities that don't have a specific home.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::CsrMatrix;

pub fn format_duration(duration: &Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;
    let seconds = seconds % 60;
    let millis = duration.subsec_millis();

    format!(
        "{} hours, {} minutes, {}.{:03} seconds",
        hours, minutes, seconds, millis
    )
}

/// The given seed, or a fresh one from the thread RNG.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) => seed,
        None => {
            let seed = rand::thread_rng().gen();
            debug!("no seed given, drew {}", seed);
            seed
        }
    }
}

/// Splits a master seed into independent embedding and clustering seeds.
pub fn split_seed(seed: Option<u64>) -> (u64, u64) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(resolve_seed(seed));
    (rng.gen(), rng.gen())
}

/// Checks that every row holds exactly one stored entry equal to `1` and that no
/// column is empty, i.e. that `p` is a piecewise constant prolongation.
pub fn is_partition_operator(p: &CsrMatrix) -> bool {
    if !p.is_csr() {
        return false;
    }
    let mut column_used = vec![false; p.cols()];
    for row in p.outer_iterator() {
        if row.nnz() != 1 {
            return false;
        }
        for (col, &val) in row.iter() {
            if val != 1.0 {
                return false;
            }
            column_used[col] = true;
        }
    }
    column_used.into_iter().all(|used| used)
}
