//! Second order biased random walks (node2vec).
//!
//! From the current node `v`, reached from `t`, the walk moves to a neighbor `x` with
//! probability proportional to `w(v, x) * alpha(t, x)` where `alpha` is `1 / p` when
//! `x == t`, `1` when `x` is adjacent to `t` and `1 / q` otherwise. The first step has
//! no previous node and only uses the edge weights.

use indicatif::ProgressBar;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::graph::NeighborTable;

#[derive(Copy, Clone, Debug)]
pub struct WalkParams {
    /// Maximum number of nodes in a walk, start node included.
    pub walk_length: usize,
    /// Number of rounds; every round starts one walk on every node.
    pub num_walks: usize,
    pub p: f64,
    pub q: f64,
}

/// Generates `num_walks * n` walks, round by round.
///
/// The node order is shuffled every round. Each walk draws from its own generator
/// derived from `seed`, the round and the start node, so the corpus is the same no
/// matter how many threads the enclosing rayon pool has.
pub fn generate_walks(table: &NeighborTable, params: &WalkParams, seed: u64) -> Vec<Vec<usize>> {
    let n = table.node_count();
    let mut order: Vec<usize> = (0..n).collect();
    let mut shuffle_rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut walks = Vec::with_capacity(n * params.num_walks);

    let progress = ProgressBar::new(params.num_walks as u64);
    for round in 0..params.num_walks {
        order.shuffle(&mut shuffle_rng);
        let round_walks: Vec<Vec<usize>> = order
            .par_iter()
            .map(|&start| {
                let mut rng = walk_rng(seed, (round * n + start) as u64);
                biased_walk(table, start, params, &mut rng)
            })
            .collect();
        walks.extend(round_walks);
        progress.inc(1);
    }
    progress.finish_and_clear();

    trace!(
        "generated {} walks, {} tokens",
        walks.len(),
        walks.iter().map(|w| w.len()).sum::<usize>()
    );
    walks
}

fn walk_rng(seed: u64, walk_id: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed ^ walk_id.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// A single walk from `start`. Stops early on a node without neighbors.
pub fn biased_walk<R: Rng>(
    table: &NeighborTable,
    start: usize,
    params: &WalkParams,
    rng: &mut R,
) -> Vec<usize> {
    let mut walk = Vec::with_capacity(params.walk_length);
    walk.push(start);
    let mut biased = Vec::new();

    while walk.len() < params.walk_length {
        let len = walk.len();
        let current = walk[len - 1];
        let neighbors = table.neighbors(current);
        if neighbors.is_empty() {
            break;
        }
        let weights = table.weights(current);

        let next = if len == 1 {
            sample(weights, rng)
        } else {
            let previous = walk[len - 2];
            biased.clear();
            biased.extend(neighbors.iter().zip(weights).map(|(&x, &w)| {
                if x == previous {
                    w / params.p
                } else if table.is_adjacent(x, previous) {
                    w
                } else {
                    w / params.q
                }
            }));
            sample(&biased, rng)
        };

        match next {
            Some(idx) => walk.push(neighbors[idx]),
            None => break,
        }
    }

    walk
}

fn sample<R: Rng>(weights: &[f64], rng: &mut R) -> Option<usize> {
    WeightedIndex::new(weights).ok().map(|dist| dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::{biased_walk, generate_walks, WalkParams};
    use crate::graph::{from_adjacency, NeighborTable};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use sprs::TriMat;

    fn star(leaves: usize) -> NeighborTable {
        let n = leaves + 1;
        let mut mat = TriMat::new((n, n));
        for leaf in 1..n {
            mat.add_triplet(0, leaf, 1.0);
            mat.add_triplet(leaf, 0, 1.0);
        }
        NeighborTable::new(&from_adjacency(&mat.to_csr::<usize>()).unwrap())
    }

    fn params(walk_length: usize, num_walks: usize) -> WalkParams {
        WalkParams {
            walk_length,
            num_walks,
            p: 1.0,
            q: 1.0,
        }
    }

    #[test]
    fn walks_follow_edges() {
        let table = star(4);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for start in 0..5 {
            let walk = biased_walk(&table, start, &params(9, 1), &mut rng);
            assert_eq!(walk.len(), 9);
            assert_eq!(walk[0], start);
            for pair in walk.windows(2) {
                assert!(table.is_adjacent(pair[0], pair[1]));
            }
        }
    }

    #[test]
    fn isolated_node_walk_is_just_the_start() {
        let mut mat = TriMat::new((3, 3));
        mat.add_triplet(0, 1, 1.0);
        mat.add_triplet(1, 0, 1.0);
        let table = NeighborTable::new(&from_adjacency(&mat.to_csr::<usize>()).unwrap());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert_eq!(biased_walk(&table, 2, &params(10, 1), &mut rng), vec![2]);
    }

    #[test]
    fn small_p_forces_backtracking() {
        // on a star every leaf has a single neighbor, from the hub a tiny p makes
        // returning to the previous leaf overwhelmingly likely
        let table = star(6);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let walk_params = WalkParams {
            walk_length: 3,
            num_walks: 1,
            p: 1e-9,
            q: 1.0,
        };
        for _ in 0..20 {
            let walk = biased_walk(&table, 1, &walk_params, &mut rng);
            assert_eq!(walk, vec![1, 0, 1]);
        }
    }

    #[test]
    fn corpus_is_seeded_and_complete() {
        let table = star(5);
        let a = generate_walks(&table, &params(6, 3), 11);
        let b = generate_walks(&table, &params(6, 3), 11);
        assert_eq!(a, b);
        assert_eq!(a.len(), 18);

        let mut starts: Vec<usize> = a[..6].iter().map(|w| w[0]).collect();
        starts.sort();
        assert_eq!(starts, (0..6).collect::<Vec<_>>());
    }
}
