//! Graph learning based coarsening for multigrid style solvers.
//!
//! <br>
//!
//! Given a large weighted graph stored as a sparse adjacency matrix, this library
//! builds a much smaller coarse graph that keeps the structure of the original one.
//! The coarse graph is described by a piecewise constant prolongation operator `P`
//! (a sparse 0/1 matrix of shape `N x K'`) which maps each fine node to exactly one
//! coarse node. The restriction is `P^T` and the Galerkin coarse matrix is `P^T A P`.
//!
//! The construction has three stages, each behind a narrow trait so alternative
//! backends can be plugged in:
//!
//! 1. [`embedding`]: every node is embedded into a `D` dimensional space with node2vec
//!    (second order biased random walks followed by skip-gram training), so that nodes
//!    with similar neighborhoods land close together.
//! 2. [`clustering`]: the embedding vectors are partitioned into `K` groups with
//!    k-means or mini-batch k-means. Empty clusters are
//!    dropped and the remaining ones renumbered, so `K' <= K`.
//! 3. [`coarsener`]: the cluster assignment is turned into the operator in `O(N)`.
//!
//! Randomness (walk sampling, negative sampling, cluster initialization) is driven by
//! an explicit seed in the configuration. Runs with the same seed, input and
//! configuration produce the same operator. Without a seed every run draws a fresh one.
//!
//! ```no_run
//! use gl_coarsener::{coarsener::{CoarsenConfig, Coarsener}, CsrMatrix};
//!
//! let mat: CsrMatrix = sprs::io::read_matrix_market::<f64, usize, _>("graph.mtx")
//!     .unwrap()
//!     .to_csr::<usize>();
//! let config = CoarsenConfig::new(16, 20, 10).with_seed(42);
//! let p = Coarsener::new(mat).apply(&config).unwrap();
//! assert!(p.rows() >= p.cols());
//! ```

use ndarray::Array2;
use petgraph::graph::UnGraph;
use sprs::{CsMatBase, TriMatBase};

#[macro_use]
extern crate log;

pub mod clustering;
pub mod coarsener;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod kmeans;
pub mod minibatch;
pub mod parallel_ops;
pub mod skipgram;
pub mod utils;
pub mod walks;

pub use error::{Error, Result};

pub type CsrMatrix = CsMatBase<f64, usize, Vec<usize>, Vec<usize>, Vec<f64>, usize>;
pub type CooMatrix = TriMatBase<Vec<usize>, Vec<f64>>;
pub type Matrix = Array2<f64>;
pub type WeightedGraph = UnGraph<(), f64>;
