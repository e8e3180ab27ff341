//! Node embedding stage.
//!
//! [`Embedder`] owns the graph to embed and [`Embed`] is the seam for embedding
//! backends. The default backend, [`Node2Vec`], trains skip-gram vectors over node2vec
//! walks. Row `i` of the returned matrix is always the vector of node `i`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{self, NeighborTable};
use crate::skipgram::{self, SkipGramParams};
use crate::utils::resolve_seed;
use crate::walks::{generate_walks, WalkParams};
use crate::{CsrMatrix, Matrix, WeightedGraph};

pub(crate) fn default_workers() -> usize {
    1
}

pub(crate) fn default_bias() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub dimensions: usize,
    pub walk_length: usize,
    pub num_walks: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Return parameter, small values make walks backtrack.
    #[serde(default = "default_bias")]
    pub p: f64,
    /// In-out parameter, small values push walks outward (depth first).
    #[serde(default = "default_bias")]
    pub q: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EmbeddingConfig {
    pub fn new(dimensions: usize, walk_length: usize, num_walks: usize) -> Self {
        Self {
            dimensions,
            walk_length,
            num_walks,
            workers: default_workers(),
            p: default_bias(),
            q: default_bias(),
            seed: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_bias(mut self, p: f64, q: f64) -> Self {
        self.p = p;
        self.q = q;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("dimensions", self.dimensions),
            ("walk_length", self.walk_length),
            ("num_walks", self.num_walks),
            ("workers", self.workers),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameter(format!("{name} must be positive")));
            }
        }
        for (name, value) in [("p", self.p), ("q", self.q)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be a positive real, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// An embedding backend: one `config.dimensions` long vector per node, in node order.
pub trait Embed {
    fn train(&self, graph: &WeightedGraph, config: &EmbeddingConfig) -> Result<Matrix>;
}

/// node2vec: biased random walks followed by skip-gram training.
///
/// Walks run on the current rayon pool. Training is single threaded, which keeps a
/// seeded run reproducible whatever the number of workers.
#[derive(Clone, Debug, Default)]
pub struct Node2Vec {
    pub skip_gram: SkipGramParams,
}

impl Node2Vec {
    pub fn new(skip_gram: SkipGramParams) -> Self {
        Self { skip_gram }
    }
}

impl Embed for Node2Vec {
    fn train(&self, graph: &WeightedGraph, config: &EmbeddingConfig) -> Result<Matrix> {
        config.validate()?;
        self.skip_gram.validate()?;

        let seed = resolve_seed(config.seed);

        let table = NeighborTable::new(graph);
        let walk_params = WalkParams {
            walk_length: config.walk_length,
            num_walks: config.num_walks,
            p: config.p,
            q: config.q,
        };
        let corpus = generate_walks(&table, &walk_params, seed);
        skipgram::train(
            &corpus,
            table.node_count(),
            config.dimensions,
            &self.skip_gram,
            seed.wrapping_add(1),
        )
    }
}

/// Holds the graph to embed, derived from an adjacency matrix unless one is given.
pub struct Embedder {
    graph: WeightedGraph,
}

impl Embedder {
    /// A graph or an adjacency matrix should be provided. If both are, the matrix is
    /// ignored.
    pub fn new(adjacency_matrix: Option<&CsrMatrix>, graph: Option<WeightedGraph>) -> Result<Self> {
        match (graph, adjacency_matrix) {
            (Some(graph), _) => Ok(Self { graph }),
            (None, Some(mat)) => Self::from_adjacency(mat),
            (None, None) => Err(Error::MissingInput),
        }
    }

    pub fn from_adjacency(mat: &CsrMatrix) -> Result<Self> {
        Ok(Self {
            graph: graph::from_adjacency(mat)?,
        })
    }

    pub fn from_graph(graph: WeightedGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &WeightedGraph {
        &self.graph
    }

    pub fn number_of_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Embeds the graph with node2vec using a pool of `config.workers` threads.
    pub fn node2vec(&self, config: &EmbeddingConfig) -> Result<Matrix> {
        self.embed_with(config, &Node2Vec::default())
    }

    /// Runs `backend` on a dedicated pool of `config.workers` threads.
    pub fn embed_with<E: Embed + Sync>(&self, config: &EmbeddingConfig, backend: &E) -> Result<Matrix> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()?;
        pool.install(|| self.train(config, backend))
    }

    /// Runs `backend` on the current rayon pool.
    pub fn train<E: Embed>(&self, config: &EmbeddingConfig, backend: &E) -> Result<Matrix> {
        let timer = Instant::now();
        let vectors = backend.train(&self.graph, config)?;
        if vectors.nrows() != self.number_of_nodes() {
            return Err(Error::Backend(format!(
                "embedding backend returned {} vectors for {} nodes",
                vectors.nrows(),
                self.number_of_nodes()
            )));
        }
        info!(
            "Elapsed time (node2vec embedding): {:.2}s",
            timer.elapsed().as_secs_f64()
        );

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::{EmbeddingConfig, Embedder};
    use crate::error::Error;
    use crate::WeightedGraph;
    use sprs::TriMat;

    fn ring(n: usize) -> crate::CsrMatrix {
        let mut mat = TriMat::new((n, n));
        for i in 0..n {
            mat.add_triplet(i, (i + 1) % n, 1.0);
            mat.add_triplet((i + 1) % n, i, 1.0);
        }
        mat.to_csr::<usize>()
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(matches!(Embedder::new(None, None), Err(Error::MissingInput)));
    }

    #[test]
    fn graph_takes_precedence() {
        let mut graph = WeightedGraph::default();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, 2.0);
        let mat = ring(7);
        let embedder = Embedder::new(Some(&mat), Some(graph)).unwrap();
        assert_eq!(embedder.number_of_nodes(), 2);
    }

    #[test]
    fn one_row_per_node() {
        let embedder = Embedder::from_adjacency(&ring(9)).unwrap();
        let config = EmbeddingConfig::new(4, 6, 3).with_seed(1);
        let vectors = embedder.node2vec(&config).unwrap();
        assert_eq!(vectors.dim(), (9, 4));
        assert!(vectors.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn seeded_runs_match_across_worker_counts() {
        let embedder = Embedder::from_adjacency(&ring(12)).unwrap();
        let config = EmbeddingConfig::new(5, 8, 4).with_seed(21);
        let single = embedder.node2vec(&config).unwrap();
        let multi = embedder.node2vec(&config.clone().with_workers(3)).unwrap();
        assert_eq!(single, multi);
    }

    #[test]
    fn invalid_parameters() {
        let embedder = Embedder::from_adjacency(&ring(4)).unwrap();
        let zero_dims = EmbeddingConfig::new(0, 5, 5);
        assert!(matches!(
            embedder.node2vec(&zero_dims),
            Err(Error::InvalidParameter(_))
        ));
        let bad_q = EmbeddingConfig::new(4, 5, 5).with_bias(1.0, -2.0);
        assert!(matches!(
            embedder.node2vec(&bad_q),
            Err(Error::InvalidParameter(_))
        ));
    }
}
