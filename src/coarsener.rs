//! Orchestration of the coarsening pipeline and assembly of the prolongation.
//!
//! The stages run strictly one after another inside a single rayon pool of
//! `workers` threads. An error in any stage aborts the pipeline, no partial
//! operator is ever returned.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::clustering::{Cluster, ClusterAssignment, ClusteringMethod, Partition};
use crate::embedding::{default_bias, default_workers, Embed, Embedder, EmbeddingConfig, Node2Vec};
use crate::error::{Error, Result};
use crate::utils::{format_duration, split_seed};
use crate::{CooMatrix, CsrMatrix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarsenConfig {
    pub dimensions: usize,
    pub walk_length: usize,
    pub num_walks: usize,
    pub p: f64,
    pub q: f64,
    /// Defaults to `max(1, n / 5)`.
    pub number_of_clusters: Option<usize>,
    pub clustering_method: ClusteringMethod,
    pub workers: usize,
    /// Master seed, split into an embedding seed and a clustering seed. Without one
    /// every run draws a fresh seed and results are not reproducible.
    pub seed: Option<u64>,
}

impl Default for CoarsenConfig {
    fn default() -> Self {
        Self::new(128, 80, 10)
    }
}

impl CoarsenConfig {
    pub fn new(dimensions: usize, walk_length: usize, num_walks: usize) -> Self {
        Self {
            dimensions,
            walk_length,
            num_walks,
            p: default_bias(),
            q: default_bias(),
            number_of_clusters: None,
            clustering_method: ClusteringMethod::default(),
            workers: default_workers(),
            seed: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn with_bias(mut self, p: f64, q: f64) -> Self {
        self.p = p;
        self.q = q;
        self
    }

    pub fn with_clusters(mut self, number_of_clusters: usize) -> Self {
        self.number_of_clusters = Some(number_of_clusters);
        self
    }

    pub fn with_method(mut self, clustering_method: ClusteringMethod) -> Self {
        self.clustering_method = clustering_method;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn embedding_config(&self, seed: u64) -> EmbeddingConfig {
        EmbeddingConfig::new(self.dimensions, self.walk_length, self.num_walks)
            .with_workers(self.workers)
            .with_bias(self.p, self.q)
            .with_seed(seed)
    }

    pub fn cluster_count(&self, nodes: usize) -> usize {
        self.number_of_clusters
            .unwrap_or_else(|| default_cluster_count(nodes))
    }
}

/// One coarse node per five fine nodes, and at least one.
pub fn default_cluster_count(nodes: usize) -> usize {
    (nodes / 5).max(1)
}

pub struct Coarsener {
    mat: CsrMatrix,
}

impl Coarsener {
    /// `mat` is the (square) adjacency matrix of the fine graph.
    pub fn new(mat: CsrMatrix) -> Self {
        Self { mat }
    }

    pub fn mat(&self) -> &CsrMatrix {
        &self.mat
    }

    /// Builds the `n x k'` prolongation with node2vec and the configured clustering.
    pub fn apply(&self, config: &CoarsenConfig) -> Result<CsrMatrix> {
        let (embedding_seed, clustering_seed) = split_seed(config.seed);
        self.prolongation(
            config,
            embedding_seed,
            &Node2Vec::default(),
            &Cluster::new(Some(clustering_seed)),
        )
    }

    /// Same as [`Coarsener::apply`] with caller provided backends. The partition
    /// backend is responsible for its own seeding.
    pub fn apply_with<E, P>(&self, config: &CoarsenConfig, embed: &E, partition: &P) -> Result<CsrMatrix>
    where
        E: Embed + Sync,
        P: Partition + Sync,
    {
        let (embedding_seed, _) = split_seed(config.seed);
        self.prolongation(config, embedding_seed, embed, partition)
    }

    /// The prolongation together with the restriction and the coarse matrix.
    pub fn coarsen(&self, config: &CoarsenConfig) -> Result<Coarsening> {
        let p = self.apply(config)?;
        Coarsening::new(&self.mat, p)
    }

    fn prolongation<E, P>(
        &self,
        config: &CoarsenConfig,
        embedding_seed: u64,
        embed: &E,
        partition: &P,
    ) -> Result<CsrMatrix>
    where
        E: Embed + Sync,
        P: Partition + Sync,
    {
        let embedder = Embedder::from_adjacency(&self.mat)?;
        let embedding_config = config.embedding_config(embedding_seed);
        embedding_config.validate()?;

        let nodes = embedder.number_of_nodes();
        let number_of_clusters = config.cluster_count(nodes);
        if number_of_clusters == 0 || number_of_clusters > nodes {
            return Err(Error::InvalidClusterCount {
                requested: number_of_clusters,
                nodes,
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()?;

        let timer = Instant::now();
        let assignment = pool.install(|| -> Result<ClusterAssignment> {
            let vectors = embedder.train(&embedding_config, embed)?;
            partition.partition(&vectors, number_of_clusters, config.clustering_method)
        })?;

        assignment.check_partition(nodes)?;
        let p = prolongation_from_assignment(nodes, &assignment);
        info!(
            "coarsened {} nodes into {} clusters ({} requested) in {}",
            nodes,
            p.cols(),
            number_of_clusters,
            format_duration(&timer.elapsed())
        );
        Ok(p)
    }
}

/// Sets `p[node, cluster] = 1` for every assigned node. `assignment` must pass
/// [`ClusterAssignment::check_partition`] for `nodes`.
pub fn prolongation_from_assignment(nodes: usize, assignment: &ClusterAssignment) -> CsrMatrix {
    let mut p = CooMatrix::new((nodes, assignment.num_clusters()));
    for &(node, cluster) in assignment.pairs() {
        p.add_triplet(node, cluster, 1.0);
    }
    p.to_csr::<usize>()
}

/// One coarsening level: `A_c = R A P` with `R = P^T`.
pub struct Coarsening {
    pub p: CsrMatrix,
    pub r: CsrMatrix,
    pub coarse: CsrMatrix,
    fine_size: usize,
    fine_nnz: usize,
}

impl Coarsening {
    pub fn new(mat: &CsrMatrix, p: CsrMatrix) -> Result<Self> {
        let (rows, cols) = mat.shape();
        if rows != cols {
            return Err(Error::NotSquare { rows, cols });
        }
        if p.rows() != cols {
            return Err(Error::InvalidParameter(format!(
                "prolongation has {} rows, the matrix has {} columns",
                p.rows(),
                cols
            )));
        }

        let r = p.transpose_view().to_csr();
        let coarse = &r * &(mat * &p);
        Ok(Self {
            p,
            r,
            coarse,
            fine_size: rows,
            fine_nnz: mat.nnz(),
        })
    }

    pub fn summary(&self) -> CoarseningSummary {
        let coarse_size = self.coarse.rows();
        CoarseningSummary {
            fine_size: self.fine_size,
            coarse_size,
            fine_nnz: self.fine_nnz,
            coarse_nnz: self.coarse.nnz(),
            coarsening_factor: if coarse_size == 0 {
                0.0
            } else {
                self.fine_size as f64 / coarse_size as f64
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoarseningSummary {
    pub fine_size: usize,
    pub coarse_size: usize,
    pub fine_nnz: usize,
    pub coarse_nnz: usize,
    pub coarsening_factor: f64,
}

#[cfg(test)]
extern crate test_generator;
