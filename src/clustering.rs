//! Clustering stage: partitions the embedding vectors into groups of similar nodes.
//!
//! The exact strategy is full batch k-means ([`crate::kmeans`]), the approximate one
//! is mini-batch k-means ([`crate::minibatch`]). Either way the raw labels go through
//! [`ClusterAssignment::from_labels`], which drops empty clusters and renumbers the
//! remaining ones densely.

use std::time::Instant;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};
use crate::kmeans::{self, KMeansParams};
use crate::minibatch::{self, MiniBatchParams};
use crate::utils::resolve_seed;
use crate::Matrix;

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum ClusteringMethod {
    #[default]
    #[strum(serialize = "kmeans")]
    #[serde(rename = "kmeans")]
    KMeans,
    #[strum(serialize = "minibatch_kmeans")]
    #[serde(rename = "minibatch_kmeans")]
    MiniBatchKMeans,
}

impl ClusteringMethod {
    /// Parses `kmeans` or `minibatch_kmeans`.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse().map_err(|_| {
            Error::UnsupportedOption(format!(
                "clustering method '{name}', expected 'kmeans' or 'minibatch_kmeans'"
            ))
        })
    }
}

/// Every node paired with its cluster, grouped by cluster.
///
/// Cluster indices run densely over `0..num_clusters()`. Surviving clusters keep the
/// order of their original labels, and nodes are ascending inside a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    pairs: Vec<(usize, usize)>,
    num_clusters: usize,
}

impl ClusterAssignment {
    /// `labels[i]` is the raw cluster label of node `i`.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut distinct = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); distinct.len()];
        for (node, label) in labels.iter().enumerate() {
            if let Ok(cluster) = distinct.binary_search(label) {
                groups[cluster].push(node);
            }
        }

        let pairs = groups
            .into_iter()
            .enumerate()
            .flat_map(|(cluster, group)| group.into_iter().map(move |node| (node, cluster)))
            .collect();

        Self {
            pairs,
            num_clusters: distinct.len(),
        }
    }

    /// Checks that every one of `nodes` nodes is assigned exactly once, to a cluster
    /// below `num_clusters()`.
    pub fn check_partition(&self, nodes: usize) -> Result<()> {
        if self.pairs.len() != nodes {
            return Err(Error::Backend(format!(
                "clustering backend assigned {} of {} nodes",
                self.pairs.len(),
                nodes
            )));
        }

        let mut seen = vec![false; nodes];
        for &(node, cluster) in self.pairs.iter() {
            if node >= nodes || seen[node] {
                return Err(Error::Backend(format!(
                    "node {node} is out of range or assigned twice"
                )));
            }
            if cluster >= self.num_clusters {
                return Err(Error::Backend(format!(
                    "node {node} assigned to cluster {cluster} of {}",
                    self.num_clusters
                )));
            }
            seen[node] = true;
        }
        Ok(())
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn number_of_nodes(&self) -> usize {
        self.pairs.len()
    }

    /// Cluster of every node, indexed by node.
    pub fn cluster_of(&self) -> Vec<usize> {
        let mut cluster_of = vec![0; self.pairs.len()];
        for &(node, cluster) in self.pairs.iter() {
            cluster_of[node] = cluster;
        }
        cluster_of
    }

    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.num_clusters];
        for &(node, cluster) in self.pairs.iter() {
            groups[cluster].push(node);
        }
        groups
    }
}

/// A clustering backend.
pub trait Partition {
    fn partition(
        &self,
        vectors: &Matrix,
        number_of_clusters: usize,
        method: ClusteringMethod,
    ) -> Result<ClusterAssignment>;
}

/// Default clustering backend.
#[derive(Clone, Debug, Default)]
pub struct Cluster {
    seed: Option<u64>,
}

impl Cluster {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    fn seed(&self) -> u64 {
        resolve_seed(self.seed)
    }

    /// Full batch k-means with random initialization, 10 restarts, at most 300
    /// iterations each and a tolerance of 1e-4 on the inertia.
    pub fn kmeans(&self, vectors: &Matrix, number_of_clusters: usize) -> Result<ClusterAssignment> {
        self.kmeans_with(vectors, number_of_clusters, &KMeansParams::default())
    }

    pub fn kmeans_with(
        &self,
        vectors: &Matrix,
        number_of_clusters: usize,
        params: &KMeansParams,
    ) -> Result<ClusterAssignment> {
        check_cluster_count(vectors, number_of_clusters)?;
        let timer = Instant::now();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed());
        let fitted = kmeans::fit(vectors.view(), number_of_clusters, params, &mut rng)?;
        debug!(
            "k-means: {} iterations, inertia {:.6}",
            fitted.n_iter, fitted.inertia
        );
        let assignment = ClusterAssignment::from_labels(&fitted.labels);

        info!(
            "Elapsed time (KMeans clustering): {:.2}s",
            timer.elapsed().as_secs_f64()
        );
        Ok(assignment)
    }

    /// Mini-batch k-means with the parameters of [`MiniBatchParams::for_clusters`].
    pub fn minibatch_kmeans(
        &self,
        vectors: &Matrix,
        number_of_clusters: usize,
    ) -> Result<ClusterAssignment> {
        self.minibatch_kmeans_with(
            vectors,
            number_of_clusters,
            &MiniBatchParams::for_clusters(number_of_clusters),
        )
    }

    pub fn minibatch_kmeans_with(
        &self,
        vectors: &Matrix,
        number_of_clusters: usize,
        params: &MiniBatchParams,
    ) -> Result<ClusterAssignment> {
        check_cluster_count(vectors, number_of_clusters)?;
        let timer = Instant::now();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed());
        let fitted = minibatch::fit(vectors.view(), number_of_clusters, params, &mut rng)?;
        debug!(
            "mini-batch k-means: {} steps, inertia {:.6}",
            fitted.steps, fitted.inertia
        );
        let assignment = ClusterAssignment::from_labels(&fitted.labels);

        info!(
            "Elapsed time (Mini-Batch KMeans clustering): {:.2}s",
            timer.elapsed().as_secs_f64()
        );
        Ok(assignment)
    }
}

impl Partition for Cluster {
    fn partition(
        &self,
        vectors: &Matrix,
        number_of_clusters: usize,
        method: ClusteringMethod,
    ) -> Result<ClusterAssignment> {
        match method {
            ClusteringMethod::KMeans => self.kmeans(vectors, number_of_clusters),
            ClusteringMethod::MiniBatchKMeans => self.minibatch_kmeans(vectors, number_of_clusters),
        }
    }
}

fn check_cluster_count(vectors: &Matrix, number_of_clusters: usize) -> Result<()> {
    let nodes = vectors.nrows();
    if number_of_clusters == 0 || number_of_clusters > nodes {
        return Err(Error::InvalidClusterCount {
            requested: number_of_clusters,
            nodes,
        });
    }
    Ok(())
}
