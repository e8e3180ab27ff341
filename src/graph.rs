//! Conversions between the adjacency matrix and the weighted graph that the
//! embedding walks over.
//!
//! Node `i` of the graph is always row/column `i` of the matrix. Only the magnitude of
//! an entry is used as edge weight, so the graph is undirected and non-negative no
//! matter what signs or directions the matrix encodes.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::error::{Error, Result};
use crate::{CsrMatrix, WeightedGraph};

/// Builds the undirected weighted graph of `|mat|`.
///
/// Explicitly stored zeros are not edges. When both `(i, j)` and `(j, i)` are stored
/// they describe the same edge and the lower triangle entry, visited last in row
/// order, sets its weight.
pub fn from_adjacency(mat: &CsrMatrix) -> Result<WeightedGraph> {
    let (rows, cols) = mat.shape();
    if rows != cols {
        return Err(Error::NotSquare { rows, cols });
    }

    let mut graph = WeightedGraph::with_capacity(rows, mat.nnz());
    for _ in 0..rows {
        graph.add_node(());
    }

    for (&val, (i, j)) in mat.iter() {
        let weight = val.abs();
        if weight == 0.0 {
            continue;
        }
        // upper entries only stand in for a missing or zero mirror
        if i < j && mat.get(j, i).map_or(false, |mirror| *mirror != 0.0) {
            continue;
        }
        graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), weight);
    }

    Ok(graph)
}

/// Weighted adjacency lists with neighbors sorted by index, so the walks can test
/// whether two nodes are adjacent with a binary search.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
}

impl NeighborTable {
    pub fn new(graph: &WeightedGraph) -> Self {
        let node_count = graph.node_count();
        let mut neighbors = Vec::with_capacity(node_count);
        let mut weights = Vec::with_capacity(node_count);

        for node in graph.node_indices() {
            let mut adjacent: Vec<(usize, f64)> = graph
                .edges(node)
                .map(|edge| {
                    let other = if edge.source() == node {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    (other.index(), edge.weight().abs())
                })
                .filter(|(_, w)| *w > 0.0)
                .collect();
            adjacent.sort_by_key(|(j, _)| *j);
            adjacent.dedup_by_key(|(j, _)| *j);

            let (ids, ws): (Vec<usize>, Vec<f64>) = adjacent.into_iter().unzip();
            neighbors.push(ids);
            weights.push(ws);
        }

        Self { neighbors, weights }
    }

    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    pub fn weights(&self, node: usize) -> &[f64] {
        &self.weights[node]
    }

    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        self.neighbors[a].binary_search(&b).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::{from_adjacency, NeighborTable};
    use crate::error::Error;
    use sprs::TriMat;

    fn path_laplacian(n: usize) -> crate::CsrMatrix {
        let mut mat = TriMat::new((n, n));
        for i in 0..n {
            mat.add_triplet(i, i, 2.0);
            if i + 1 < n {
                mat.add_triplet(i, i + 1, -1.0);
                mat.add_triplet(i + 1, i, -1.0);
            }
        }
        mat.to_csr::<usize>()
    }

    #[test]
    fn negative_entries_become_positive_weights() {
        let graph = from_adjacency(&path_laplacian(4)).unwrap();
        assert_eq!(graph.node_count(), 4);
        // three path edges plus four diagonal self loops
        assert_eq!(graph.edge_count(), 7);
        assert!(graph.raw_edges().iter().all(|e| e.weight > 0.0));
    }

    #[test]
    fn explicit_zeros_and_isolated_nodes() {
        let mut mat = TriMat::new((3, 3));
        mat.add_triplet(0, 1, 0.0);
        mat.add_triplet(1, 0, 0.0);
        mat.add_triplet(0, 2, 3.0);
        let graph = from_adjacency(&mat.to_csr::<usize>()).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);

        let table = NeighborTable::new(&graph);
        assert!(table.neighbors(1).is_empty());
        assert_eq!(table.neighbors(2), &[0]);
        assert_eq!(table.weights(0), &[3.0]);
        assert!(table.is_adjacent(0, 2));
        assert!(!table.is_adjacent(0, 1));
    }

    #[test]
    fn one_edge_per_stored_pair() {
        let mut mat = TriMat::new((3, 3));
        mat.add_triplet(2, 0, -4.0);
        mat.add_triplet(0, 1, 1.0);
        mat.add_triplet(1, 0, 5.0);
        let graph = from_adjacency(&mat.to_csr::<usize>()).unwrap();
        assert_eq!(graph.edge_count(), 2);

        let table = NeighborTable::new(&graph);
        assert_eq!(table.neighbors(0), &[1, 2]);
        assert_eq!(table.weights(0), &[5.0, 4.0]);
        assert_eq!(table.neighbors(2), &[0]);
    }

    #[test]
    fn rejects_non_square() {
        let mat: TriMat<f64> = TriMat::new((2, 3));
        match from_adjacency(&mat.to_csr::<usize>()) {
            Err(Error::NotSquare { rows: 2, cols: 3 }) => (),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
