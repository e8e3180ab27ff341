//! Parallel implementations of the dense kernels the clustering stage leans on.
//! These run on the current rayon pool.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Squared euclidean distance.
pub fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest center and the squared distance to it.
pub fn nearest_center(point: ArrayView1<f64>, centers: ArrayView2<f64>) -> (usize, f64) {
    centers
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(c, center)| (c, sq_dist(point, center)))
        .fold((0, f64::INFINITY), |best, cand| {
            if cand.1 < best.1 {
                cand
            } else {
                best
            }
        })
}

/// Labels every row of `data` with its closest center. Returns the labels and the
/// total inertia (sum of squared distances).
pub fn assign(data: ArrayView2<f64>, centers: ArrayView2<f64>) -> (Vec<usize>, f64) {
    assert_eq!(data.ncols(), centers.ncols());
    let nearest: Vec<(usize, f64)> = (0..data.nrows())
        .into_par_iter()
        .map(|i| nearest_center(data.row(i), centers))
        .collect();
    let inertia = nearest.iter().map(|(_, d)| d).sum();
    (nearest.into_iter().map(|(c, _)| c).collect(), inertia)
}

#[cfg(test)]
mod tests {
    use super::{assign, nearest_center};
    use ndarray::array;

    #[test]
    fn assigns_to_closest() {
        let data = array![[0.0, 0.0], [0.2, 0.1], [5.0, 5.0], [4.9, 5.2]];
        let centers = array![[5.0, 5.0], [0.0, 0.0]];
        let (labels, inertia) = assign(data.view(), centers.view());
        assert_eq!(labels, vec![1, 1, 0, 0]);
        approx::assert_abs_diff_eq!(inertia, 0.05 + 0.05, epsilon = 1e-12);
    }

    #[test]
    fn ties_keep_first_center() {
        let centers = array![[1.0], [-1.0]];
        assert_eq!(nearest_center(array![0.0].view(), centers.view()), (0, 1.0));
    }
}
