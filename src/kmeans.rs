//! Full batch k-means (Lloyd) with random initialization and restarts.

use ndarray::{ArrayView2, Axis};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parallel_ops::assign;
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub max_iter: usize,
    /// Stop once the inertia changes by less than this between two iterations.
    pub tol: f64,
    /// Random restarts, the run with the lowest inertia is kept.
    pub n_init: usize,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub n_iter: usize,
}

pub fn fit<R: Rng>(
    data: ArrayView2<f64>,
    number_of_clusters: usize,
    params: &KMeansParams,
    rng: &mut R,
) -> Result<KMeansFit> {
    let n = data.nrows();
    let k = number_of_clusters;
    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            requested: k,
            nodes: n,
        });
    }
    if params.max_iter == 0 || !(params.tol >= 0.0) {
        return Err(Error::InvalidParameter(format!(
            "k-means needs max_iter > 0 and tol >= 0, got {} and {}",
            params.max_iter, params.tol
        )));
    }

    let mut best: Option<KMeansFit> = None;
    for run in 0..params.n_init {
        let seeds = index::sample(rng, n, k).into_vec();
        let result = single_run(data, data.select(Axis(0), &seeds), params);
        trace!(
            "k-means run {}/{}: inertia {:.6} after {} iterations",
            run + 1,
            params.n_init,
            result.inertia,
            result.n_iter
        );
        if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
            best = Some(result);
        }
    }

    best.ok_or_else(|| Error::InvalidParameter("n_init must be positive".into()))
}

fn single_run(data: ArrayView2<f64>, mut centers: Matrix, params: &KMeansParams) -> KMeansFit {
    let mut prev_inertia = f64::INFINITY;
    let mut n_iter = 0;

    for i in 0..params.max_iter {
        let (labels, inertia) = assign(data, centers.view());
        update_centers(data, &labels, &mut centers);
        n_iter = i + 1;

        if (prev_inertia - inertia).abs() < params.tol {
            break;
        }
        prev_inertia = inertia;
    }

    let (labels, inertia) = assign(data, centers.view());
    KMeansFit {
        labels,
        inertia,
        n_iter,
    }
}

/// Moves every center to the mean of its points. Empty clusters keep their center.
fn update_centers(data: ArrayView2<f64>, labels: &[usize], centers: &mut Matrix) {
    let mut sums = Matrix::zeros(centers.dim());
    let mut counts = vec![0usize; centers.nrows()];
    for (point, &label) in data.axis_iter(Axis(0)).zip(labels) {
        let mut sum = sums.row_mut(label);
        sum += &point;
        counts[label] += 1;
    }

    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mean = &sums.row(c) / count as f64;
            centers.row_mut(c).assign(&mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fit, update_centers, KMeansParams};
    use crate::error::Error;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn empty_clusters_keep_their_center() {
        let data = array![[0.0, 0.0], [2.0, 2.0]];
        let mut centers = array![[1.0, 1.0], [9.0, 9.0]];
        update_centers(data.view(), &[0, 0], &mut centers);
        assert_eq!(centers, array![[1.0, 1.0], [9.0, 9.0]]);

        update_centers(data.view(), &[0, 1], &mut centers);
        assert_eq!(centers, array![[0.0, 0.0], [2.0, 2.0]]);
    }

    #[test]
    fn finds_separated_groups() {
        let data = array![[0.0], [0.1], [0.2], [10.0], [10.1], [10.2]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let fitted = fit(data.view(), 2, &KMeansParams::default(), &mut rng).unwrap();
        assert_eq!(fitted.labels[0], fitted.labels[2]);
        assert_eq!(fitted.labels[3], fitted.labels[5]);
        assert_ne!(fitted.labels[0], fitted.labels[3]);
        approx::assert_abs_diff_eq!(fitted.inertia, 0.04, epsilon = 1e-9);
    }

    #[test]
    fn one_center_per_point() {
        let data = array![[0.0], [5.0], [7.0]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let fitted = fit(data.view(), 3, &KMeansParams::default(), &mut rng).unwrap();
        let mut labels = fitted.labels.clone();
        labels.sort();
        assert_eq!(labels, vec![0, 1, 2]);
        approx::assert_abs_diff_eq!(fitted.inertia, 0.0);
    }

    #[test]
    fn rejects_bad_cluster_counts() {
        let data = array![[0.0], [1.0]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        for k in [0, 3] {
            assert!(matches!(
                fit(data.view(), k, &KMeansParams::default(), &mut rng),
                Err(Error::InvalidClusterCount { .. })
            ));
        }
    }
}
