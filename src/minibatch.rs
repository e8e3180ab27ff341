//! Mini-batch k-means.
//!
//! Centers are moved toward small random batches with a per-center learning rate of
//! `1 / count`. Centers that attract too few points are periodically moved onto
//! batch points, and the run stops once the smoothed batch inertia has not improved
//! for `max_no_improvement` consecutive batches.

use std::cmp::Ordering;

use ndarray::{ArrayView2, Axis};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parallel_ops::assign;
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiniBatchParams {
    /// Points sampled to choose and rank the initial centers.
    pub init_size: usize,
    pub batch_size: usize,
    /// Centers whose count falls below this fraction of the largest count are
    /// reassigned.
    pub reassignment_ratio: f64,
    /// Passes over the data, so `max_iter * n / batch_size` batches at most.
    pub max_iter: usize,
    /// Independent initializations; the one with the lowest inertia on the init
    /// sample is kept.
    pub n_init: usize,
    pub max_no_improvement: usize,
}

impl MiniBatchParams {
    pub fn for_clusters(number_of_clusters: usize) -> Self {
        Self {
            init_size: number_of_clusters * 5,
            batch_size: (number_of_clusters / 20) + 1,
            reassignment_ratio: 1.0,
            max_iter: 500,
            n_init: 2,
            max_no_improvement: 50,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_init == 0 || self.max_iter == 0 || self.batch_size == 0 {
            return Err(Error::InvalidParameter(
                "n_init, max_iter and batch_size must be positive".into(),
            ));
        }
        if !(self.reassignment_ratio >= 0.0 && self.reassignment_ratio.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "reassignment ratio must be non-negative, got {}",
                self.reassignment_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct MiniBatchFit {
    pub centers: Matrix,
    /// Closest final center of every row of the data.
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub steps: usize,
}

pub fn fit<R: Rng>(
    data: ArrayView2<f64>,
    number_of_clusters: usize,
    params: &MiniBatchParams,
    rng: &mut R,
) -> Result<MiniBatchFit> {
    params.validate()?;
    let n = data.nrows();
    let k = number_of_clusters;
    if k == 0 || k > n {
        return Err(Error::InvalidClusterCount {
            requested: k,
            nodes: n,
        });
    }

    let batch_size = params.batch_size.min(n);
    let init_size = params.init_size.min(n).max(k);

    let mut best: Option<(Matrix, f64)> = None;
    for run in 0..params.n_init {
        let valid = index::sample(rng, n, init_size).into_vec();
        let seeds: Vec<usize> = index::sample(rng, init_size, k)
            .into_iter()
            .map(|i| valid[i])
            .collect();
        let centers = data.select(Axis(0), &seeds);
        let (_, inertia) = assign(data.select(Axis(0), &valid).view(), centers.view());
        debug!("init {}/{}: inertia {:.6}", run + 1, params.n_init, inertia);
        if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
            best = Some((centers, inertia));
        }
    }
    let (mut centers, _) =
        best.ok_or_else(|| Error::InvalidParameter("n_init must be positive".into()))?;

    let mut counts = vec![0.0_f64; k];
    let n_steps = ((params.max_iter * n) / batch_size).max(1);
    let mut monitor = ConvergenceMonitor::new(batch_size, n, params.max_no_improvement);
    let mut since_reassign = 0;
    let mut steps = 0;

    for step in 0..n_steps {
        let batch: Vec<usize> = (0..batch_size).map(|_| rng.gen_range(0..n)).collect();
        let batch = data.select(Axis(0), &batch);

        since_reassign += batch_size;
        let random_reassign = counts.iter().any(|&c| c == 0.0) || since_reassign >= 10 * k;
        if random_reassign {
            since_reassign = 0;
        }

        let batch_inertia = minibatch_step(
            batch.view(),
            &mut centers,
            &mut counts,
            random_reassign.then_some(params.reassignment_ratio),
            rng,
        );
        steps = step + 1;

        if monitor.converged(step, batch_inertia / batch_size as f64) {
            debug!(
                "converged (lack of improvement in inertia) at step {}/{}",
                steps, n_steps
            );
            break;
        }
    }

    let (labels, inertia) = assign(data, centers.view());
    Ok(MiniBatchFit {
        centers,
        labels,
        inertia,
        steps,
    })
}

/// Moves the centers toward one batch and returns the batch inertia measured
/// against the centers before the move.
fn minibatch_step<R: Rng>(
    batch: ArrayView2<f64>,
    centers: &mut Matrix,
    counts: &mut [f64],
    reassignment_ratio: Option<f64>,
    rng: &mut R,
) -> f64 {
    let (labels, inertia) = assign(batch, centers.view());

    for (c, count) in counts.iter_mut().enumerate() {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == c)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }
        let new_count = *count + members.len() as f64;
        let mut center = centers.row_mut(c);
        center *= *count;
        for &i in members.iter() {
            center += &batch.row(i);
        }
        center /= new_count;
        *count = new_count;
    }

    if let Some(ratio) = reassignment_ratio.filter(|r| *r > 0.0) {
        reassign_low_count_centers(batch, centers, counts, ratio, rng);
    }

    inertia
}

fn reassign_low_count_centers<R: Rng>(
    batch: ArrayView2<f64>,
    centers: &mut Matrix,
    counts: &mut [f64],
    ratio: f64,
    rng: &mut R,
) {
    let max_count = counts.iter().cloned().fold(0.0, f64::max);
    let mut to_reassign: Vec<bool> = counts.iter().map(|&c| c < ratio * max_count).collect();

    // never move more than half a batch worth of centers at once
    let cap = batch.nrows() / 2;
    if to_reassign.iter().filter(|&&r| r).count() > cap {
        let mut order: Vec<usize> = (0..counts.len()).collect();
        order.sort_by(|&a, &b| counts[a].partial_cmp(&counts[b]).unwrap_or(Ordering::Equal));
        for &c in order[cap..].iter() {
            to_reassign[c] = false;
        }
    }

    let reassigned: Vec<usize> = (0..counts.len()).filter(|&c| to_reassign[c]).collect();
    if reassigned.is_empty() {
        return;
    }

    let picks = index::sample(rng, batch.nrows(), reassigned.len());
    for (&c, pick) in reassigned.iter().zip(picks.into_iter()) {
        centers.row_mut(c).assign(&batch.row(pick));
    }
    trace!("reassigning {} cluster centers", reassigned.len());

    let kept_min = counts
        .iter()
        .zip(to_reassign.iter())
        .filter(|(_, &r)| !r)
        .map(|(&c, _)| c)
        .fold(f64::INFINITY, f64::min);
    if kept_min.is_finite() {
        for &c in reassigned.iter() {
            counts[c] = kept_min;
        }
    }
}

/// Early stopping on an exponentially weighted average of the batch inertia.
struct ConvergenceMonitor {
    alpha: f64,
    max_no_improvement: usize,
    ewa_inertia: Option<f64>,
    ewa_inertia_min: f64,
    no_improvement: usize,
}

impl ConvergenceMonitor {
    fn new(batch_size: usize, n_samples: usize, max_no_improvement: usize) -> Self {
        Self {
            alpha: (batch_size as f64 * 2.0 / (n_samples as f64 + 1.0)).min(1.0),
            max_no_improvement,
            ewa_inertia: None,
            ewa_inertia_min: f64::INFINITY,
            no_improvement: 0,
        }
    }

    fn converged(&mut self, step: usize, batch_inertia: f64) -> bool {
        // the first batch only reflects the initialization
        if step == 0 {
            return false;
        }

        let ewa = match self.ewa_inertia {
            None => batch_inertia,
            Some(ewa) => ewa * (1.0 - self.alpha) + batch_inertia * self.alpha,
        };
        self.ewa_inertia = Some(ewa);

        if ewa < self.ewa_inertia_min {
            self.no_improvement = 0;
            self.ewa_inertia_min = ewa;
        } else {
            self.no_improvement += 1;
        }

        self.max_no_improvement > 0 && self.no_improvement >= self.max_no_improvement
    }
}

#[cfg(test)]
mod tests {
    use super::{fit, ConvergenceMonitor, MiniBatchParams};
    use crate::error::Error;
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn blobs() -> Array2<f64> {
        let mut rows = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (10.0, 10.0), (-10.0, 10.0)] {
            for i in 0..20 {
                let jitter = (i as f64) * 0.01;
                rows.extend_from_slice(&[cx + jitter, cy - jitter]);
            }
        }
        Array2::from_shape_vec((60, 2), rows).unwrap()
    }

    #[test]
    fn default_parameters() {
        let params = MiniBatchParams::for_clusters(45);
        assert_eq!(params.init_size, 225);
        assert_eq!(params.batch_size, 3);
        assert_eq!(params.reassignment_ratio, 1.0);
        assert_eq!(params.max_iter, 500);
        assert_eq!(params.n_init, 2);
        assert_eq!(params.max_no_improvement, 50);
    }

    #[test]
    fn labels_cover_all_points() {
        let data = blobs();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let fitted = fit(data.view(), 3, &MiniBatchParams::for_clusters(3), &mut rng).unwrap();
        assert_eq!(fitted.labels.len(), 60);
        assert!(fitted.labels.iter().all(|&l| l < 3));
        assert_eq!(fitted.centers.dim(), (3, 2));
        assert!(fitted.steps >= 1);
    }

    #[test]
    fn single_cluster_is_the_mean_direction() {
        let data = blobs();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let fitted = fit(data.view(), 1, &MiniBatchParams::for_clusters(1), &mut rng).unwrap();
        assert!(fitted.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn seeded_fits_are_identical() {
        let data = blobs();
        let params = MiniBatchParams::for_clusters(3);
        let a = fit(data.view(), 3, &params, &mut Xoshiro256PlusPlus::seed_from_u64(2)).unwrap();
        let b = fit(data.view(), 3, &params, &mut Xoshiro256PlusPlus::seed_from_u64(2)).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centers, b.centers);
    }

    #[test]
    fn cluster_count_is_checked() {
        let data = array![[0.0], [1.0]];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        for k in [0, 3] {
            assert!(matches!(
                fit(data.view(), k, &MiniBatchParams::for_clusters(k), &mut rng),
                Err(Error::InvalidClusterCount { .. })
            ));
        }
    }

    #[test]
    fn monitor_stops_after_stagnation() {
        let mut monitor = ConvergenceMonitor::new(1, 100, 3);
        assert!(!monitor.converged(0, 10.0));
        assert!(!monitor.converged(1, 5.0));
        assert!(!monitor.converged(2, 6.0));
        assert!(!monitor.converged(3, 6.0));
        assert!(monitor.converged(4, 6.0));
    }
}
