//! Skip-gram with negative sampling over a corpus of walks.
//!
//! Every node is a word and every walk a sentence. The input vectors (`syn0`) are
//! the embedding, the output vectors (`syn1`) only exist during training.

use ndarray::Array1;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipGramParams {
    /// Largest distance between a node and its context inside a walk.
    pub window: usize,
    /// Negative samples drawn per positive pair.
    pub negative: usize,
    /// Passes over the corpus.
    pub epochs: usize,
    pub learning_rate: f64,
    pub min_learning_rate: f64,
}

impl Default for SkipGramParams {
    fn default() -> Self {
        Self {
            window: 5,
            negative: 5,
            epochs: 5,
            learning_rate: 0.025,
            min_learning_rate: 0.0001,
        }
    }
}

impl SkipGramParams {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(Error::InvalidParameter("window must be positive".into()));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidParameter("epochs must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.min_learning_rate >= 0.0 && self.min_learning_rate <= self.learning_rate) {
            return Err(Error::InvalidParameter(format!(
                "minimum learning rate must lie in [0, {}], got {}",
                self.learning_rate, self.min_learning_rate
            )));
        }
        Ok(())
    }
}

/// Trains `vocab_size x dimensions` vectors over `corpus`.
///
/// The learning rate decays linearly with the number of processed tokens. Negative
/// samples follow the unigram distribution raised to 3/4. Training is sequential so
/// the result only depends on `seed`.
pub fn train(
    corpus: &[Vec<usize>],
    vocab_size: usize,
    dimensions: usize,
    params: &SkipGramParams,
    seed: u64,
) -> Result<Matrix> {
    params.validate()?;
    if dimensions == 0 {
        return Err(Error::InvalidParameter("dimensions must be positive".into()));
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let half_width = 0.5 / dimensions as f64;
    let mut syn0 = Matrix::random_using(
        (vocab_size, dimensions),
        Uniform::new(-half_width, half_width),
        &mut rng,
    );
    let mut syn1 = Matrix::zeros((vocab_size, dimensions));
    if vocab_size == 0 {
        return Ok(syn0);
    }

    let mut counts = vec![0.0_f64; vocab_size];
    for &node in corpus.iter().flatten() {
        counts[node] += 1.0;
    }
    let noise = WeightedIndex::new(counts.iter().map(|c| c.powf(0.75))).ok();

    let tokens: usize = corpus.iter().map(|walk| walk.len()).sum();
    let total = (tokens * params.epochs).max(1) as f64;
    let mut processed = 0usize;
    let mut neu1e = Array1::zeros(dimensions);

    for epoch in 0..params.epochs {
        for walk in corpus {
            for pos in 0..walk.len() {
                let progress = processed as f64 / total;
                let alpha = (params.learning_rate * (1.0 - progress)).max(params.min_learning_rate);
                processed += 1;

                let span = params.window - rng.gen_range(0..params.window);
                let lo = pos.saturating_sub(span);
                let hi = (pos + span + 1).min(walk.len());
                for ctx in lo..hi {
                    if ctx == pos {
                        continue;
                    }
                    neu1e.fill(0.0);
                    let word = walk[pos];
                    let context = walk[ctx];
                    {
                        let l1 = syn0.row(context);
                        for d in 0..=params.negative {
                            let (target, label) = if d == 0 {
                                (word, 1.0)
                            } else {
                                match &noise {
                                    Some(noise) => {
                                        let target = noise.sample(&mut rng);
                                        if target == word {
                                            continue;
                                        }
                                        (target, 0.0)
                                    }
                                    None => break,
                                }
                            };
                            let mut l2 = syn1.row_mut(target);
                            let g = (label - sigmoid(l1.dot(&l2))) * alpha;
                            neu1e.scaled_add(g, &l2);
                            l2.scaled_add(g, &l1);
                        }
                    }
                    let mut row = syn0.row_mut(context);
                    row += &neu1e;
                }
            }
        }
        trace!("skip-gram epoch {} of {} done", epoch + 1, params.epochs);
    }

    Ok(syn0)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::{train, SkipGramParams};
    use crate::error::Error;

    fn cosine(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
        a.dot(&b) / (a.dot(&a).sqrt() * b.dot(&b).sqrt())
    }

    #[test]
    fn shape_and_determinism() {
        let corpus = vec![vec![0, 1, 2], vec![2, 1, 0], vec![3]];
        let params = SkipGramParams::default();
        let a = train(&corpus, 4, 6, &params, 5).unwrap();
        let b = train(&corpus, 4, 6, &params, 5).unwrap();
        assert_eq!(a.dim(), (4, 6));
        assert_eq!(a, b);
    }

    #[test]
    fn co_occurring_nodes_end_up_closer() {
        // two vocabularies that never share a sentence
        let mut corpus = Vec::new();
        for i in 0..200 {
            let shift = i % 3;
            corpus.push((0..6).map(|k| (k + shift) % 3).collect::<Vec<_>>());
            corpus.push((0..6).map(|k| 3 + (k + shift) % 3).collect::<Vec<_>>());
        }
        let vectors = train(&corpus, 6, 8, &SkipGramParams::default(), 9).unwrap();
        let within = cosine(vectors.row(0), vectors.row(1));
        let across = cosine(vectors.row(0), vectors.row(4));
        assert!(within > across, "within {within} across {across}");
    }

    #[test]
    fn rejects_zero_window() {
        let params = SkipGramParams {
            window: 0,
            ..SkipGramParams::default()
        };
        assert!(matches!(
            train(&[vec![0]], 1, 2, &params, 0),
            Err(Error::InvalidParameter(_))
        ));
    }
}
