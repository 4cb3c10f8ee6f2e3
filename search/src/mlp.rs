//! Small feed-forward regressor used by the assistant's fallback path.
//!
//! Two ReLU hidden layers and a linear output, trained with per-sample SGD
//! on mean squared error over standardized inputs and targets. Weights are
//! initialized from a seeded `StdRng`, so training is deterministic.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::policy::AssistantPolicy;

/// Per-column mean and scale.
#[derive(Debug, Clone)]
struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    #[allow(clippy::cast_precision_loss)]
    fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scale = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m) / n;
            }
        }
        // Constant columns keep unit scale.
        for s in &mut scale {
            *s = if *s > f64::EPSILON { s.sqrt() } else { 1.0 };
        }
        Self { mean, scale }
    }

    fn forward(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    fn inverse(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| v * s + m)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Layer {
    /// `weights[o][i]`
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl Layer {
    #[allow(clippy::cast_precision_loss)]
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let bound = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..outputs)
            .map(|_| (0..inputs).map(|_| rng.gen_range(-bound..bound)).collect())
            .collect();
        Self {
            weights,
            bias: vec![0.0; outputs],
        }
    }

    fn apply(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    /// Gradient step for this layer; returns the gradient w.r.t. `input`.
    fn backward(&mut self, input: &[f64], grad_out: &[f64], rate: f64) -> Vec<f64> {
        let mut grad_in = vec![0.0; input.len()];
        for ((row, b), g) in self.weights.iter_mut().zip(&mut self.bias).zip(grad_out) {
            for ((w, x), gi) in row.iter_mut().zip(input).zip(&mut grad_in) {
                *gi += *w * g;
                *w -= rate * g * x;
            }
            *b -= rate * g;
        }
        grad_in
    }
}

fn relu(v: Vec<f64>) -> Vec<f64> {
    v.into_iter().map(|x| x.max(0.0)).collect()
}

/// A trained `X → Y` regressor.
#[derive(Debug, Clone)]
pub struct Regressor {
    x_norm: Standardizer,
    y_norm: Standardizer,
    layers: [Layer; 3],
}

impl Regressor {
    /// Train on `xs → ys`. Returns `None` for an empty or ragged table.
    #[must_use]
    pub fn fit(xs: &[Vec<f64>], ys: &[Vec<f64>], policy: &AssistantPolicy) -> Option<Self> {
        let in_width = xs.first()?.len();
        let out_width = ys.first()?.len();
        if xs.len() != ys.len()
            || in_width == 0
            || out_width == 0
            || xs.iter().any(|r| r.len() != in_width)
            || ys.iter().any(|r| r.len() != out_width)
        {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(policy.seed);
        let hidden = policy.hidden_width;
        let mut model = Self {
            x_norm: Standardizer::fit(xs, in_width),
            y_norm: Standardizer::fit(ys, out_width),
            layers: [
                Layer::new(in_width, hidden, &mut rng),
                Layer::new(hidden, hidden, &mut rng),
                Layer::new(hidden, out_width, &mut rng),
            ],
        };
        let samples: Vec<(Vec<f64>, Vec<f64>)> = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (model.x_norm.forward(x), model.y_norm.forward(y)))
            .collect();

        let mut order: Vec<usize> = (0..samples.len()).collect();
        for _ in 0..policy.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let (x, y) = &samples[i];
                model.step(x, y, policy.learning_rate);
            }
        }
        Some(model)
    }

    #[allow(clippy::cast_precision_loss)]
    fn step(&mut self, x: &[f64], y: &[f64], rate: f64) {
        let h1 = relu(self.layers[0].apply(x));
        let h2 = relu(self.layers[1].apply(&h1));
        let out = self.layers[2].apply(&h2);

        let n = y.len() as f64;
        let grad_out: Vec<f64> = out.iter().zip(y).map(|(o, t)| 2.0 * (o - t) / n).collect();
        let grad_h2 = self.layers[2].backward(&h2, &grad_out, rate);
        let grad_h2: Vec<f64> = grad_h2
            .iter()
            .zip(&h2)
            .map(|(g, h)| if *h > 0.0 { *g } else { 0.0 })
            .collect();
        let grad_h1 = self.layers[1].backward(&h1, &grad_h2, rate);
        let grad_h1: Vec<f64> = grad_h1
            .iter()
            .zip(&h1)
            .map(|(g, h)| if *h > 0.0 { *g } else { 0.0 })
            .collect();
        self.layers[0].backward(x, &grad_h1, rate);
    }

    /// Predict `Y` for one `X` row, in original units.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        let x = self.x_norm.forward(x);
        let h1 = relu(self.layers[0].apply(&x));
        let h2 = relu(self.layers[1].apply(&h1));
        self.y_norm.inverse(&self.layers[2].apply(&h2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AssistantPolicy {
        AssistantPolicy {
            epochs: 400,
            ..AssistantPolicy::default()
        }
    }

    #[test]
    fn ragged_or_empty_tables_are_rejected() {
        assert!(Regressor::fit(&[], &[], &policy()).is_none());
        let xs = vec![vec![1.0], vec![2.0, 3.0]];
        let ys = vec![vec![1.0], vec![2.0]];
        assert!(Regressor::fit(&xs, &ys, &policy()).is_none());
    }

    #[test]
    fn training_is_deterministic() {
        let xs: Vec<Vec<f64>> = (0..6).map(|i| vec![f64::from(i)]).collect();
        let ys: Vec<Vec<f64>> = (0..6).map(|i| vec![f64::from(i * i)]).collect();
        let a = Regressor::fit(&xs, &ys, &policy()).unwrap().predict(&[2.5]);
        let b = Regressor::fit(&xs, &ys, &policy()).unwrap().predict(&[2.5]);
        assert_eq!(a, b);
    }

    #[test]
    fn learns_a_linear_map_inside_the_data() {
        let xs: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let ys: Vec<Vec<f64>> = (0..10).map(|i| vec![2.0 * f64::from(i) + 1.0]).collect();
        let model = Regressor::fit(&xs, &ys, &policy()).unwrap();
        let y = model.predict(&[4.0])[0];
        assert!((y - 9.0).abs() < 2.0, "predicted {y}");
    }

    #[test]
    fn constant_targets_predict_the_constant() {
        let xs = vec![vec![1.0], vec![2.0], vec![3.0]];
        let ys = vec![vec![5.0], vec![5.0], vec![5.0]];
        let y = Regressor::fit(&xs, &ys, &policy()).unwrap().predict(&[2.0])[0];
        assert!((y - 5.0).abs() < 1.0, "predicted {y}");
    }
}
