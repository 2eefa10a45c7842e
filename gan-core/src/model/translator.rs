// gan-core/src/model/translator.rs

//! Baseline two-way translator.
//!
//! Each direction is an affine pixel map `y = scale * x + bias` trained so the
//! translated batch matches the mean and standard deviation of the target
//! domain batch. It is small enough to run anywhere and exercises the whole
//! checkpoint and evaluation path.

use std::collections::BTreeMap;

use crate::dataset::{Fetch, InputPipeline, PairedBatch};
use crate::error::{Result, TrainError};

use super::{EvalGraph, GanModel, Summary, TrainGraph, Variables};

const A2B_SCALE: &str = "a2b/scale";
const A2B_BIAS: &str = "a2b/bias";
const B2A_SCALE: &str = "b2a/scale";
const B2A_BIAS: &str = "b2a/bias";

#[derive(Debug, Clone, Copy, Default)]
pub struct AffineTranslator;

impl AffineTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl GanModel for AffineTranslator {
    fn build_training_graph(
        &self,
        inputs: Box<dyn InputPipeline>,
        learning_rate: f32,
    ) -> Result<Box<dyn TrainGraph>> {
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(TrainError::model(format!(
                "learning rate must be positive, got {learning_rate}"
            )));
        }
        Ok(Box::new(TranslatorTrainGraph {
            inputs,
            params: Params::identity(),
            learning_rate: f64::from(learning_rate),
            global_step: 0,
            last_summary: Summary::new(),
        }))
    }

    fn build_evaluation_graph(&self, inputs: Box<dyn InputPipeline>) -> Result<Box<dyn EvalGraph>> {
        Ok(Box::new(TranslatorEvalGraph {
            inputs,
            params: None,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Direction {
    scale: f64,
    bias: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Params {
    a2b: Direction,
    b2a: Direction,
}

impl Params {
    fn identity() -> Self {
        let identity = Direction {
            scale: 1.0,
            bias: 0.0,
        };
        Self {
            a2b: identity,
            b2a: identity,
        }
    }

    fn to_variables(self, global_step: u64) -> Variables {
        let tensors: BTreeMap<String, Vec<f32>> = [
            (A2B_SCALE, self.a2b.scale),
            (A2B_BIAS, self.a2b.bias),
            (B2A_SCALE, self.b2a.scale),
            (B2A_BIAS, self.b2a.bias),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), vec![value as f32]))
        .collect();

        Variables {
            global_step,
            tensors,
        }
    }

    fn from_variables(variables: &Variables) -> Result<Self> {
        let scalar = |name: &str| -> Result<f64> {
            match variables.tensor(name)? {
                [value] => Ok(f64::from(*value)),
                other => Err(TrainError::model(format!(
                    "variable '{name}' should hold 1 value, found {}",
                    other.len()
                ))),
            }
        };

        Ok(Self {
            a2b: Direction {
                scale: scalar(A2B_SCALE)?,
                bias: scalar(A2B_BIAS)?,
            },
            b2a: Direction {
                scale: scalar(B2A_SCALE)?,
                bias: scalar(B2A_BIAS)?,
            },
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Moments {
    mean: f64,
    std: f64,
}

fn moments(images: &[Vec<f32>]) -> Moments {
    let count = images.iter().map(Vec::len).sum::<usize>().max(1) as f64;
    let mean = images.iter().flatten().map(|&p| f64::from(p)).sum::<f64>() / count;
    let var = images
        .iter()
        .flatten()
        .map(|&p| (f64::from(p) - mean).powi(2))
        .sum::<f64>()
        / count;
    Moments {
        mean,
        std: var.sqrt(),
    }
}

/// Moment-matching loss and its gradient with respect to `(scale, bias)`.
fn loss_and_grad(dir: Direction, source: Moments, target: Moments) -> (f64, f64, f64) {
    let mean_err = dir.scale * source.mean + dir.bias - target.mean;
    let std_err = dir.scale.abs() * source.std - target.std;
    let loss = mean_err.powi(2) + std_err.powi(2);

    let d_bias = 2.0 * mean_err;
    let d_scale = 2.0 * mean_err * source.mean + 2.0 * std_err * source.std * dir.scale.signum();
    (loss, d_scale, d_bias)
}

fn batch_losses(params: &Params, batch: &PairedBatch) -> (Moments, Moments, f64, f64) {
    let a = moments(&batch.domain_a);
    let b = moments(&batch.domain_b);
    let (loss_a2b, _, _) = loss_and_grad(params.a2b, a, b);
    let (loss_b2a, _, _) = loss_and_grad(params.b2a, b, a);
    (a, b, loss_a2b, loss_b2a)
}

fn loss_summary(loss_a2b: f64, loss_b2a: f64) -> Summary {
    let mut summary = Summary::new();
    summary.insert("loss/a2b", loss_a2b);
    summary.insert("loss/b2a", loss_b2a);
    summary.insert("loss/total", loss_a2b + loss_b2a);
    summary
}

struct TranslatorTrainGraph {
    inputs: Box<dyn InputPipeline>,
    params: Params,
    learning_rate: f64,
    global_step: u64,
    last_summary: Summary,
}

impl TrainGraph for TranslatorTrainGraph {
    fn global_step(&self) -> u64 {
        self.global_step
    }

    fn train_step(&mut self) -> Result<Fetch<u64>> {
        let batch = match self.inputs.next_batch()? {
            Fetch::Item(batch) => batch,
            Fetch::Exhausted => return Ok(Fetch::Exhausted),
        };

        let (a, b, loss_a2b, loss_b2a) = batch_losses(&self.params, &batch);
        let lr = self.learning_rate;
        for (dir, source, target) in [(&mut self.params.a2b, a, b), (&mut self.params.b2a, b, a)] {
            let (_, d_scale, d_bias) = loss_and_grad(*dir, source, target);
            dir.scale -= lr * d_scale;
            dir.bias -= lr * d_bias;
        }

        self.global_step += 1;
        self.last_summary = loss_summary(loss_a2b, loss_b2a);
        Ok(Fetch::Item(self.global_step))
    }

    fn summary(&self) -> Summary {
        self.last_summary.clone()
    }

    fn variables(&self) -> Variables {
        self.params.to_variables(self.global_step)
    }

    fn restore(&mut self, variables: Variables) -> Result<()> {
        self.params = Params::from_variables(&variables)?;
        self.global_step = variables.global_step;
        Ok(())
    }
}

struct TranslatorEvalGraph {
    inputs: Box<dyn InputPipeline>,
    params: Option<Params>,
}

impl EvalGraph for TranslatorEvalGraph {
    fn restore(&mut self, variables: Variables) -> Result<()> {
        self.params = Some(Params::from_variables(&variables)?);
        Ok(())
    }

    fn eval_step(&mut self) -> Result<Fetch<Summary>> {
        let params = self
            .params
            .ok_or_else(|| TrainError::model("evaluation graph used before restore"))?;

        match self.inputs.next_batch()? {
            Fetch::Item(batch) => {
                let (_, _, loss_a2b, loss_b2a) = batch_losses(&params, &batch);
                Ok(Fetch::Item(loss_summary(loss_a2b, loss_b2a)))
            }
            Fetch::Exhausted => Ok(Fetch::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields `remaining` copies of one batch.
    struct FixedPipeline {
        batch: PairedBatch,
        remaining: usize,
    }

    impl InputPipeline for FixedPipeline {
        fn next_batch(&mut self) -> Result<Fetch<PairedBatch>> {
            if self.remaining == 0 {
                return Ok(Fetch::Exhausted);
            }
            self.remaining -= 1;
            Ok(Fetch::Item(self.batch.clone()))
        }
    }

    fn pipeline(remaining: usize) -> Box<dyn InputPipeline> {
        Box::new(FixedPipeline {
            batch: PairedBatch {
                domain_a: vec![vec![-0.5, -0.3], vec![-0.4, -0.6]],
                domain_b: vec![vec![0.5, 0.9], vec![0.1, 0.7]],
            },
            remaining,
        })
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut graph = AffineTranslator::new()
            .build_training_graph(pipeline(200), 0.1)
            .unwrap();

        graph.train_step().unwrap();
        let first = graph.summary().get("loss/total").unwrap();
        for _ in 0..150 {
            graph.train_step().unwrap();
        }
        let last = graph.summary().get("loss/total").unwrap();

        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert_eq!(graph.global_step(), 151);
    }

    #[test]
    fn test_train_step_exhaustion() {
        let mut graph = AffineTranslator::new()
            .build_training_graph(pipeline(2), 0.01)
            .unwrap();

        assert_eq!(graph.train_step().unwrap(), Fetch::Item(1));
        assert_eq!(graph.train_step().unwrap(), Fetch::Item(2));
        assert_eq!(graph.train_step().unwrap(), Fetch::Exhausted);
        assert_eq!(graph.global_step(), 2);
    }

    #[test]
    fn test_restore_into_fresh_graph() {
        let model = AffineTranslator::new();
        let mut trained = model.build_training_graph(pipeline(10), 0.1).unwrap();
        for _ in 0..10 {
            trained.train_step().unwrap();
        }
        let variables = trained.variables();
        assert_eq!(variables.global_step, 10);

        let mut fresh = model.build_training_graph(pipeline(0), 0.1).unwrap();
        fresh.restore(variables.clone()).unwrap();
        assert_eq!(fresh.global_step(), 10);
        assert_eq!(fresh.variables(), variables);
    }

    #[test]
    fn test_eval_requires_restore() {
        let mut graph = AffineTranslator::new()
            .build_evaluation_graph(pipeline(1))
            .unwrap();
        assert!(graph.eval_step().is_err());

        graph.restore(Params::identity().to_variables(0)).unwrap();
        let summary = graph.eval_step().unwrap().item().unwrap();
        assert!(summary.get("loss/total").unwrap() > 0.0);
        assert!(graph.eval_step().unwrap().is_exhausted());
    }

    #[test]
    fn test_restore_rejects_missing_tensor() {
        let mut graph = AffineTranslator::new()
            .build_evaluation_graph(pipeline(1))
            .unwrap();
        let err = graph.restore(Variables::default()).unwrap_err();
        assert!(err.to_string().contains("missing variable"));
    }

    #[test]
    fn test_invalid_learning_rate() {
        assert!(AffineTranslator::new()
            .build_training_graph(pipeline(1), 0.0)
            .is_err());
    }
}
