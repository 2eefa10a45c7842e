// gan-core/src/model/mod.rs

//! Model collaborators.
//!
//! The coordination code only sees these traits: a model builds an
//! independent training graph or evaluation graph over an input pipeline,
//! and graphs exchange state through serialized [`Variables`].

pub mod translator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dataset::{Fetch, InputPipeline};
use crate::error::{Result, TrainError};

pub use translator::AffineTranslator;

/// Model parameters together with the global step they were trained to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    pub global_step: u64,
    pub tensors: BTreeMap<String, Vec<f32>>,
}

impl Variables {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| TrainError::serialization(format!("failed to encode variables: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| TrainError::serialization(format!("failed to decode variables: {e}")))
    }

    /// Returns the named tensor, or a model error if it is missing.
    pub fn tensor(&self, name: &str) -> Result<&[f32]> {
        self.tensors
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| TrainError::model(format!("missing variable '{name}'")))
    }
}

/// Scalar summaries keyed by tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary {
    values: BTreeMap<String, f64>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: f64) {
        self.values.insert(tag.into(), value);
    }

    pub fn get(&self, tag: &str) -> Option<f64> {
        self.values.get(tag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, f64)> for Summary {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Builds training and evaluation graphs. Each call returns a fresh graph
/// that shares no mutable state with any other.
pub trait GanModel: Send + Sync {
    fn build_training_graph(
        &self,
        inputs: Box<dyn InputPipeline>,
        learning_rate: f32,
    ) -> Result<Box<dyn TrainGraph>>;

    fn build_evaluation_graph(&self, inputs: Box<dyn InputPipeline>) -> Result<Box<dyn EvalGraph>>;
}

pub trait TrainGraph: Send {
    fn global_step(&self) -> u64;

    /// Runs one optimization step and returns the new global step.
    ///
    /// Returns [`Fetch::Exhausted`] once the input pipeline has no more data.
    fn train_step(&mut self) -> Result<Fetch<u64>>;

    /// Scalar summaries from the most recent step.
    fn summary(&self) -> Summary;

    fn variables(&self) -> Variables;

    fn restore(&mut self, variables: Variables) -> Result<()>;
}

pub trait EvalGraph: Send {
    fn restore(&mut self, variables: Variables) -> Result<()>;

    /// Evaluates one batch.
    fn eval_step(&mut self) -> Result<Fetch<Summary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variables_bytes() {
        let mut variables = Variables {
            global_step: 42,
            ..Default::default()
        };
        variables.tensors.insert("w".to_string(), vec![1.0, -2.5]);

        let decoded = Variables::from_bytes(&variables.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, variables);
        assert_eq!(decoded.tensor("w").unwrap(), &[1.0, -2.5]);
        assert!(decoded.tensor("b").is_err());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = Variables::from_bytes(&[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("failed to decode variables"));
    }

    #[test]
    fn test_summary_serializes_as_map() {
        let mut summary = Summary::new();
        summary.insert("loss", 0.5);
        assert_eq!(serde_json::to_string(&summary).unwrap(), r#"{"loss":0.5}"#);
    }
}
