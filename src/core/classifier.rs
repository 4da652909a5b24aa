//! Classification of feature vectors.
//!
//! The model itself is opaque: anything implementing [`Model`] can be
//! plugged in. [`Classifier`] enforces the input contract and reduces the
//! model's output distribution to a single label and confidence.

use crate::core::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A read-only model mapping a fixed-length input to label scores.
pub trait Model: Send + Sync {
    /// Number of scalars the model expects.
    fn input_len(&self) -> usize;

    /// Label names in output order.
    fn labels(&self) -> &[String];

    /// Score every label. The output has one entry per label.
    fn predict(&self, input: &[f32]) -> Vec<f32>;
}

/// Result of one classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label_index: usize,
    pub label: String,
    /// Probability of the winning label, in [0, 1]
    pub confidence: f32,
}

/// Errors raised while classifying.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// The vector does not match the model input; a configuration bug
    InputLength { expected: usize, actual: usize },
    /// The model scored a different number of labels than it declares
    OutputLength { expected: usize, actual: usize },
    /// Every score was NaN; the window was unusable
    EmptyOutput,
}

impl ClassifierError {
    /// Whether the model and its inputs disagree on shape. Such errors
    /// repeat on every window, unlike an unusable window.
    pub fn is_contract(&self) -> bool {
        matches!(
            self,
            ClassifierError::InputLength { .. } | ClassifierError::OutputLength { .. }
        )
    }
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::InputLength { expected, actual } => write!(
                f,
                "Feature vector length {actual} does not match model input length {expected}"
            ),
            ClassifierError::OutputLength { expected, actual } => write!(
                f,
                "Model returned {actual} scores for {expected} labels"
            ),
            ClassifierError::EmptyOutput => write!(f, "Model produced no usable scores"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Stateless adapter over a [`Model`].
///
/// Holds no mutable state, so a shared reference can be used from any
/// number of tasks at once.
pub struct Classifier<M> {
    model: M,
}

impl<M: Model> Classifier<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn input_len(&self) -> usize {
        self.model.input_len()
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    /// Classify a vector: argmax over the model output, lowest index on ties.
    pub fn classify(
        &self,
        vector: &FeatureVector,
    ) -> Result<ClassificationResult, ClassifierError> {
        let expected = self.model.input_len();
        let input = vector.as_slice();
        if input.len() != expected {
            return Err(ClassifierError::InputLength {
                expected,
                actual: input.len(),
            });
        }

        let labels = self.model.labels();
        let scores = self.model.predict(input);
        if scores.len() != labels.len() {
            return Err(ClassifierError::OutputLength {
                expected: labels.len(),
                actual: scores.len(),
            });
        }

        let (label_index, confidence) = argmax(&scores).ok_or(ClassifierError::EmptyOutput)?;
        let label = labels[label_index].clone();

        Ok(ClassificationResult {
            label_index,
            label,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// Index and value of the largest score. NaN never wins; ties keep the
/// lowest index.
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (ix, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((ix, score)),
        }
    }
    best
}

/// Errors raised while loading a model.
#[derive(Debug)]
pub enum ModelError {
    Io(String),
    Parse(String),
    Shape(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Io(e) => write!(f, "Failed to read model: {e}"),
            ModelError::Parse(e) => write!(f, "Failed to parse model: {e}"),
            ModelError::Shape(e) => write!(f, "Invalid model shape: {e}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// A single dense layer followed by softmax, stored as JSON.
///
/// ```json
/// { "labels": ["circle", "idle"], "input_len": 3,
///   "weights": [[0.1, 0.2, 0.3], [0.0, 0.0, 0.0]], "bias": [0.0, 1.0] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    labels: Vec<String>,
    input_len: usize,
    /// One row of `input_len` weights per label
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl DenseModel {
    /// Build a model, checking that all dimensions agree.
    pub fn new(
        labels: Vec<String>,
        input_len: usize,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self, ModelError> {
        let model = Self {
            labels,
            input_len,
            weights,
            bias,
        };
        model.check_shape()?;
        Ok(model)
    }

    /// Load a model from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: DenseModel =
            serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))?;
        model.check_shape()?;
        Ok(model)
    }

    fn check_shape(&self) -> Result<(), ModelError> {
        if self.labels.is_empty() {
            return Err(ModelError::Shape("model declares no labels".to_string()));
        }
        if self.input_len == 0 {
            return Err(ModelError::Shape("input_len must be at least 1".to_string()));
        }
        if self.weights.len() != self.labels.len() || self.bias.len() != self.labels.len() {
            return Err(ModelError::Shape(format!(
                "{} labels but {} weight rows and {} biases",
                self.labels.len(),
                self.weights.len(),
                self.bias.len()
            )));
        }
        if let Some(row) = self.weights.iter().position(|w| w.len() != self.input_len) {
            return Err(ModelError::Shape(format!(
                "weight row {row} does not have {} entries",
                self.input_len
            )));
        }
        Ok(())
    }
}

impl Model for DenseModel {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, input: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + bias)
            .collect();
        softmax(&logits)
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Model that ignores its input and returns fixed scores.
    struct FixedModel {
        labels: Vec<String>,
        scores: Vec<f32>,
    }

    impl Model for FixedModel {
        fn input_len(&self) -> usize {
            6
        }
        fn labels(&self) -> &[String] {
            &self.labels
        }
        fn predict(&self, _input: &[f32]) -> Vec<f32> {
            self.scores.clone()
        }
    }

    fn fixed(scores: Vec<f32>) -> Classifier<FixedModel> {
        let labels = (0..scores.len()).map(|i| format!("l{i}")).collect();
        Classifier::new(FixedModel { labels, scores })
    }

    #[test]
    fn test_argmax_picks_highest() {
        let classifier = fixed(vec![0.05, 0.05, 0.05, 0.85]);
        let result = classifier.classify(&FeatureVector::from_vec(vec![0.0; 6])).unwrap();
        assert_eq!(result.label_index, 3);
        assert_eq!(result.label, "l3");
        assert!((result.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_ties_go_to_lowest_index() {
        let classifier = fixed(vec![0.1, 0.4, 0.4, 0.1]);
        let result = classifier.classify(&FeatureVector::from_vec(vec![0.0; 6])).unwrap();
        assert_eq!(result.label_index, 1);
    }

    #[test]
    fn test_nan_never_wins() {
        let classifier = fixed(vec![f32::NAN, 0.2, 0.1]);
        let result = classifier.classify(&FeatureVector::from_vec(vec![0.0; 6])).unwrap();
        assert_eq!(result.label_index, 1);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let classifier = fixed(vec![1.0]);
        let err = classifier
            .classify(&FeatureVector::from_vec(vec![0.0; 5]))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifierError::InputLength {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_empty_output() {
        let classifier = fixed(vec![]);
        assert_eq!(
            classifier.classify(&FeatureVector::from_vec(vec![0.0; 6])),
            Err(ClassifierError::EmptyOutput)
        );
    }

    #[test]
    fn test_all_nan_scores_are_empty_output() {
        let classifier = fixed(vec![f32::NAN, f32::NAN]);
        let err = classifier
            .classify(&FeatureVector::from_vec(vec![0.0; 6]))
            .unwrap_err();
        assert_eq!(err, ClassifierError::EmptyOutput);
        assert!(!err.is_contract());
    }

    #[test]
    fn test_extra_scores_are_rejected() {
        let classifier = Classifier::new(FixedModel {
            labels: vec!["a".to_string(), "b".to_string()],
            scores: vec![0.1, 0.1, 0.8],
        });
        let err = classifier
            .classify(&FeatureVector::from_vec(vec![0.0; 6]))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifierError::OutputLength {
                expected: 2,
                actual: 3
            }
        );
        assert!(err.is_contract());
    }

    #[test]
    fn test_dense_model_softmax() {
        let model = DenseModel::new(
            vec!["a".to_string(), "b".to_string()],
            2,
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0.0, 0.0],
        )
        .unwrap();

        let scores = model.predict(&[2.0, 0.0]);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(scores[0] > scores[1]);

        let classifier = Classifier::new(model);
        let result = classifier
            .classify(&FeatureVector::from_vec(vec![0.0, 3.0]))
            .unwrap();
        assert_eq!(result.label, "b");
    }

    #[test]
    fn test_dense_model_shape_checks() {
        let json = r#"{ "labels": ["a", "b"], "input_len": 2,
                        "weights": [[1.0, 0.0]], "bias": [0.0, 0.0] }"#;
        assert!(matches!(DenseModel::from_json(json), Err(ModelError::Shape(_))));

        let json = r#"{ "labels": ["a"], "input_len": 2,
                        "weights": [[1.0]], "bias": [0.0] }"#;
        assert!(matches!(DenseModel::from_json(json), Err(ModelError::Shape(_))));

        assert!(matches!(DenseModel::from_json("not json"), Err(ModelError::Parse(_))));
    }

    #[test]
    fn test_missing_model_file() {
        let err = DenseModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
