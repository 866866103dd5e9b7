use std::{collections::HashMap, fmt, sync::Arc};

use serde::Serialize;

use crate::config::ModelConfig;

pub const IMAGE_DIMENSIONS: (u32, u32, u32) = (256, 256, 3);

/// Leaf conditions in the order the classifier emits probabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Label {
    Blight,
    #[serde(rename = "Common_Rust")]
    CommonRust,
    #[serde(rename = "Gray_Leaf_Spot")]
    GrayLeafSpot,
    Healthy,
}

impl Label {
    pub const ALL: [Label; 4] = [
        Label::Blight,
        Label::CommonRust,
        Label::GrayLeafSpot,
        Label::Healthy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Blight => "Blight",
            Label::CommonRust => "Common_Rust",
            Label::GrayLeafSpot => "Gray_Leaf_Spot",
            Label::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Engine(String),
    #[error("Expected {expected} class probabilities, got {actual}")]
    OutputShape { expected: usize, actual: usize },
    #[error("Classifier returned no finite probability")]
    NonFinite,
    #[error("Model support was not compiled into this build")]
    Unsupported,
}

/// A single normalized RGB image laid out as `[1, height, width, channels]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBatch {
    pub data: Vec<f32>,
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl ImageBatch {
    pub fn shape(&self) -> [u64; 4] {
        [
            1,
            self.height as u64,
            self.width as u64,
            self.channels as u64,
        ]
    }
}

/// Inference backend. Calls block, so callers run them off the async runtime.
pub trait Classifier: Send + Sync {
    fn classify(&self, batch: &ImageBatch) -> Result<Vec<f32>, ModelError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "prediction")]
    pub label: Label,
    pub confidence: f64,
}

impl Prediction {
    /// Picks the most probable class. Ties go to the lowest index.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self, ModelError> {
        if probabilities.len() != Label::ALL.len() {
            return Err(ModelError::OutputShape {
                expected: Label::ALL.len(),
                actual: probabilities.len(),
            });
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, &prob) in probabilities.iter().enumerate() {
            if !prob.is_finite() {
                continue;
            }
            match best {
                Some((_, top)) if prob <= top => {}
                _ => best = Some((index, prob)),
            }
        }

        let (index, confidence) = best.ok_or(ModelError::NonFinite)?;
        Ok(Prediction {
            label: Label::ALL[index],
            confidence: f64::from(confidence),
        })
    }
}

/// Picks a signature entry by key, or the only entry when the key is absent.
#[cfg_attr(not(feature = "tensorflow"), allow(dead_code))]
fn select_signature_entry<'a, T>(entries: &'a HashMap<String, T>, key: &str) -> Option<&'a T> {
    match entries.get(key) {
        Some(entry) => Some(entry),
        None if entries.len() == 1 => entries.values().next(),
        None => None,
    }
}

pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ModelError> {
    #[cfg(feature = "tensorflow")]
    {
        let classifier = tf::TfClassifier::load(config)?;
        Ok(Arc::new(classifier))
    }
    #[cfg(not(feature = "tensorflow"))]
    {
        let _ = config;
        Err(ModelError::Unsupported)
    }
}

#[cfg(feature = "tensorflow")]
mod tf {
    use std::{collections::HashMap, fs, sync::Mutex};

    use tensorflow::{
        Graph, ImportGraphDefOptions, SavedModelBundle, Session, SessionOptions, SessionRunArgs,
        Status, Tensor, TensorInfo,
    };

    use super::{select_signature_entry, Classifier, ImageBatch, ModelError};
    use crate::config::ModelConfig;

    const SERVE_TAG: &str = "serve";
    const SIGNATURE_KEY: &str = "serving_default";

    impl From<Status> for ModelError {
        fn from(status: Status) -> Self {
            ModelError::Engine(status.to_string())
        }
    }

    struct Endpoint {
        op: String,
        index: i32,
    }

    struct Inner {
        session: Session,
        graph: Graph,
    }

    /// TensorFlow-backed classifier. Session runs are serialized.
    pub struct TfClassifier {
        inner: Mutex<Inner>,
        input: Endpoint,
        output: Endpoint,
    }

    impl TfClassifier {
        /// Loads a SavedModel directory, or a frozen GraphDef when `path` is a file.
        pub fn load(config: &ModelConfig) -> Result<Self, ModelError> {
            if config.path.is_dir() {
                Self::load_saved_model(config)
            } else {
                Self::load_frozen_graph(config)
            }
        }

        fn load_saved_model(config: &ModelConfig) -> Result<Self, ModelError> {
            let mut graph = Graph::new();
            let bundle = SavedModelBundle::load(
                &SessionOptions::new(),
                [SERVE_TAG],
                &mut graph,
                &config.path,
            )?;

            let signature = bundle.meta_graph_def().get_signature(SIGNATURE_KEY)?;
            let endpoint = |entries: &HashMap<String, TensorInfo>, key: &str, kind: &str| {
                select_signature_entry(entries, key)
                    .map(|info| Endpoint {
                        op: info.name().name.clone(),
                        index: info.name().index,
                    })
                    .ok_or_else(|| {
                        ModelError::Engine(format!(
                            "Signature {SIGNATURE_KEY} has no single {kind} and none named {key}"
                        ))
                    })
            };
            let input = endpoint(signature.inputs(), &config.input_op, "input")?;
            let output = endpoint(signature.outputs(), &config.output_op, "output")?;

            Ok(TfClassifier {
                inner: Mutex::new(Inner {
                    session: bundle.session,
                    graph,
                }),
                input,
                output,
            })
        }

        fn load_frozen_graph(config: &ModelConfig) -> Result<Self, ModelError> {
            let model_bytes = fs::read(&config.path)?;

            let mut graph = Graph::new();
            graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;
            let session = Session::new(&SessionOptions::new(), &graph)?;

            Ok(TfClassifier {
                inner: Mutex::new(Inner { session, graph }),
                input: Endpoint {
                    op: config.input_op.clone(),
                    index: 0,
                },
                output: Endpoint {
                    op: config.output_op.clone(),
                    index: 0,
                },
            })
        }
    }

    impl Classifier for TfClassifier {
        fn classify(&self, batch: &ImageBatch) -> Result<Vec<f32>, ModelError> {
            let mut input_tensor = Tensor::<f32>::new(&batch.shape());
            input_tensor.copy_from_slice(&batch.data);

            let inner = self
                .inner
                .lock()
                .map_err(|_| ModelError::Engine("Classifier session poisoned".to_string()))?;

            let input_operation = inner
                .graph
                .operation_by_name_required(&self.input.op)?;
            let output_operation = inner
                .graph
                .operation_by_name_required(&self.output.op)?;

            let mut args = SessionRunArgs::new();
            args.add_feed(&input_operation, self.input.index, &input_tensor);
            let output_token = args.request_fetch(&output_operation, self.output.index);
            inner.session.run(&mut args)?;

            let output_tensor: Tensor<f32> = args.fetch(output_token)?;
            Ok(output_tensor.to_vec())
        }
    }
}
