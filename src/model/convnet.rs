//! Convolutional backend on `burn`
//!
//! Builds the layer stack of a [`ConvNetSpec`] as a `burn` module and trains
//! it with plain SGD on sigmoid cross-entropy (`BinaryCrossEntropyLoss` with
//! logits). Convolution stages are conv → ReLU → max-pool → dropout, dense
//! stages are linear → ReLU → dropout; absent pieces are skipped.
//!
//! Convolutions pad `kernel / 2` on every side, which for odd kernels gives
//! the `ceil(n / stride)` output of "same" padding. Dropout is active only on
//! the autodiff backend, so [`Classifier::forward`] runs the inner
//! (inference) module.
//!
//! Checkpoints live in the model directory as `convnet.mpk` (named
//! MessagePack record, full precision) plus `convnet.json` (step count and
//! parameter count, checked on warm start).

use super::architecture::{Activation, ConvNetSpec, Layer, Shape};
use super::{Classifier, DEFAULT_LEARNING_RATE};
use crate::pipeline::Batch;
use crate::transform::{CROPPED_ROWS, SIGNAL_COLS};
use crate::{Error, Result};
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CPU training backend used by the command line.
pub type TrainBackend = Autodiff<NdArray<f32>>;

/// Record stem inside the model directory (the recorder appends `.mpk`)
const WEIGHTS_STEM: &str = "convnet";
/// Checkpoint metadata file inside the model directory
const META_FILE: &str = "convnet.json";

type Recorder = NamedMpkFileRecorder<FullPrecisionSettings>;
type SgdAdaptor<B> = OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, ConvNet<B>, B>;

/// conv → ReLU → pool → dropout
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    relu: Option<Relu>,
    pool: Option<MaxPool2d>,
    dropout: Option<Dropout>,
}

impl<B: Backend> ConvStage<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv.forward(input);
        if let Some(relu) = &self.relu {
            x = relu.forward(x);
        }
        if let Some(pool) = &self.pool {
            x = pool.forward(x);
        }
        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }
}

/// linear → ReLU → dropout
#[derive(Module, Debug)]
pub struct DenseStage<B: Backend> {
    linear: Linear<B>,
    relu: Option<Relu>,
    dropout: Option<Dropout>,
}

impl<B: Backend> DenseStage<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.linear.forward(input);
        if let Some(relu) = &self.relu {
            x = relu.forward(x);
        }
        match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        }
    }
}

/// The network: convolution stages, flatten, dense stages ending in one logit.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    convs: Vec<ConvStage<B>>,
    dense: Vec<DenseStage<B>>,
}

fn relu(activation: Activation) -> Option<Relu> {
    matches!(activation, Activation::Relu).then(Relu::new)
}

impl<B: Backend> ConvNet<B> {
    /// Instantiate `spec` with freshly initialised parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for shapes that do not chain (see
    /// [`ConvNetSpec::output_shapes`]) and [`Error::Config`] for an input
    /// other than 240×200×1, an output other than one logit, an even kernel,
    /// or a pool/dropout layer with no stage to attach to.
    pub fn from_spec(spec: &ConvNetSpec, device: &B::Device) -> Result<Self> {
        let expected_input = Shape::Spatial {
            height: CROPPED_ROWS,
            width: SIGNAL_COLS,
            channels: 1,
        };
        if spec.input() != expected_input {
            return Err(Error::Config(format!(
                "network input must be {expected_input}, got {}",
                spec.input()
            )));
        }
        let shapes = spec.output_shapes()?;
        if shapes.last() != Some(&Shape::Flat(1)) {
            return Err(Error::Config(
                "network must end in a single logit".to_string(),
            ));
        }

        let mut convs: Vec<ConvStage<B>> = Vec::new();
        let mut dense: Vec<DenseStage<B>> = Vec::new();
        let mut flattened = false;
        let mut previous = spec.input();

        for (idx, (layer, &shape)) in spec.layers().iter().zip(&shapes).enumerate() {
            let misplaced =
                || Error::Config(format!("layer {idx} ({layer:?}) has no stage to attach to"));
            match (*layer, previous) {
                (
                    Layer::Conv2d {
                        filters,
                        kernel,
                        stride,
                        activation,
                    },
                    Shape::Spatial { channels, .. },
                ) => {
                    if kernel % 2 == 0 {
                        return Err(Error::Config(format!(
                            "layer {idx}: kernel {kernel} is even, same padding needs an odd kernel"
                        )));
                    }
                    let pad = kernel / 2;
                    convs.push(ConvStage {
                        conv: Conv2dConfig::new([channels, filters], [kernel, kernel])
                            .with_stride([stride, stride])
                            .with_padding(PaddingConfig2d::Explicit(pad, pad))
                            .init(device),
                        relu: relu(activation),
                        pool: None,
                        dropout: None,
                    });
                }
                (Layer::MaxPool { size, stride }, _) => {
                    let stage = convs
                        .last_mut()
                        .filter(|s| s.pool.is_none() && s.dropout.is_none())
                        .ok_or_else(misplaced)?;
                    stage.pool = Some(
                        MaxPool2dConfig::new([size, size])
                            .with_strides([stride, stride])
                            .init(),
                    );
                }
                (Layer::Dropout { rate }, _) => {
                    let slot = if flattened {
                        dense.last_mut().map(|s| &mut s.dropout)
                    } else {
                        convs.last_mut().map(|s| &mut s.dropout)
                    };
                    match slot {
                        Some(slot) if slot.is_none() => {
                            *slot = Some(DropoutConfig::new(f64::from(rate)).init());
                        }
                        _ => return Err(misplaced()),
                    }
                }
                (Layer::Flatten, _) => flattened = true,
                (Layer::Dense { units, activation }, Shape::Flat(inputs)) => {
                    dense.push(DenseStage {
                        linear: LinearConfig::new(inputs, units).init(device),
                        relu: relu(activation),
                        dropout: None,
                    });
                }
                _ => return Err(misplaced()),
            }
            previous = shape;
        }

        Ok(Self { convs, dense })
    }

    /// `[batch, 1, 240, 200]` images → `[batch, 1]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .convs
            .iter()
            .fold(images, |x, stage| stage.forward(x));
        let x = x.flatten::<2>(1, 3);
        self.dense.iter().fold(x, |x, stage| stage.forward(x))
    }
}

/// Batch signal data as a `[n, 1, 240, 200]` tensor.
fn images<B: Backend>(batch: &Batch, device: &B::Device) -> Tensor<B, 4> {
    Tensor::from_data(
        TensorData::new(
            batch.signal_data().to_vec(),
            [batch.len(), 1, CROPPED_ROWS, SIGNAL_COLS],
        ),
        device,
    )
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointMeta {
    parameters: usize,
    steps: u64,
}

/// [`ConvNetSpec`] network trained with SGD on an autodiff backend.
pub struct ConvClassifier<B: AutodiffBackend> {
    spec: ConvNetSpec,
    model: ConvNet<B>,
    optim: SgdAdaptor<B>,
    loss: BinaryCrossEntropyLoss<B>,
    device: B::Device,
    learning_rate: f32,
    steps: u64,
}

impl<B: AutodiffBackend> fmt::Debug for ConvClassifier<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvClassifier")
            .field("parameters", &self.parameters())
            .field("learning_rate", &self.learning_rate)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl<B: AutodiffBackend> ConvClassifier<B> {
    /// Freshly initialised network for `spec`.
    ///
    /// # Errors
    ///
    /// See [`ConvNet::from_spec`].
    pub fn new(spec: ConvNetSpec, learning_rate: f32, device: B::Device) -> Result<Self> {
        let model = ConvNet::from_spec(&spec, &device)?;
        let flow: Vec<String> = spec.output_shapes()?.iter().map(ToString::to_string).collect();
        info!(
            input = %spec.input(),
            parameters = model.num_params(),
            "topology: {}",
            flow.join(" -> ")
        );
        Ok(Self {
            spec,
            model,
            optim: SgdConfig::new().init(),
            loss: BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(&device),
            device,
            learning_rate,
            steps: 0,
        })
    }

    /// Reference topology with the default learning rate.
    ///
    /// # Errors
    ///
    /// See [`ConvNet::from_spec`].
    pub fn reference(device: B::Device) -> Result<Self> {
        Self::new(ConvNetSpec::default(), DEFAULT_LEARNING_RATE, device)
    }

    /// Load the checkpoint in `dir`, or start fresh if there is none.
    ///
    /// The configured learning rate wins over whatever trained the checkpoint.
    ///
    /// # Errors
    ///
    /// IO/JSON errors for unreadable metadata, [`Error::ShapeMismatch`] if the
    /// checkpoint was written for a different topology, and [`Error::Model`]
    /// if the weight record cannot be loaded.
    pub fn load_or_new(
        dir: &Path,
        spec: ConvNetSpec,
        learning_rate: f32,
        device: B::Device,
    ) -> Result<Self> {
        let mut classifier = Self::new(spec, learning_rate, device)?;
        let meta_path = Self::meta_path(dir);
        if !meta_path.exists() {
            return Ok(classifier);
        }

        let meta: CheckpointMeta = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
        let parameters = classifier.parameters();
        if meta.parameters != parameters {
            return Err(Error::ShapeMismatch {
                expected: parameters,
                actual: meta.parameters,
            });
        }
        classifier.model = classifier
            .model
            .load_file(dir.join(WEIGHTS_STEM), &Recorder::new(), &classifier.device)
            .map_err(|e| Error::Model(format!("loading {}: {e:?}", dir.display())))?;
        classifier.steps = meta.steps;
        debug!(path = %dir.display(), steps = meta.steps, "warm start");
        Ok(classifier)
    }

    /// Path of the checkpoint metadata inside `dir`.
    #[must_use]
    pub fn meta_path(dir: &Path) -> PathBuf {
        dir.join(META_FILE)
    }

    /// Path of the weight record inside `dir`.
    #[must_use]
    pub fn weights_path(dir: &Path) -> PathBuf {
        dir.join(WEIGHTS_STEM).with_extension("mpk")
    }

    /// Topology being trained.
    #[must_use]
    pub const fn spec(&self) -> &ConvNetSpec {
        &self.spec
    }

    /// Trainable parameters of the instantiated network.
    #[must_use]
    pub fn parameters(&self) -> usize {
        self.model.num_params()
    }

    /// Optimizer steps taken so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Learning rate.
    #[must_use]
    pub const fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl<B: AutodiffBackend> Classifier for ConvClassifier<B> {
    fn name(&self) -> &'static str {
        "convnet"
    }

    fn forward(&self, batch: &Batch) -> Result<Vec<f32>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.valid();
        let logits = model.forward(images::<B::InnerBackend>(batch, &self.device));
        logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Model(format!("reading logits: {e:?}")))
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let labels = batch.labels().ok_or(Error::MissingLabels)?;
        if batch.is_empty() {
            return Ok(0.0);
        }
        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(
                labels.iter().map(|&l| i64::from(l)).collect::<Vec<_>>(),
                [labels.len(), 1],
            ),
            &self.device,
        );

        let logits = self.model.forward(images::<B>(batch, &self.device));
        let loss = self.loss.forward(logits, targets);
        let value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optim
            .step(f64::from(self.learning_rate), self.model.clone(), grads);
        self.steps += 1;
        Ok(value)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.model
            .clone()
            .save_file(dir.join(WEIGHTS_STEM), &Recorder::new())
            .map_err(|e| Error::Model(format!("saving {}: {e:?}", dir.display())))?;

        let meta = CheckpointMeta {
            parameters: self.parameters(),
            steps: self.steps,
        };
        let path = Self::meta_path(dir);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&meta)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{NormalizedSample, SAMPLE_LEN};

    type TestBackend = Autodiff<NdArray<f32>>;

    /// 240×200 → stride-8 conv ×4 → pool → 15×12×4 → 720 → 8 → 1
    fn small_spec() -> ConvNetSpec {
        ConvNetSpec::new(
            Shape::Spatial {
                height: CROPPED_ROWS,
                width: SIGNAL_COLS,
                channels: 1,
            },
            vec![
                Layer::Conv2d {
                    filters: 4,
                    kernel: 5,
                    stride: 8,
                    activation: Activation::Relu,
                },
                Layer::MaxPool { size: 2, stride: 2 },
                Layer::Dropout { rate: 0.1 },
                Layer::Flatten,
                Layer::Dense {
                    units: 8,
                    activation: Activation::Relu,
                },
                Layer::Dropout { rate: 0.2 },
                Layer::Dense {
                    units: 1,
                    activation: Activation::Identity,
                },
            ],
        )
    }

    fn classifier(learning_rate: f32) -> ConvClassifier<TestBackend> {
        ConvClassifier::new(small_spec(), learning_rate, Default::default()).unwrap()
    }

    fn batch(values: &[(f32, Option<u8>)]) -> Batch {
        Batch::from_samples(
            values
                .iter()
                .enumerate()
                .map(|(i, &(fill, label))| NormalizedSample {
                    signal_data: vec![fill; SAMPLE_LEN],
                    bw_data: vec![0.0; SAMPLE_LEN],
                    signal_id: i64::try_from(i).unwrap(),
                    measurement_id: 0,
                    label,
                })
                .collect(),
        )
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("discharge_net_convnet_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_instantiated_parameters_match_spec() {
        let model = classifier(0.001);
        assert_eq!(model.parameters(), 5_881);
        assert_eq!(model.parameters(), small_spec().parameter_count().unwrap());
    }

    #[test]
    #[ignore = "allocates the full 156M-parameter network"]
    fn test_reference_network_parameters() {
        let model = ConvClassifier::<TestBackend>::reference(Default::default()).unwrap();
        assert_eq!(model.parameters(), 156_176_585);
    }

    #[test]
    fn test_forward_one_logit_per_sample() {
        let model = classifier(0.001);
        let logits = model
            .forward(&batch(&[(0.5, Some(1)), (-0.5, Some(0)), (0.1, None)]))
            .unwrap();
        assert_eq!(logits.len(), 3);
        assert!(logits.iter().all(|l| l.is_finite()));
        assert!(model.forward(&Batch::from_samples(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = classifier(0.05);
        let data = batch(&[(0.8, Some(1)), (-0.8, Some(0)), (0.6, Some(1)), (-0.6, Some(0))]);

        let before = model.evaluate(vec![data.clone()]).unwrap().loss;
        for _ in 0..40 {
            model.train_step(&data).unwrap();
        }
        let after = model.evaluate(vec![data]).unwrap().loss;
        assert!(after < before, "loss {before} -> {after}");
        assert_eq!(model.steps(), 40);
    }

    #[test]
    fn test_train_step_requires_labels() {
        let mut model = classifier(0.001);
        assert!(matches!(
            model.train_step(&batch(&[(0.1, None)])),
            Err(Error::MissingLabels)
        ));
        assert_eq!(model.steps(), 0);
    }

    #[test]
    fn test_save_and_warm_start() {
        let dir = scratch("warm");
        let data = batch(&[(0.4, Some(1)), (-0.4, Some(0))]);
        let mut model = classifier(0.01);
        model.train_step(&data).unwrap();
        model.save(&dir).unwrap();
        assert!(ConvClassifier::<TestBackend>::weights_path(&dir).exists());

        let loaded =
            ConvClassifier::<TestBackend>::load_or_new(&dir, small_spec(), 0.002, Default::default())
                .unwrap();
        assert_eq!(loaded.steps(), 1);
        assert!((loaded.learning_rate() - 0.002).abs() < f32::EPSILON);

        let original = model.forward(&data).unwrap();
        let restored = loaded.forward(&data).unwrap();
        for (a, b) in original.iter().zip(&restored) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_warm_start_rejects_other_topology() {
        let dir = scratch("topology");
        classifier(0.01).save(&dir).unwrap();

        let mut layers = small_spec().layers().to_vec();
        layers[4] = Layer::Dense {
            units: 16,
            activation: Activation::Relu,
        };
        let other = ConvNetSpec::new(small_spec().input(), layers);
        let err = ConvClassifier::<TestBackend>::load_or_new(&dir, other, 0.01, Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { actual: 5_881, .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_topologies_rejected() {
        let device = Default::default();
        let input = small_spec().input();
        let logit = Layer::Dense {
            units: 1,
            activation: Activation::Identity,
        };

        let even = ConvNetSpec::new(
            input,
            vec![
                Layer::Conv2d {
                    filters: 2,
                    kernel: 4,
                    stride: 8,
                    activation: Activation::Relu,
                },
                Layer::Flatten,
                logit,
            ],
        );
        assert!(matches!(
            ConvNet::<TestBackend>::from_spec(&even, &device),
            Err(Error::Config(_))
        ));

        let leading_dropout = ConvNetSpec::new(
            input,
            vec![Layer::Dropout { rate: 0.1 }, Layer::Flatten, logit],
        );
        assert!(matches!(
            ConvNet::<TestBackend>::from_spec(&leading_dropout, &device),
            Err(Error::Config(_))
        ));

        let wide_output = ConvNetSpec::new(
            input,
            vec![
                Layer::Flatten,
                Layer::Dense {
                    units: 2,
                    activation: Activation::Identity,
                },
            ],
        );
        assert!(matches!(
            ConvNet::<TestBackend>::from_spec(&wide_output, &device),
            Err(Error::Config(_))
        ));
    }
}
