//! Reference convolutional topology and shape inference
//!
//! ```text
//! 240×200×1
//!   conv 5×5/2 ×32 ─> 120×100×32
//!   conv 3×3 ×64 ─> pool 2/2 ─> dropout 0.1 ─> 60×50×64
//!   conv 3×3 ×128 ─> pool 2/2 ─> dropout 0.1 ─> 30×25×128
//!   conv 3×3 ×200 ─> pool 2/2 ─> 15×12×200
//!   flatten 36000 ─> dense 4096 ─> dropout 0.2 ─> dense 2048 ─> dropout 0.2 ─> dense 1 (logit)
//! ```
//!
//! Convolutions use "same" padding with ReLU; pooling uses "valid" padding.

use crate::transform::{CROPPED_ROWS, SIGNAL_COLS};
use crate::{Error, Result};
use std::fmt;

/// Activation applied after a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// No activation (logit output; sigmoid lives in the loss)
    Identity,
}

/// One layer of the topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layer {
    /// 2-D convolution, "same" padding
    Conv2d {
        /// Output channels
        filters: usize,
        /// Square kernel edge
        kernel: usize,
        /// Stride in both directions
        stride: usize,
        /// Post-activation
        activation: Activation,
    },
    /// Max pooling, "valid" padding
    MaxPool {
        /// Window edge
        size: usize,
        /// Stride in both directions
        stride: usize,
    },
    /// Dropout (training only)
    Dropout {
        /// Drop probability
        rate: f32,
    },
    /// Collapse spatial dims
    Flatten,
    /// Fully connected layer
    Dense {
        /// Output units
        units: usize,
        /// Post-activation
        activation: Activation,
    },
}

/// Tensor shape flowing between layers (batch dimension omitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Height × width × channels
    Spatial {
        /// Rows
        height: usize,
        /// Columns
        width: usize,
        /// Channels
        channels: usize,
    },
    /// Flat feature vector
    Flat(usize),
}

impl Shape {
    /// Number of scalar elements.
    #[must_use]
    pub const fn elements(&self) -> usize {
        match *self {
            Self::Spatial {
                height,
                width,
                channels,
            } => height * width * channels,
            Self::Flat(n) => n,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spatial {
                height,
                width,
                channels,
            } => write!(f, "{height}×{width}×{channels}"),
            Self::Flat(n) => write!(f, "{n}"),
        }
    }
}

/// Layer stack with its input shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvNetSpec {
    input: Shape,
    layers: Vec<Layer>,
}

impl Default for ConvNetSpec {
    fn default() -> Self {
        use Activation::{Identity, Relu};
        let conv = |filters, kernel, stride| Layer::Conv2d {
            filters,
            kernel,
            stride,
            activation: Relu,
        };
        let pool = Layer::MaxPool { size: 2, stride: 2 };

        Self {
            input: Shape::Spatial {
                height: CROPPED_ROWS,
                width: SIGNAL_COLS,
                channels: 1,
            },
            layers: vec![
                conv(32, 5, 2),
                conv(64, 3, 1),
                pool,
                Layer::Dropout { rate: 0.1 },
                conv(128, 3, 1),
                pool,
                Layer::Dropout { rate: 0.1 },
                conv(200, 3, 1),
                pool,
                Layer::Flatten,
                Layer::Dense {
                    units: 4096,
                    activation: Relu,
                },
                Layer::Dropout { rate: 0.2 },
                Layer::Dense {
                    units: 2048,
                    activation: Relu,
                },
                Layer::Dropout { rate: 0.2 },
                Layer::Dense {
                    units: 1,
                    activation: Identity,
                },
            ],
        }
    }
}

impl ConvNetSpec {
    /// Custom topology.
    #[must_use]
    pub fn new(input: Shape, layers: Vec<Layer>) -> Self {
        Self { input, layers }
    }

    /// Input shape per sample.
    #[must_use]
    pub const fn input(&self) -> Shape {
        self.input
    }

    /// Layers in order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Output shape after each layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a spatial layer follows a flat
    /// shape, a dense layer sees a spatial shape, or a window does not fit.
    pub fn output_shapes(&self) -> Result<Vec<Shape>> {
        let mut shape = self.input;
        let mut shapes = Vec::with_capacity(self.layers.len());
        for (idx, layer) in self.layers.iter().enumerate() {
            shape = next_shape(shape, layer)
                .ok_or_else(|| Error::InvalidInput(format!("layer {idx} ({layer:?}) cannot follow shape {shape}")))?;
            shapes.push(shape);
        }
        Ok(shapes)
    }

    /// Final output shape.
    ///
    /// # Errors
    ///
    /// See [`ConvNetSpec::output_shapes`].
    pub fn output_shape(&self) -> Result<Shape> {
        Ok(self.output_shapes()?.last().copied().unwrap_or(self.input))
    }

    /// Trainable parameter count (weights + biases).
    ///
    /// # Errors
    ///
    /// See [`ConvNetSpec::output_shapes`].
    pub fn parameter_count(&self) -> Result<usize> {
        let shapes = self.output_shapes()?;
        let mut previous = self.input;
        let mut total = 0;
        for (layer, &shape) in self.layers.iter().zip(&shapes) {
            total += match (*layer, previous) {
                (Layer::Conv2d { filters, kernel, .. }, Shape::Spatial { channels, .. }) => {
                    kernel * kernel * channels * filters + filters
                }
                (Layer::Dense { units, .. }, Shape::Flat(inputs)) => inputs * units + units,
                _ => 0,
            };
            previous = shape;
        }
        Ok(total)
    }
}

fn next_shape(shape: Shape, layer: &Layer) -> Option<Shape> {
    match (*layer, shape) {
        (
            Layer::Conv2d {
                filters, stride, ..
            },
            Shape::Spatial { height, width, .. },
        ) if stride > 0 => Some(Shape::Spatial {
            height: height.div_ceil(stride),
            width: width.div_ceil(stride),
            channels: filters,
        }),
        (
            Layer::MaxPool { size, stride },
            Shape::Spatial {
                height,
                width,
                channels,
            },
        ) if stride > 0 && height >= size && width >= size => Some(Shape::Spatial {
            height: (height - size) / stride + 1,
            width: (width - size) / stride + 1,
            channels,
        }),
        (Layer::Dropout { .. }, shape) => Some(shape),
        (Layer::Flatten, shape) => Some(Shape::Flat(shape.elements())),
        (Layer::Dense { units, .. }, Shape::Flat(_)) => Some(Shape::Flat(units)),
        _ => None,
    }
}
