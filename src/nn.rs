//! Neural Network inference.

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::bail;
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{Color, Image};
use crate::resolution::Resolution;
use tensor::Tensor;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// The logistic function, mapping raw network scores to `(0.0, 1.0)`.
#[inline]
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn, shape)?;
        Ok(Self {
            nn,
            shape,
            input_res,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork, shape: CnnInputShape) -> anyhow::Result<Resolution> {
        if nn.num_inputs() != 1 {
            bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let tensor_shape = nn.input_shape(0)?;
        let (w, h) = match (shape, tensor_shape) {
            (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
            _ => {
                bail!(
                    "invalid model input shape for {:?} CNN: {:?}",
                    shape,
                    tensor_shape,
                );
            }
        };

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
        Ok(Resolution::new(w, h))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Returns the underlying network.
    #[inline]
    pub fn network(&self) -> &NeuralNetwork {
        &self.nn
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The input image will be sampled to create the network's input tensor. If the image's aspect
    /// ratio does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate(&self, image: &Image) -> anyhow::Result<Outputs> {
        let tensor = self.image_to_tensor(image);
        self.nn.estimate(&[tensor])
    }

    fn image_to_tensor(&self, image: &Image) -> Tensor {
        let (h, w) = (
            self.input_res.height() as usize,
            self.input_res.width() as usize,
        );
        let (img_w, img_h) = (image.width(), image.height());
        let sample = |x: usize, y: usize| -> [f32; 3] {
            if img_w == 0 || img_h == 0 {
                return self.color_mapper.map(Color::BLACK);
            }
            let sx = ((x as f32 + 0.5) / w as f32 * img_w as f32) as u32;
            let sy = ((y as f32 + 0.5) / h as f32 * img_h as f32) as u32;
            self.color_mapper
                .map(image.get(sx.min(img_w - 1), sy.min(img_h - 1)))
        };

        match self.shape {
            CnnInputShape::NCHW => {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| sample(x, y)[c])
            }
            CnnInputShape::NHWC => {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| sample(x, y)[c])
            }
        }
    }
}

/// Maps 8-bit colors to the value range a network expects.
#[derive(Clone, Debug)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range.
    ///
    /// # Panics
    ///
    /// Panics if `target_range` is empty.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(
            target_range.end() > target_range.start(),
            "empty color target range {:?}",
            target_range,
        );
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, often fixed at 1.
/// - `C` is the number of color channels, often 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    input_shapes: Vec<Vec<usize>>,
}

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network file must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)?;
        let nn = Self::from_onnx(&model_data)?;
        log::info!(
            "loaded {} ({} inputs, {} outputs)",
            path.display(),
            nn.num_inputs(),
            nn.num_outputs(),
        );
        Ok(nn)
    }

    /// Loads and optimizes a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed or incomplete, if the network uses
    /// unimplemented operations, or if any of its inputs has a symbolic shape.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?
            .into_runnable()?;

        let graph = model.model();
        let mut input_shapes = Vec::with_capacity(graph.inputs.len());
        for id in 0..graph.inputs.len() {
            let fact = graph.input_fact(id)?;
            let Some(shape) = fact.shape.as_concrete() else {
                bail!("network input {} has symbolic shape {:?}", id, fact.shape);
            };
            input_shapes.push(shape.to_vec());
        }

        Ok(Self(Arc::new(NeuralNetworkImpl {
            inner: model,
            input_shapes,
        })))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.input_shapes.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.inner.model().outputs.len()
    }

    /// Returns the tensor shape expected for the input at `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<&[usize]> {
        match self.0.input_shapes.get(index) {
            Some(shape) => Ok(shape),
            None => bail!(
                "input index {} out of range (network has {} inputs)",
                index,
                self.num_inputs(),
            ),
        }
    }

    /// Runs the network on a set of input tensors (one per input node), returning the estimated
    /// [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &[Tensor]) -> anyhow::Result<Outputs> {
        if inputs.len() != self.num_inputs() {
            bail!(
                "network takes {} inputs, {} were given",
                self.num_inputs(),
                inputs.len(),
            );
        }

        let inputs = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.inner.run(inputs)?;
        let outputs = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<Vec<_>>>()?;
        log::trace!(
            "network outputs: {:?}",
            outputs.iter().map(|t| t.shape()).collect::<Vec<_>>()
        );
        Ok(Outputs { inner: outputs })
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the output tensor at `index`, or an error if the network produced fewer outputs.
    pub fn get(&self, index: usize) -> anyhow::Result<&Tensor> {
        match self.inner.get(index) {
            Some(t) => Ok(t),
            None => bail!(
                "network produced {} outputs, expected at least {}",
                self.len(),
                index + 1,
            ),
        }
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl<'a> IntoIterator for &'a Outputs {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [0.0, 0.0, 0.0]);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn sigmoid_range() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn rejects_non_onnx_path() {
        assert!(NeuralNetwork::from_path("model.tflite").is_err());
    }

    #[test]
    fn rejects_garbage_model() {
        assert!(NeuralNetwork::from_onnx(b"definitely not protobuf").is_err());
    }
}
