//! Face landmark estimation with the 468-point Face Mesh network.
//!
//! The network takes a square RGB image of a face and outputs 468 3D landmarks plus a score
//! indicating whether a face is actually present. [`FaceMesh`] letterboxes the whole camera frame
//! into the network input, so it tracks a single face that fills a reasonable part of the frame.

use std::path::Path;

use anyhow::bail;

use crate::{
    image::Image,
    landmark::{FaceEstimate, FaceLandmarker, LandmarkerConfig, Position, MESH_LEN},
    nn::{sigmoid, Cnn, CnnInputShape, ColorMapper, NeuralNetwork},
    resolution::Letterbox,
    timer::Timer,
};

/// Minimum face presence probability for a mesh to be reported.
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// A [`FaceLandmarker`] backed by the Face Mesh ONNX network.
pub struct FaceMesh {
    cnn: Cnn,
    config: LandmarkerConfig,
    t_resize: Timer,
    t_infer: Timer,
}

impl FaceMesh {
    /// Loads the network from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P, config: LandmarkerConfig) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?;
        Self::new(nn, config)
    }

    /// Wraps an already loaded network.
    ///
    /// Fails if the network doesn't have a single square NCHW input, or doesn't produce landmarks
    /// and a face score.
    pub fn new(nn: NeuralNetwork, config: LandmarkerConfig) -> anyhow::Result<Self> {
        if nn.num_outputs() < 2 {
            bail!(
                "face mesh network needs 2 outputs (landmarks and face score), this one has {}",
                nn.num_outputs(),
            );
        }
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(-1.0..=1.0))?;
        let input_res = cnn.input_resolution();
        if input_res.width() != input_res.height() {
            bail!("face mesh network input must be square, got {}", input_res);
        }

        Ok(Self {
            cnn,
            config,
            t_resize: Timer::new("resize"),
            t_infer: Timer::new("infer"),
        })
    }

    /// Returns profiling timers for letterboxing and inference.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_resize, &self.t_infer].into_iter()
    }
}

impl FaceLandmarker for FaceMesh {
    fn estimate_faces(&mut self, image: &Image) -> anyhow::Result<Vec<FaceEstimate>> {
        if self.config.max_faces_limit() == 0 {
            return Ok(Vec::new());
        }

        let input_res = self.cnn.input_resolution();
        let (input, letterbox) = self.t_resize.time(|| image.letterboxed(input_res));
        let outputs = self.t_infer.time(|| self.cnn.estimate(&input))?;

        let coords = outputs.get(0)?.as_slice();
        let face_score = match outputs.get(1)?.as_slice() {
            [score, ..] => *score,
            [] => bail!("face mesh network produced an empty face score"),
        };

        match decode_mesh(coords, face_score, &letterbox)? {
            Some(mesh) => Ok(vec![FaceEstimate::from_mesh(mesh)?]),
            None => Ok(Vec::new()),
        }
    }
}

/// Converts raw network outputs to a mesh in frame coordinates.
///
/// `coords` holds `[x, y, z]` triples in network input pixels, `raw_score` is the face presence
/// logit. Returns `None` if no face is present.
fn decode_mesh(
    coords: &[f32],
    raw_score: f32,
    letterbox: &Letterbox,
) -> anyhow::Result<Option<Vec<Position>>> {
    if coords.len() < MESH_LEN * 3 {
        bail!(
            "face mesh network produced {} coordinates, expected {}",
            coords.len(),
            MESH_LEN * 3,
        );
    }

    let presence = sigmoid(raw_score);
    if presence < FACE_PRESENCE_THRESHOLD {
        log::trace!("no face (presence {:.2})", presence);
        return Ok(None);
    }

    let scale = letterbox.scale();
    let mesh = coords
        .chunks_exact(3)
        .take(MESH_LEN)
        .map(|xyz| {
            let [x, y] = letterbox.to_source(xyz[0], xyz[1]);
            [x, y, xyz[2] / scale]
        })
        .collect();
    Ok(Some(mesh))
}
