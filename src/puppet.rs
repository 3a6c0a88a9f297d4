//! Face-tracked avatar effect.
//!
//! Every tick, the faces found in the camera frame are mapped onto an [`Avatar`]: the head bone
//! follows the face orientation, the mouth follows the inner lips, and the eyes blink on a fixed
//! schedule. Next to the avatar, a [`FrameSink`] receives an overlay with the face mesh points.

use std::time::{Duration, Instant};

use nalgebra::Matrix3;

use crate::{
    avatar::{Avatar, Bone, RestPose},
    expression::{blink_weight, mouth_open_from_annotations, Expression},
    image::{draw::draw_marker, Color, Image},
    landmark::{FaceEstimate, FaceLandmarker, LandmarkError},
    pose::head_rotation,
    resolution::Resolution,
    session::Effect,
    video::FrameSink,
};

/// Draws the mesh points of `faces` onto a cleared, transparent image of size `resolution`.
pub fn draw_mesh_overlay(resolution: Resolution, faces: &[FaceEstimate]) -> Image {
    let mut overlay = Image::new(resolution.width(), resolution.height());
    overlay.clear(Color::NULL);
    for face in faces {
        for &[x, y, _] in face.mesh() {
            draw_marker(&mut overlay, x.round() as i32, y.round() as i32)
                .color(Color::WHITE)
                .size(3);
        }
    }
    overlay
}

/// Avatar parameters derived from one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMapping {
    pub head: Matrix3<f32>,
    pub blink: f32,
    pub mouth_open: f32,
}

impl FaceMapping {
    /// Computes the avatar parameters for `face`, `elapsed` time after the puppet was created.
    ///
    /// Fails without partial results if any required landmark is missing.
    pub fn from_face(face: &FaceEstimate, elapsed: Duration) -> Result<Self, LandmarkError> {
        let annotations = face.annotations();
        Ok(Self {
            head: head_rotation(annotations)?,
            blink: blink_weight(elapsed),
            mouth_open: mouth_open_from_annotations(annotations)?,
        })
    }

    /// Writes these parameters to `avatar`, overwriting its previous state.
    pub fn apply<A: Avatar + ?Sized>(&self, avatar: &mut A) {
        avatar.set_bone_rotation(Bone::Head, &self.head);
        avatar.set_expression_weight(Expression::Blink, self.blink);
        avatar.set_expression_weight(Expression::A, self.mouth_open);
    }
}

/// Summary of the last rendered tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Number of faces the landmarker found.
    pub faces: usize,
    /// Number of faces applied to the avatar.
    pub mapped: usize,
    /// Number of faces skipped due to missing or malformed landmarks.
    pub skipped: usize,
}

/// Drives an [`Avatar`] with the faces found by a [`FaceLandmarker`], and shows their mesh points
/// on a [`FrameSink`].
pub struct AvatarPuppet<L, A, K> {
    landmarker: L,
    avatar: A,
    overlay: K,
    started: Instant,
    last_update: Instant,
    last_report: RenderReport,
}

impl<L: FaceLandmarker, A: Avatar, K: FrameSink> AvatarPuppet<L, A, K> {
    /// Creates the puppet and puts `avatar` into its [`RestPose`].
    ///
    /// Every tick, `overlay` receives a mesh overlay the size of the camera frame.
    pub fn new(landmarker: L, mut avatar: A, overlay: K) -> Self {
        RestPose::default().apply(&mut avatar);
        let now = Instant::now();
        Self {
            landmarker,
            avatar,
            overlay,
            started: now,
            last_update: now,
            last_report: RenderReport::default(),
        }
    }

    pub fn avatar(&self) -> &A {
        &self.avatar
    }

    pub fn avatar_mut(&mut self) -> &mut A {
        &mut self.avatar
    }

    pub fn landmarker(&self) -> &L {
        &self.landmarker
    }

    pub fn landmarker_mut(&mut self) -> &mut L {
        &mut self.landmarker
    }

    pub fn overlay(&self) -> &K {
        &self.overlay
    }

    /// Returns what happened during the last call to [`Effect::render`].
    pub fn last_report(&self) -> RenderReport {
        self.last_report
    }

    /// Applies `faces` to the avatar, then advances and renders it.
    ///
    /// Faces are applied in order, so with several faces, the last valid one wins. Faces with
    /// missing or malformed landmarks are skipped, leaving the avatar's previous state in place.
    fn drive(&mut self, faces: &[FaceEstimate], now: Instant) -> anyhow::Result<()> {
        let elapsed = now.saturating_duration_since(self.started);
        let mut report = RenderReport {
            faces: faces.len(),
            ..RenderReport::default()
        };

        for (i, face) in faces.iter().enumerate() {
            match FaceMapping::from_face(face, elapsed) {
                Ok(mapping) => {
                    log::trace!("face {}: {:?}", i, mapping);
                    mapping.apply(&mut self.avatar);
                    report.mapped += 1;
                }
                Err(e @ LandmarkError::MissingGroup(_)) => {
                    log::debug!("face {} skipped: {}", i, e);
                    report.skipped += 1;
                }
                Err(e) => {
                    log::warn!("face {} skipped: {}", i, e);
                    report.skipped += 1;
                }
            }
        }
        self.last_report = report;

        self.avatar
            .update(now.saturating_duration_since(self.last_update));
        self.last_update = now;
        self.avatar.render_frame()
    }
}

impl<L: FaceLandmarker, A: Avatar, K: FrameSink> Effect for AvatarPuppet<L, A, K> {
    type Estimate = Vec<FaceEstimate>;

    fn name(&self) -> &str {
        "avatar"
    }

    fn estimate(&mut self, frame: &Image) -> anyhow::Result<Vec<FaceEstimate>> {
        self.landmarker.estimate_faces(frame)
    }

    fn render(&mut self, frame: &Image, faces: Vec<FaceEstimate>) -> anyhow::Result<()> {
        self.overlay
            .show(&draw_mesh_overlay(frame.resolution(), &faces))?;
        self.drive(&faces, Instant::now())
    }
}
