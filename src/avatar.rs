//! The avatar renderer interface.
//!
//! Omote does not render avatars itself. An [`Avatar`] is the scene (skeleton, expressions, and
//! camera) of some rendering engine. [`Rig`] is a headless implementation that records the state
//! it's given, which is what the binary and tests use.

use std::{collections::HashMap, f32::consts::PI, fmt, time::Duration};

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::expression::Expression;

/// A humanoid bone of an avatar rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bone {
    Hips,
    Spine,
    Chest,
    Neck,
    Head,
    LeftUpperArm,
    LeftLowerArm,
    RightUpperArm,
    RightLowerArm,
}

impl Bone {
    /// Returns the humanoid bone name used by avatar files.
    pub fn name(self) -> &'static str {
        match self {
            Bone::Hips => "hips",
            Bone::Spine => "spine",
            Bone::Chest => "chest",
            Bone::Neck => "neck",
            Bone::Head => "head",
            Bone::LeftUpperArm => "leftUpperArm",
            Bone::LeftLowerArm => "leftLowerArm",
            Bone::RightUpperArm => "rightUpperArm",
            Bone::RightLowerArm => "rightLowerArm",
        }
    }
}

impl fmt::Display for Bone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A posable, renderable avatar.
pub trait Avatar {
    /// Sets the local rotation of `bone`, replacing its previous rotation.
    fn set_bone_rotation(&mut self, bone: Bone, rotation: &Matrix3<f32>);

    /// Sets the weight of an expression channel, replacing its previous weight.
    fn set_expression_weight(&mut self, expression: Expression, weight: f32);

    /// Advances the avatar's own animation (e.g. spring bones) by `delta`.
    fn update(&mut self, delta: Duration) {
        let _ = delta;
    }

    /// Renders the avatar in its current state.
    fn render_frame(&mut self) -> anyhow::Result<()>;
}

impl<A: Avatar + ?Sized> Avatar for Box<A> {
    fn set_bone_rotation(&mut self, bone: Bone, rotation: &Matrix3<f32>) {
        (**self).set_bone_rotation(bone, rotation)
    }

    fn set_expression_weight(&mut self, expression: Expression, weight: f32) {
        (**self).set_expression_weight(expression, weight)
    }

    fn update(&mut self, delta: Duration) {
        (**self).update(delta)
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        (**self).render_frame()
    }
}

/// The pose an avatar is put in before tracking starts: turned around to face the camera, with the
/// arms lowered from the T-pose.
#[derive(Debug, Clone, PartialEq)]
pub struct RestPose {
    rotations: Vec<(Bone, Matrix3<f32>)>,
}

impl Default for RestPose {
    fn default() -> Self {
        let about = |axis: Vector3<f32>, angle: f32| {
            Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle).into_inner()
        };
        Self {
            rotations: vec![
                (Bone::Hips, about(Vector3::y(), PI)),
                (Bone::LeftUpperArm, about(Vector3::z(), 2.0 * PI / 5.0)),
                (Bone::RightUpperArm, about(Vector3::z(), -2.0 * PI / 5.0)),
            ],
        }
    }
}

impl RestPose {
    /// Returns the bone rotations making up this pose.
    pub fn rotations(&self) -> &[(Bone, Matrix3<f32>)] {
        &self.rotations
    }

    /// Poses `avatar`.
    pub fn apply<A: Avatar + ?Sized>(&self, avatar: &mut A) {
        for (bone, rotation) in &self.rotations {
            avatar.set_bone_rotation(*bone, rotation);
        }
    }
}

/// An [`Avatar`] without a renderer, which keeps track of the state it was put in.
#[derive(Debug, Default, Clone)]
pub struct Rig {
    bones: HashMap<Bone, Matrix3<f32>>,
    expressions: HashMap<Expression, f32>,
    animated: Duration,
    frames_rendered: u64,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rotation of `bone`, or `None` if it was never set.
    pub fn bone_rotation(&self, bone: Bone) -> Option<&Matrix3<f32>> {
        self.bones.get(&bone)
    }

    /// Returns the weight of `expression`, or `None` if it was never set.
    pub fn expression_weight(&self, expression: Expression) -> Option<f32> {
        self.expressions.get(&expression).copied()
    }

    /// Returns the total time passed to [`Avatar::update`].
    pub fn animated(&self) -> Duration {
        self.animated
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl Avatar for Rig {
    fn set_bone_rotation(&mut self, bone: Bone, rotation: &Matrix3<f32>) {
        self.bones.insert(bone, *rotation);
    }

    fn set_expression_weight(&mut self, expression: Expression, weight: f32) {
        self.expressions.insert(expression, weight);
    }

    fn update(&mut self, delta: Duration) {
        self.animated += delta;
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        self.frames_rendered += 1;
        log::trace!(
            "frame {}: head={:?} blink={:?} a={:?}",
            self.frames_rendered,
            self.bones.get(&Bone::Head).map(crate::pose::euler_xyz),
            self.expression_weight(Expression::Blink),
            self.expression_weight(Expression::A),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::pose::euler_xyz;

    #[test]
    fn rest_pose() {
        let mut rig = Rig::new();
        RestPose::default().apply(&mut rig);

        let hips = rig.bone_rotation(Bone::Hips).unwrap();
        assert_abs_diff_eq!(hips * Vector3::z(), -Vector3::z(), epsilon = 1e-6);

        let [x, y, z] = euler_xyz(rig.bone_rotation(Bone::LeftUpperArm).unwrap());
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(z, 2.0 * PI / 5.0, epsilon = 1e-6);

        let [_, _, z] = euler_xyz(rig.bone_rotation(Bone::RightUpperArm).unwrap());
        assert_abs_diff_eq!(z, -2.0 * PI / 5.0, epsilon = 1e-6);

        assert_eq!(rig.bone_rotation(Bone::Head), None);
    }

    #[test]
    fn rig_records_state() {
        let mut rig = Rig::new();
        rig.set_expression_weight(Expression::A, 0.25);
        rig.set_expression_weight(Expression::A, 0.5);
        rig.update(Duration::from_millis(16));
        rig.update(Duration::from_millis(17));
        rig.render_frame().unwrap();

        assert_eq!(rig.expression_weight(Expression::A), Some(0.5));
        assert_eq!(rig.expression_weight(Expression::Blink), None);
        assert_eq!(rig.animated(), Duration::from_millis(33));
        assert_eq!(rig.frames_rendered(), 1);
    }
}
