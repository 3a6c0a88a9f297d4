//! Face landmark data model.
//!
//! A landmark network produces, for each face it finds, a flat *mesh* of 3D points. Named
//! anatomical contours ("silhouette", "lipsUpperInner", ...) are ordered subsequences of that mesh,
//! collected in [`Annotations`].

use std::{collections::HashMap, fmt, str::FromStr};

use crate::image::Image;

/// A landmark position in frame pixel coordinates (`[x, y, z]`, Y pointing down).
pub type Position = [f32; 3];

/// Number of points in a face mesh.
pub const MESH_LEN: usize = 468;

/// Errors raised when looking up landmarks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LandmarkError {
    #[error("landmark group `{0}` is missing")]
    MissingGroup(Contour),
    #[error("landmark group `{contour}` has {len} points, index {index} is out of range")]
    OutOfRange {
        contour: Contour,
        index: usize,
        len: usize,
    },
    #[error("face mesh has {len} points, expected at least {expected}")]
    MeshTooShort { len: usize, expected: usize },
    #[error("unknown landmark group `{0}`")]
    UnknownContour(String),
}

macro_rules! contours {
    ( $( $(#[$attr:meta])* $variant:ident = $name:literal [ $($idx:literal),* $(,)? ], )+ ) => {
        /// A named anatomical group of face mesh points.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Contour {
            $( $(#[$attr])* $variant, )+
        }

        impl Contour {
            /// All contours, in declaration order.
            pub const ALL: &'static [Contour] = &[ $( Contour::$variant, )+ ];

            /// Returns the name of this contour, as used by face mesh annotation maps.
            pub fn name(self) -> &'static str {
                match self {
                    $( Contour::$variant => $name, )+
                }
            }

            /// Returns the indices into the 468-point face mesh that make up this contour, in
            /// order.
            pub fn mesh_indices(self) -> &'static [usize] {
                match self {
                    $( Contour::$variant => &[ $($idx),* ], )+
                }
            }
        }
    };
}

contours! {
    /// Face outline, clockwise starting at the top of the forehead.
    Silhouette = "silhouette" [
        10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377,
        152, 148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
    ],
    LipsUpperOuter = "lipsUpperOuter" [61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291],
    LipsLowerOuter = "lipsLowerOuter" [146, 91, 181, 84, 17, 314, 405, 321, 375, 291],
    LipsUpperInner = "lipsUpperInner" [78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308],
    LipsLowerInner = "lipsLowerInner" [78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308],
    RightEyeUpper0 = "rightEyeUpper0" [246, 161, 160, 159, 158, 157, 173],
    RightEyeLower0 = "rightEyeLower0" [33, 7, 163, 144, 145, 153, 154, 155, 133],
    LeftEyeUpper0 = "leftEyeUpper0" [466, 388, 387, 386, 385, 384, 398],
    LeftEyeLower0 = "leftEyeLower0" [263, 249, 390, 373, 374, 380, 381, 382, 362],
    MidwayBetweenEyes = "midwayBetweenEyes" [168],
    NoseTip = "noseTip" [1],
    NoseBottom = "noseBottom" [2],
    NoseRightCorner = "noseRightCorner" [98],
    NoseLeftCorner = "noseLeftCorner" [327],
    RightCheek = "rightCheek" [205],
    LeftCheek = "leftCheek" [425],
}

impl fmt::Display for Contour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Contour {
    type Err = LandmarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Contour::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| LandmarkError::UnknownContour(s.to_string()))
    }
}

/// Named landmark groups of a single face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    groups: HashMap<Contour, Vec<Position>>,
}

impl Annotations {
    /// Creates an empty set of annotations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives all [`Contour`]s from a full face mesh.
    ///
    /// Returns [`LandmarkError::MeshTooShort`] if `mesh` has fewer than [`MESH_LEN`] points.
    pub fn from_mesh(mesh: &[Position]) -> Result<Self, LandmarkError> {
        if mesh.len() < MESH_LEN {
            return Err(LandmarkError::MeshTooShort {
                len: mesh.len(),
                expected: MESH_LEN,
            });
        }

        let groups = Contour::ALL
            .iter()
            .map(|&c| (c, c.mesh_indices().iter().map(|&i| mesh[i]).collect()))
            .collect();
        Ok(Self { groups })
    }

    /// Builds annotations from a name-keyed mapping, as produced by external landmark models.
    ///
    /// Groups with names that don't correspond to a [`Contour`] are ignored. Group lengths are
    /// taken as-is, so lookups into short groups fail at [`Annotations::point`].
    pub fn from_named<S, I>(named: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (S, Vec<Position>)>,
    {
        let mut annotations = Self::new();
        for (name, points) in named {
            match name.as_ref().parse::<Contour>() {
                Ok(contour) => annotations.insert(contour, points),
                Err(e) => log::trace!("{}", e),
            }
        }
        annotations
    }

    /// Sets the points of `contour`, replacing any previous points.
    pub fn insert(&mut self, contour: Contour, points: Vec<Position>) {
        self.groups.insert(contour, points);
    }

    /// Returns the points of `contour`, if present.
    pub fn group(&self, contour: Contour) -> Option<&[Position]> {
        self.groups.get(&contour).map(Vec::as_slice)
    }

    /// Returns point `index` of `contour`, checking that the group exists and is long enough.
    pub fn point(&self, contour: Contour, index: usize) -> Result<Position, LandmarkError> {
        let group = self
            .group(contour)
            .ok_or(LandmarkError::MissingGroup(contour))?;
        group
            .get(index)
            .copied()
            .ok_or(LandmarkError::OutOfRange {
                contour,
                index,
                len: group.len(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Landmarks estimated for one face in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEstimate {
    mesh: Vec<Position>,
    annotations: Annotations,
}

impl FaceEstimate {
    pub fn new(mesh: Vec<Position>, annotations: Annotations) -> Self {
        Self { mesh, annotations }
    }

    /// Creates an estimate from a full face mesh, deriving its annotations.
    pub fn from_mesh(mesh: Vec<Position>) -> Result<Self, LandmarkError> {
        let annotations = Annotations::from_mesh(&mesh)?;
        Ok(Self { mesh, annotations })
    }

    #[inline]
    pub fn mesh(&self) -> &[Position] {
        &self.mesh
    }

    #[inline]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
}

/// Landmark model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkerConfig {
    max_faces: usize,
}

impl Default for LandmarkerConfig {
    fn default() -> Self {
        Self { max_faces: 1 }
    }
}

impl LandmarkerConfig {
    /// Sets the maximum number of faces returned per frame.
    pub fn max_faces(mut self, max_faces: usize) -> Self {
        self.max_faces = max_faces;
        self
    }

    #[inline]
    pub fn max_faces_limit(&self) -> usize {
        self.max_faces
    }
}

/// A face landmark model.
pub trait FaceLandmarker {
    /// Estimates the landmarks of every face visible in `image`.
    ///
    /// Returns an empty list if no face was found.
    fn estimate_faces(&mut self, image: &Image) -> anyhow::Result<Vec<FaceEstimate>>;
}

impl<L: FaceLandmarker + ?Sized> FaceLandmarker for Box<L> {
    fn estimate_faces(&mut self, image: &Image) -> anyhow::Result<Vec<FaceEstimate>> {
        (**self).estimate_faces(image)
    }
}
