//! Webcam effects powered by pretrained neural networks.
//!
//! Omote runs one of two effects on a live camera feed:
//!
//! - **Background blur** ([`blur`]): a person segmentation network separates the person from the
//!   background, and the background is blurred ("bokeh").
//! - **Avatar puppeteering** ([`puppet`]): a face landmark network tracks the face, and the head
//!   orientation and a couple of expressions are mapped onto a 3D avatar ([`avatar`]).
//!
//! Both effects are driven by a [`session::Session`], which owns the camera stream and the effect,
//! and runs one capture → estimate → render iteration per tick.
//!
//! # Coordinates
//!
//! Landmarks use the coordinate system of the input image: X points to the right, Y points *down*,
//! and units are pixels of the camera frame. Z is in the same scale as X, but its origin is
//! network-specific.
//!
//! # Environment Variables
//!
//! * `OMOTE_WEBCAM_NAME`: Forces the device to use for webcams opened without an explicit device
//!   name. If unset, the first device that supports a compatible image format will be used.
//! * `RUST_LOG`: Overrides the log filter set up by [`init_logger!`].

pub mod avatar;
pub mod blur;
pub mod expression;
pub mod facemesh;
pub mod image;
pub mod landmark;
pub mod nn;
pub mod pose;
pub mod puppet;
pub mod resolution;
pub mod segmentation;
pub mod session;
pub mod timer;
pub mod video;


use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and Omote will log at *trace* level.
/// Otherwise, they will log at *debug* level.
///
/// `tract` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
