use std::{cell::RefCell, rc::Rc, thread, time::Duration};

use anyhow::bail;
use nalgebra::Matrix3;

use omote::{
    avatar::{Bone, Rig},
    blur::{BackgroundBlur, BokehParams},
    expression::Expression,
    image::{Color, Image},
    landmark::{Annotations, Contour, FaceEstimate, FaceLandmarker},
    puppet::AvatarPuppet,
    resolution::Resolution,
    segmentation::{Mask, Segmenter},
    session::{Effect, LoadingIndicator, Session, StartError, StopHandle, TickOutcome},
    video::{Camera, CaptureConstraints, FrameSink, FrameSource, NullSink, StillImage},
};

#[derive(Default)]
struct RecordingIndicator(Vec<bool>);

impl LoadingIndicator for RecordingIndicator {
    fn set_loading(&mut self, loading: bool) {
        self.0.push(loading);
    }
}

/// A camera that fails or hands out a still frame, counting acquisition attempts.
struct MockCamera {
    deny: bool,
    acquired: usize,
}

impl MockCamera {
    fn new(deny: bool) -> Self {
        Self { deny, acquired: 0 }
    }
}

impl Camera for MockCamera {
    type Source = StillImage;

    fn acquire(&mut self, constraints: &CaptureConstraints) -> anyhow::Result<StillImage> {
        self.acquired += 1;
        if self.deny {
            bail!("permission denied");
        }
        let res = constraints.requested_resolution();
        Ok(StillImage::new(Image::new(res.width(), res.height())))
    }
}

/// Plays back a scripted sequence of landmarker results.
struct ScriptedLandmarker {
    script: Vec<anyhow::Result<Vec<FaceEstimate>>>,
    on_estimate: Option<StopHandle>,
}

impl ScriptedLandmarker {
    fn new(script: Vec<anyhow::Result<Vec<FaceEstimate>>>) -> Self {
        Self {
            script,
            on_estimate: None,
        }
    }
}

impl FaceLandmarker for ScriptedLandmarker {
    fn estimate_faces(&mut self, _image: &Image) -> anyhow::Result<Vec<FaceEstimate>> {
        if let Some(handle) = &self.on_estimate {
            handle.stop();
        }
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        self.script.remove(0)
    }
}

fn face(mouth_gap: f32) -> FaceEstimate {
    let mut annotations = Annotations::new();
    let mut silhouette = vec![[0.0; 3]; 36];
    silhouette[27] = [1.0, 0.0, 0.0];
    silhouette[0] = [0.0, 1.0, 0.0];
    annotations.insert(Contour::Silhouette, silhouette);
    annotations.insert(Contour::LipsUpperInner, vec![[0.0, 50.0, 0.0]; 11]);
    annotations.insert(Contour::LipsLowerInner, vec![[0.0, 50.0 + mouth_gap, 0.0]; 11]);
    FaceEstimate::new(Vec::new(), annotations)
}

type Puppet = AvatarPuppet<ScriptedLandmarker, Rig, SharedSink>;

fn start_puppet(landmarker: ScriptedLandmarker) -> Session<StillImage, Puppet> {
    let mut camera = MockCamera::new(false);
    let mut indicator = RecordingIndicator::default();
    let session = Session::start(
        &mut camera,
        &CaptureConstraints::default(),
        &mut indicator,
        || Ok(AvatarPuppet::new(landmarker, Rig::new(), SharedSink::default())),
    )
    .unwrap();
    assert_eq!(indicator.0, [true, false]);
    assert_eq!(session.source().resolution(), Resolution::new(320, 240));
    session
}

#[test]
fn camera_denied() {
    let mut camera = MockCamera::new(true);
    let mut indicator = RecordingIndicator::default();
    let mut loaded = false;

    let result = Session::start(
        &mut camera,
        &CaptureConstraints::default(),
        &mut indicator,
        || {
            loaded = true;
            Ok(AvatarPuppet::new(
                ScriptedLandmarker::new(Vec::new()),
                Rig::new(),
                NullSink,
            ))
        },
    );

    match result {
        Err(StartError::Acquisition(e)) => assert_eq!(e.to_string(), "permission denied"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("session started without a camera"),
    }
    assert_eq!(camera.acquired, 1);
    assert!(!loaded);
    assert_eq!(indicator.0, [true, false]);
}

#[test]
fn model_load_failure() {
    let mut camera = MockCamera::new(false);
    let mut indicator = RecordingIndicator::default();

    let result = Session::<StillImage, Puppet>::start(
        &mut camera,
        &CaptureConstraints::default(),
        &mut indicator,
        || bail!("no such model"),
    );

    assert!(matches!(result, Err(StartError::ModelLoad(_))));
    assert_eq!(camera.acquired, 1);
    assert_eq!(indicator.0, [true, false]);
}

#[test]
fn zero_faces_keep_previous_state() {
    let mut session = start_puppet(ScriptedLandmarker::new(vec![
        Ok(vec![face(5.0)]),
        Ok(Vec::new()),
    ]));

    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);
    let rig = session.effect().avatar();
    let head = *rig.bone_rotation(Bone::Head).unwrap();
    let blink = rig.expression_weight(Expression::Blink).unwrap();
    assert_eq!(rig.expression_weight(Expression::A), Some(0.5));

    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);
    let rig = session.effect().avatar();
    assert_eq!(rig.bone_rotation(Bone::Head), Some(&head));
    assert_eq!(rig.expression_weight(Expression::Blink), Some(blink));
    assert_eq!(rig.expression_weight(Expression::A), Some(0.5));
    assert_eq!(rig.frames_rendered(), 2);
    assert_eq!(session.effect().last_report().faces, 0);
}

#[test]
fn inference_failure_keeps_looping() {
    let mut session = start_puppet(ScriptedLandmarker::new(vec![
        Err(anyhow::anyhow!("inference rejected")),
        Ok(vec![face(20.0)]),
    ]));

    assert_eq!(session.tick().unwrap(), TickOutcome::EstimateFailed);
    assert_eq!(session.effect().avatar().frames_rendered(), 0);
    assert!(session.is_running());

    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);
    assert_eq!(
        session.effect().avatar().expression_weight(Expression::A),
        Some(1.0)
    );
}

#[test]
fn malformed_silhouette_is_skipped() {
    let mut short = Annotations::new();
    short.insert(Contour::Silhouette, vec![[0.0; 3]; 10]);
    short.insert(Contour::LipsUpperInner, vec![[0.0; 3]; 11]);
    short.insert(Contour::LipsLowerInner, vec![[0.0, 3.0, 0.0]; 11]);

    let mut session = start_puppet(ScriptedLandmarker::new(vec![Ok(vec![FaceEstimate::new(
        Vec::new(),
        short,
    )])]));

    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);
    let rig = session.effect().avatar();
    assert_eq!(rig.bone_rotation(Bone::Head), None);
    assert_eq!(rig.expression_weight(Expression::A), None);
    assert_eq!(rig.frames_rendered(), 1);
    assert_eq!(session.effect().last_report().skipped, 1);
}

#[test]
fn estimate_after_stop_is_discarded() {
    let mut session = start_puppet(ScriptedLandmarker::new(vec![Ok(vec![face(5.0)])]));
    // stop the session while the landmarker is running
    let handle = session.stop_handle();
    session.effect_mut().landmarker_mut().on_estimate = Some(handle);

    assert_eq!(session.tick().unwrap(), TickOutcome::Discarded);
    assert_eq!(session.effect().avatar().bone_rotation(Bone::Head), None);
    assert_eq!(session.effect().avatar().frames_rendered(), 0);
    assert_eq!(session.tick().unwrap(), TickOutcome::Stopped);
    session.run().unwrap();
}

#[test]
fn head_rotation_is_overwritten_each_tick() {
    let mut tilted = face(0.0);
    let mut annotations = tilted.annotations().clone();
    let mut silhouette = annotations.group(Contour::Silhouette).unwrap().to_vec();
    silhouette[27] = [0.0, 1.0, 0.0];
    silhouette[0] = [-1.0, 0.0, 0.0];
    annotations.insert(Contour::Silhouette, silhouette);
    tilted = FaceEstimate::new(Vec::new(), annotations);

    let mut session = start_puppet(ScriptedLandmarker::new(vec![
        Ok(vec![face(0.0)]),
        Ok(vec![tilted]),
    ]));
    session.tick().unwrap();
    let first = *session.effect().avatar().bone_rotation(Bone::Head).unwrap();
    session.tick().unwrap();
    let second = *session.effect().avatar().bone_rotation(Bone::Head).unwrap();
    assert_ne!(first, second);
    assert_ne!(second, Matrix3::identity());
}

/// A segmenter marking the left half of the frame as person.
struct LeftHalf;

impl Segmenter for LeftHalf {
    fn segment_person(&mut self, image: &Image) -> anyhow::Result<Mask> {
        let half = image.width() / 2;
        Ok(Mask::from_fn(image.resolution(), |x, _| {
            if x < half {
                1.0
            } else {
                0.0
            }
        }))
    }
}

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<Image>>>);

impl FrameSink for SharedSink {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        self.0.borrow_mut().push(image.clone());
        Ok(())
    }
}

#[test]
fn background_blur_shows_composited_frames() {
    let frame = Image::from_fn(8, 4, |x, _| {
        if x % 2 == 0 {
            Color::BLACK
        } else {
            Color::WHITE
        }
    });
    let sink = SharedSink::default();
    let effect = BackgroundBlur::new(
        LeftHalf,
        sink.clone(),
        BokehParams::default().edge_blur(0),
    )
    .unwrap();
    assert_eq!(effect.name(), "blur");

    let mut session = Session::new(StillImage::new(frame.clone()), effect);
    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);
    assert_eq!(session.tick().unwrap(), TickOutcome::Rendered);

    let shown = sink.0.borrow();
    assert_eq!(shown.len(), 2);
    let out = &shown[0];
    assert_eq!(out.resolution(), frame.resolution());
    // mirrored: the sharp person half ends up on the right
    for x in 0..4 {
        assert_eq!(out.get(7 - x, 1), frame.get(x, 1));
    }
}

#[test]
fn invalid_bokeh_params_fail_to_load() {
    let mut camera = MockCamera::new(false);
    let mut indicator = RecordingIndicator::default();
    let result = Session::start(
        &mut camera,
        &CaptureConstraints::default(),
        &mut indicator,
        || BackgroundBlur::new(LeftHalf, SharedSink::default(), BokehParams::default().edge_blur(50)),
    );
    assert!(matches!(result, Err(StartError::ModelLoad(_))));
    assert_eq!(indicator.0, [true, false]);
}

#[test]
fn frame_source_errors_are_fatal() {
    struct Unplugged;

    impl FrameSource for Unplugged {
        fn read(&mut self) -> anyhow::Result<Option<Image>> {
            bail!("device unplugged")
        }

        fn resolution(&self) -> Resolution {
            Resolution::new(0, 0)
        }
    }

    let effect = AvatarPuppet::new(ScriptedLandmarker::new(Vec::new()), Rig::new(), NullSink);
    let mut session = Session::new(Unplugged, effect);
    assert!(session.tick().is_err());
    assert!(session.run().is_err());
}

#[test]
fn mesh_overlay_is_shown_every_tick() {
    let meshed = FaceEstimate::new(
        vec![[10.0, 20.0, 0.0], [300.0, 200.0, 0.0]],
        face(5.0).annotations().clone(),
    );
    let mut session = start_puppet(ScriptedLandmarker::new(vec![Ok(vec![meshed]), Ok(Vec::new())]));
    session.tick().unwrap();
    session.tick().unwrap();

    let shown = session.effect().overlay().0.borrow();
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0].resolution(), Resolution::new(320, 240));
    assert_ne!(shown[0].get(10, 20), Color::NULL);
    assert_ne!(shown[0].get(300, 200), Color::NULL);
    assert_eq!(shown[0].get(100, 100), Color::NULL);

    // no faces: the overlay is cleared
    let cleared = &shown[1];
    for y in 0..cleared.height() {
        for x in 0..cleared.width() {
            assert_eq!(cleared.get(x, y), Color::NULL);
        }
    }
}

#[test]
fn still_image_runs_once() {
    let effect = AvatarPuppet::new(
        ScriptedLandmarker::new(vec![Ok(vec![face(10.0)])]),
        Rig::new(),
        NullSink,
    );
    let mut session = Session::new(StillImage::once(Image::new(32, 24)), effect);
    session.run().unwrap();

    assert!(!session.is_running());
    assert_eq!(session.effect().avatar().frames_rendered(), 1);
    assert_eq!(
        session.effect().avatar().expression_weight(Expression::A),
        Some(1.0)
    );
}

#[test]
fn stop_from_another_thread_ends_run() {
    let effect = AvatarPuppet::new(ScriptedLandmarker::new(Vec::new()), Rig::new(), NullSink);
    let mut session = Session::new(StillImage::new(Image::new(8, 8)), effect);
    let handle = session.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.stop();
    });

    session.run().unwrap();
    stopper.join().unwrap();
    assert!(!session.is_running());
}
