use std::{path::PathBuf, process};

use clap::{Args, Parser, Subcommand};

use omote::{
    avatar::Rig,
    blur::{BackgroundBlur, BokehParams},
    facemesh::FaceMesh,
    landmark::LandmarkerConfig,
    puppet::AvatarPuppet,
    resolution::Resolution,
    segmentation::{OnnxSegmenter, SegmentationConfig},
    session::{Effect, LogIndicator, Session, StopHandle, TickOutcome},
    video::{Camera, CaptureConstraints, FileSink, FrameSource, StillCamera},
};

/// Webcam effects: background blur and face-tracked avatars.
///
/// Press Ctrl-C to stop.
#[derive(Parser, Debug)]
#[command(name = "omote", version, long_about = None)]
struct Cli {
    #[command(flatten)]
    input: InputArgs,

    #[command(subcommand)]
    effect: EffectCommand,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Use an image file instead of the webcam (processed once unless `--frames` is given)
    #[arg(long)]
    image: Option<PathBuf>,

    /// Name of the webcam to open (overrides OMOTE_WEBCAM_NAME)
    #[arg(long)]
    device: Option<String>,

    /// Requested camera frame width
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Requested camera frame height
    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Requested camera frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames (default: run until the stream ends or Ctrl-C is pressed)
    #[arg(long)]
    frames: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum EffectCommand {
    /// Blur the background behind the person in the frame
    Blur {
        /// Person segmentation network (.onnx)
        #[arg(long)]
        model: PathBuf,

        /// Where to write the latest composited frame (.png or .jpg)
        #[arg(short, long, default_value = "bokeh.png")]
        output: PathBuf,

        /// Write only every N-th frame to the output file
        #[arg(long, default_value_t = 1)]
        output_every: u32,

        /// Background blur strength in pixels (1-20)
        #[arg(long, default_value_t = 3)]
        background_blur: u32,

        /// Edge blur strength in pixels (0-20)
        #[arg(long, default_value_t = 3)]
        edge_blur: u32,

        /// Don't mirror the output
        #[arg(long)]
        no_flip: bool,

        /// Person probability threshold
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
    },
    /// Drive a 3D avatar with the tracked face
    Avatar {
        /// Face mesh landmark network (.onnx)
        #[arg(long)]
        model: PathBuf,

        /// Maximum number of faces to track
        #[arg(long, default_value_t = 1)]
        max_faces: usize,

        /// Where to write the latest face mesh overlay (.png or .jpg)
        #[arg(short, long, default_value = "mesh.png")]
        output: PathBuf,

        /// Write only every N-th overlay to the output file
        #[arg(long, default_value_t = 1)]
        output_every: u32,
    },
}

/// Opens either the still image given on the command line or the webcam.
struct InputCamera {
    image: Option<PathBuf>,
    repeat_image: bool,
}

impl Camera for InputCamera {
    type Source = Box<dyn FrameSource>;

    fn acquire(&mut self, constraints: &CaptureConstraints) -> anyhow::Result<Self::Source> {
        match &self.image {
            Some(path) => {
                let mut camera = StillCamera::new(path).repeat(self.repeat_image);
                Ok(Box::new(camera.acquire(constraints)?))
            }
            None => open_webcam(constraints),
        }
    }
}

#[cfg(target_os = "linux")]
fn open_webcam(constraints: &CaptureConstraints) -> anyhow::Result<Box<dyn FrameSource>> {
    use omote::video::webcam::V4l2Camera;

    Ok(Box::new(V4l2Camera.acquire(constraints)?))
}

#[cfg(not(target_os = "linux"))]
fn open_webcam(_constraints: &CaptureConstraints) -> anyhow::Result<Box<dyn FrameSource>> {
    anyhow::bail!("webcam capture is only supported on Linux, use `--image` instead")
}

fn main() {
    omote::init_logger!();

    let cli = Cli::parse();

    let mut constraints =
        CaptureConstraints::default().resolution(Resolution::new(cli.input.width, cli.input.height));
    if let Some(fps) = cli.input.fps {
        constraints = constraints.fps(fps);
    }
    if let Some(device) = &cli.input.device {
        constraints = constraints.device(device.clone());
    }
    let mut camera = InputCamera {
        image: cli.input.image.clone(),
        repeat_image: cli.input.frames.is_some(),
    };

    let result = match cli.effect {
        EffectCommand::Blur {
            model,
            output,
            output_every,
            background_blur,
            edge_blur,
            no_flip,
            threshold,
        } => {
            let params = BokehParams::default()
                .background_blur(background_blur)
                .edge_blur(edge_blur)
                .flip_horizontal(!no_flip);
            let config = SegmentationConfig::default().threshold(threshold);
            start_and_run(&mut camera, &constraints, cli.input.frames, || {
                let segmenter = OnnxSegmenter::load(&model, config)?;
                let sink = FileSink::new(&output).every(output_every);
                BackgroundBlur::new(segmenter, sink, params)
            })
        }
        EffectCommand::Avatar {
            model,
            max_faces,
            output,
            output_every,
        } => {
            let config = LandmarkerConfig::default().max_faces(max_faces);
            start_and_run(&mut camera, &constraints, cli.input.frames, || {
                let landmarker = FaceMesh::load(&model, config)?;
                let sink = FileSink::new(&output).every(output_every);
                Ok(AvatarPuppet::new(landmarker, Rig::new(), sink))
            })
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        process::exit(1);
    }
}

fn start_and_run<E, L>(
    camera: &mut InputCamera,
    constraints: &CaptureConstraints,
    frames: Option<u64>,
    load: L,
) -> anyhow::Result<()>
where
    E: Effect,
    L: FnOnce() -> anyhow::Result<E>,
{
    let mut session = Session::start(camera, constraints, &mut LogIndicator, load)?;
    stop_on_ctrl_c(session.stop_handle())?;

    let Some(frames) = frames else {
        return session.run();
    };

    let mut rendered = 0;
    for _ in 0..frames {
        match session.tick()? {
            TickOutcome::Rendered => rendered += 1,
            TickOutcome::Stopped | TickOutcome::EndOfStream => break,
            _ => {}
        }
    }
    session.stop();
    log::info!("rendered {} of {} frames", rendered, frames);
    Ok(())
}

fn stop_on_ctrl_c(handle: StopHandle) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        log::info!("interrupted");
        handle.stop();
    })?;
    Ok(())
}
