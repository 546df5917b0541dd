use crate::config::Config;
use crate::{ApplyArgs, PrefsAction};
use anyhow::{bail, Context, Result};
use image::RgbaImage;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tryon_core::compare::{before_after, side_by_side};
use tryon_core::debug::landmark_preview;
use tryon_core::{
    detect_landmarks, start_overlay, Canvas, FaceLandmarks, FrameDriver, Notice, Notifier, OverlayOptions,
    OverlayRequest, PendingImage, SessionManager, SoftwareRenderer, Surface,
};
use tryon_media::{decode, spawn_decode, ImageSource, PreferenceStore, Preferences, RecordedLandmarks, ViewMode};

/// Prints notices for the user on stderr.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&mut self, notice: Notice) {
        eprintln!("{notice}");
    }
}

async fn decode_or_notify(source: ImageSource, timeout: Duration, notifier: &mut dyn Notifier) -> Result<RgbaImage> {
    let label = source.to_string();
    match decode(source, timeout).await {
        Ok(image) => Ok(image),
        Err(e) => {
            notifier.notify(Notice::DecodeFailed(format!("{label}: {e}")));
            Err(e).with_context(|| format!("decoding {label}"))
        }
    }
}

/// One overlay render, independent of argument parsing and stored preferences.
pub(crate) struct OverlayJob {
    pub landmarks: FaceLandmarks,
    pub width: u32,
    pub height: u32,
    pub mask: ImageSource,
    pub background: ImageSource,
    pub options: OverlayOptions,
    pub frames: usize,
    pub timeout: Duration,
}

/// Replace the overlay on `manager`'s target with `job` and return the
/// composited frame once the photo has landed.
///
/// The session starts only after the mask decodes. A failed mask or photo
/// decode raises [`Notice::DecodeFailed`], tears the session down and leaves
/// the target blank.
pub(crate) async fn render_overlay(
    manager: &mut SessionManager<FrameDriver, Canvas>,
    job: OverlayJob,
    notifier: &mut dyn Notifier,
) -> Result<RgbaImage> {
    let ticket = manager.begin();

    // The photo layer decodes alongside the mask; the session may start before it lands.
    let background_label = job.background.to_string();
    let background = PendingImage::new();
    let background_task = spawn_decode(job.background, background.clone(), job.timeout);

    let mask = match decode_or_notify(job.mask, job.timeout, notifier).await {
        Ok(mask) => mask,
        Err(e) => {
            background_task.abort();
            manager.teardown();
            return Err(e);
        }
    };

    let request = OverlayRequest::new(job.landmarks, job.width, job.height, mask, background);
    let session = start_overlay(manager, ticket, &request, &job.options, SoftwareRenderer::new())?;

    for _ in 0..job.frames.max(1) {
        manager.scheduler_mut().tick();
        tokio::task::yield_now().await;
    }

    let background_err = match background_task.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(anyhow::Error::new(e)),
        Err(join) => Some(anyhow::anyhow!("background decode task failed: {join}")),
    };
    if let Some(e) = background_err {
        manager.teardown();
        notifier.notify(Notice::DecodeFailed(format!("{background_label}: {e}")));
        return Err(e.context(format!("decoding {background_label}")));
    }

    // One more frame so the output carries the photo and a settled light estimate.
    manager.scheduler_mut().tick();
    if !manager.is_active() {
        bail!("render session {session} stopped before the result was captured");
    }
    let after = manager.target().borrow().pixels().clone();
    Ok(after)
}

pub async fn apply(args: ApplyArgs, config: &Config) -> Result<()> {
    let store = PreferenceStore::new(&config.prefs_path);
    let mut prefs = store.load()?;
    let face_path = args
        .face
        .clone()
        .or_else(|| prefs.face_image.clone())
        .context("no face photo: pass --face or store one with a previous apply")?;
    let mask_path = args
        .mask
        .clone()
        .or_else(|| prefs.mask_image.clone())
        .context("no mask: pass --mask or store one with a previous apply")?;
    merge_flags(&mut prefs, &args);

    let timeout = config.decode_timeout();
    let mut notifier = StderrNotifier;

    let face = decode_or_notify(ImageSource::Path(face_path.clone()), timeout, &mut notifier).await?;
    let mut provider = RecordedLandmarks::load(&args.landmarks)?;
    let landmarks = detect_landmarks(&mut provider, &face, &mut notifier)?;
    let (width, height) = face.dimensions();

    let target = Rc::new(RefCell::new(Canvas::new(width, height)));
    let mut manager = SessionManager::new(FrameDriver::new(), target);
    let job = OverlayJob {
        landmarks,
        width,
        height,
        mask: ImageSource::Path(mask_path.clone()),
        background: ImageSource::Path(face_path.clone()),
        options: prefs.overlay_options(args.debug || config.debug_light),
        frames: args.frames.unwrap_or(config.frames),
        timeout,
    };
    let after = render_overlay(&mut manager, job, &mut notifier).await?;

    save(&after, &args.out)?;
    println!("Wrote {}", args.out.display());

    if let Some(path) = &args.compare_out {
        let comparison = compose(&face, &after, prefs.view_mode, prefs.slider);
        save(&comparison, path)?;
        println!("Wrote {}", path.display());
    }

    manager.teardown();

    prefs.face_image = Some(absolute(&face_path));
    prefs.mask_image = Some(absolute(&mask_path));
    store.save(&prefs.sanitized())?;
    tracing::info!(frames = manager.scheduler().frame(), "apply finished");
    Ok(())
}

fn merge_flags(prefs: &mut Preferences, args: &ApplyArgs) {
    if let Some(tint) = args.tint {
        prefs.tint = tint;
    }
    if let Some(opacity) = args.opacity {
        prefs.opacity = opacity;
    }
    if args.wireframe {
        prefs.show_wireframe = true;
    }
    if args.no_wireframe {
        prefs.show_wireframe = false;
    }
    if let Some(view) = args.view {
        prefs.view_mode = view;
    }
    if let Some(slider) = args.slider {
        prefs.slider = slider;
    }
}

pub async fn preview(face: &Path, landmarks: &Path, out: &Path, config: &Config) -> Result<()> {
    let mut notifier = StderrNotifier;
    let image = decode_or_notify(ImageSource::Path(face.to_path_buf()), config.decode_timeout(), &mut notifier).await?;
    let mut provider = RecordedLandmarks::load(landmarks)?;
    let detected = detect_landmarks(&mut provider, &image, &mut notifier)?;

    let mut canvas = Canvas::new(image.width(), image.height());
    canvas.draw_image(&image, 0, 0);
    landmark_preview(&mut canvas, &detected.keypoints, &detected.triangulation);
    save(canvas.pixels(), out)?;
    println!("Wrote {} ({} keypoints)", out.display(), detected.keypoints.len());
    Ok(())
}

pub async fn compare(
    before: &Path,
    after: &Path,
    out: &Path,
    view: Option<ViewMode>,
    slider: Option<u8>,
    config: &Config,
) -> Result<()> {
    let store = PreferenceStore::new(&config.prefs_path);
    let mut notifier = StderrNotifier;
    let timeout = config.decode_timeout();
    let before_img = decode_or_notify(ImageSource::Path(before.to_path_buf()), timeout, &mut notifier).await?;
    let after_img = decode_or_notify(ImageSource::Path(after.to_path_buf()), timeout, &mut notifier).await?;

    let prefs = store.update(|p| {
        if let Some(view) = view {
            p.view_mode = view;
        }
        if let Some(slider) = slider {
            p.slider = slider;
        }
    })?;

    save(&compose(&before_img, &after_img, prefs.view_mode, prefs.slider), out)?;
    println!("Wrote {} ({} view)", out.display(), prefs.view_mode);
    Ok(())
}

pub fn prefs(action: PrefsAction, config: &Config) -> Result<()> {
    let store = PreferenceStore::new(&config.prefs_path);
    let prefs = match action {
        PrefsAction::Show => store.load()?,
        PrefsAction::Clear => store.clear_all()?,
        PrefsAction::RemoveFace => store.remove_face()?,
        PrefsAction::RemoveMask => store.remove_mask()?,
    };

    println!("Preferences ({})", store.path().display());
    println!("  face_image:     {}", display_path(prefs.face_image.as_deref()));
    println!("  mask_image:     {}", display_path(prefs.mask_image.as_deref()));
    println!("  show_wireframe: {}", prefs.show_wireframe);
    println!("  slider:         {}", prefs.slider);
    println!("  view_mode:      {}", prefs.view_mode);
    println!("  tint:           {}", prefs.tint);
    println!("  opacity:        {:.2}", prefs.opacity);
    Ok(())
}

fn compose(before: &RgbaImage, after: &RgbaImage, view: ViewMode, slider: u8) -> RgbaImage {
    match view {
        ViewMode::Side => side_by_side(before, after),
        ViewMode::Before => before_after(before, after, slider),
    }
}

fn save(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
