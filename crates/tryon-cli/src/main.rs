mod commands;
mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tryon_core::Tint;
use tryon_media::ViewMode;

#[derive(Parser)]
#[command(name = "tryon", about = "Virtual makeup try-on")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overlay a makeup mask on a face photo
    Apply(ApplyArgs),
    /// Draw detected landmarks and mesh edges over a photo
    Preview {
        /// Face photo
        #[arg(long)]
        face: PathBuf,
        /// Recorded landmark JSON for the photo
        #[arg(long)]
        landmarks: PathBuf,
        /// Output PNG
        #[arg(long)]
        out: PathBuf,
    },
    /// Compose a before/after comparison of two images
    Compare {
        #[arg(long)]
        before: PathBuf,
        #[arg(long)]
        after: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Layout: side or before
        #[arg(long)]
        view: Option<ViewMode>,
        /// Percentage of the after image revealed in `before` view
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        slider: Option<u8>,
    },
    /// Show or reset stored preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Face photo (defaults to the stored one)
    #[arg(long)]
    face: Option<PathBuf>,
    /// Makeup mask texture laid out in face-mesh UV space (defaults to the stored one)
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Recorded landmark JSON for the photo
    #[arg(long)]
    landmarks: PathBuf,
    /// Output PNG of the composited result
    #[arg(long, default_value = "tryon.png")]
    out: PathBuf,
    /// Also write a before/after comparison here
    #[arg(long)]
    compare_out: Option<PathBuf>,
    /// Mask tint as #rrggbb
    #[arg(long)]
    tint: Option<Tint>,
    /// Mask opacity, 0.0 to 1.0
    #[arg(long, value_parser = parse_opacity)]
    opacity: Option<f32>,
    /// Draw the mesh wireframe
    #[arg(long, conflicts_with = "no_wireframe")]
    wireframe: bool,
    /// Hide the mesh wireframe
    #[arg(long)]
    no_wireframe: bool,
    /// Draw light sample points and direction
    #[arg(long)]
    debug: bool,
    /// Comparison layout: side or before
    #[arg(long)]
    view: Option<ViewMode>,
    /// Percentage of the after image revealed in `before` view
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    slider: Option<u8>,
    /// Frames to render before capturing the result
    #[arg(long)]
    frames: Option<usize>,
}

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print stored preferences
    Show,
    /// Forget stored images and reset view settings
    Clear,
    /// Forget the stored face photo
    RemoveFace,
    /// Forget the stored mask
    RemoveMask,
}

fn parse_opacity(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("opacity must be between 0 and 1, got {value}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env();

    match cli.command {
        Commands::Apply(args) => commands::apply(args, &config).await?,
        Commands::Preview { face, landmarks, out } => {
            commands::preview(&face, &landmarks, &out, &config).await?
        }
        Commands::Compare {
            before,
            after,
            out,
            view,
            slider,
        } => commands::compare(&before, &after, &out, view, slider, &config).await?,
        Commands::Prefs { action } => commands::prefs(action, &config)?,
    }

    Ok(())
}
