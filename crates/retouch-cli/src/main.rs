use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use retouch_contracts::options::{EditOptions, FocusMode, GenerateOptions, VariationOptions};
use retouch_contracts::workspace::ImageWorkspace;
use retouch_engine::{ImageApiClient, ImageApiConfig, RetouchEngine, VisionClient, VisionConfig};

#[derive(Debug, Parser)]
#[command(
    name = "retouch",
    version,
    about = "Subject-aware photo editing through a generative image API"
)]
struct Cli {
    /// Working directory for pipeline artifacts.
    #[arg(long, global = true, default_value = "images")]
    out: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Edit the background or foreground of a photo.
    Edit(EditArgs),
    /// Generate images from a prompt alone.
    Generate(GenerateArgs),
    /// Create variations of an existing image.
    Variant(VariantArgs),
}

#[derive(Debug, Parser)]
struct EditArgs {
    /// Instruction describing the edit.
    #[arg(long)]
    prompt: String,
    /// Path to the base image.
    #[arg(long)]
    image: PathBuf,
    /// Part of the image the edit targets: background or foreground.
    #[arg(long)]
    focus: FocusMode,
    /// Number of edited images to request.
    #[arg(long, default_value_t = 1)]
    count: u32,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Prompt for the generated image.
    #[arg(long)]
    prompt: String,
    /// Number of images to request.
    #[arg(long, default_value_t = 1)]
    count: u32,
}

#[derive(Debug, Parser)]
struct VariantArgs {
    /// Path to the base image.
    #[arg(long)]
    image: PathBuf,
    /// Number of variants to request.
    #[arg(long, default_value_t = 4)]
    count: u32,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    let workspace = ImageWorkspace::create(&cli.out)
        .with_context(|| format!("cannot prepare working directory {}", cli.out.display()))?;

    let saved = match cli.command {
        Command::Edit(args) => {
            let engine = RetouchEngine::new(workspace, image_api_client()?)
                .with_vision(VisionClient::new(VisionConfig::from_env()?));
            engine.edit(&EditOptions {
                prompt: args.prompt,
                source: args.image,
                focus: args.focus,
                count: args.count,
            })?
        }
        Command::Generate(args) => {
            let engine = RetouchEngine::new(workspace, image_api_client()?);
            engine.generate(&GenerateOptions {
                prompt: args.prompt,
                count: args.count,
            })?
        }
        Command::Variant(args) => {
            let engine = RetouchEngine::new(workspace, image_api_client()?);
            engine.variation(&VariationOptions {
                source: args.image,
                count: args.count,
            })?
        }
    };

    for path in &saved {
        println!("saved {}", path.display());
    }
    Ok(0)
}

fn image_api_client() -> Result<ImageApiClient> {
    Ok(ImageApiClient::new(ImageApiConfig::from_env()?))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("retouch_engine=info,retouch_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn edit_requires_prompt_image_and_focus() {
        assert!(Cli::try_parse_from(["retouch", "edit", "--prompt", "p"]).is_err());
        assert!(Cli::try_parse_from([
            "retouch", "edit", "--prompt", "p", "--image", "a.png", "--focus", "foreground",
        ])
        .is_ok());
    }

    #[test]
    fn unknown_focus_value_is_a_usage_error() {
        let err = Cli::try_parse_from([
            "retouch", "edit", "--prompt", "p", "--image", "a.png", "--focus", "blurry",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("unsupported focus mode"));
    }

    #[test]
    fn variant_count_defaults_to_four() {
        let cli =
            Cli::try_parse_from(["retouch", "variant", "--image", "a.png"]).expect("parse");
        match cli.command {
            Command::Variant(args) => assert_eq!(args.count, 4),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
