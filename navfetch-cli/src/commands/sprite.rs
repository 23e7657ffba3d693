//! Sprite sheet installation and shield extraction.

use std::io::Cursor;
use std::path::PathBuf;

use clap::Args;
use image::{ImageFormat, RgbaImage};
use navfetch::sprite::{Generation, ShieldKey, SpriteError};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `navfetch sprite`.
#[derive(Debug, Args)]
pub struct SpriteArgs {
    /// Style identifier; cached sheets are scoped by it
    #[arg(long)]
    pub style_id: String,

    /// Base URL the sprite@Nx.png / sprite@Nx.json files live under
    #[arg(long)]
    pub base_url: String,

    /// Shield network to extract (e.g. us-interstate)
    #[arg(long, requires = "text")]
    pub shield: Option<String>,

    /// Route reference the shield is drawn for (e.g. 95)
    #[arg(long)]
    pub text: Option<String>,

    /// Sprite to extract by exact name
    #[arg(long, conflicts_with = "shield")]
    pub name: Option<String>,

    /// Write the extracted sprite as PNG
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Install the style's sprites, then optionally extract one.
pub fn run(args: SpriteArgs, debug: bool) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(debug)?;
    runner.log_startup("sprite");

    let context = runner.context()?;
    let sprites = context.sprites().clone();
    let generation = Generation::new(args.style_id.as_str(), args.base_url.as_str());

    let result = runner.block_on(async {
        let result = sprites.update_style_async(generation.clone()).await;
        context.shutdown().await;
        result
    });
    result?;

    let installed = sprites
        .installed()
        .ok_or(CliError::Sprite(SpriteError::Superseded))?;
    println!("Installed sprites for {} @{}x", generation, sprites.scale());
    println!(
        "  Sheet:   {}x{}",
        installed.sheet().width(),
        installed.sheet().height()
    );
    println!("  Sprites: {}", installed.metadata().len());

    let extracted = match (&args.shield, &args.name) {
        (Some(shield), _) => {
            let key = ShieldKey::for_text(shield.as_str(), args.text.as_deref().unwrap_or(""));
            let image = sprites.shield(&key).ok_or_else(|| {
                CliError::SpriteNotFound(format!("{}-{}", key.name, key.bucket()))
            })?;
            Some(image)
        }
        (None, Some(name)) => Some(
            sprites
                .sprite(name)
                .ok_or_else(|| CliError::SpriteNotFound(name.clone()))?,
        ),
        (None, None) => None,
    };

    if let Some(image) = extracted {
        println!("  Sprite:  {}x{}", image.width(), image.height());
        if let Some(path) = &args.output {
            runner.write_output(path, &encode_png(&image, path)?)?;
            println!("Saved to {}", path.display());
        }
    }

    Ok(())
}

fn encode_png(image: &RgbaImage, path: &std::path::Path) -> Result<Vec<u8>, CliError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| CliError::FileWrite {
            path: path.display().to_string(),
            error: std::io::Error::other(e),
        })?;
    Ok(cursor.into_inner())
}
