use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use orlando_formats::{FlxAnimation, FrameOutcome, PakArchive, write_png};

#[derive(Parser, Debug)]
#[command(about = "Decode FLX animation frames to PNG files", version)]
struct Args {
    /// FLX file, or a member name when --pak is given
    input: String,

    /// Read the animation out of this PAK archive
    #[arg(long, value_name = "PATH")]
    pak: Option<PathBuf>,

    /// Directory receiving frame_NNNN.png files
    #[arg(long, value_name = "DIR", default_value = "frames")]
    out: PathBuf,

    /// Number of frames to decode (defaults to one full cycle)
    #[arg(long)]
    frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let bytes = match args.pak.as_ref() {
        Some(pak) => {
            let archive = PakArchive::open(pak)?;
            archive
                .member_bytes(&args.input)
                .with_context(|| format!("{} not found in {}", args.input, pak.display()))?
                .to_vec()
        }
        None => fs::read(&args.input).with_context(|| format!("reading {}", args.input))?,
    };

    let mut animation = FlxAnimation::open(bytes)?;
    let header = animation.header();
    let total = args.frames.unwrap_or(u64::from(header.frame_count));
    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let mut written = 0u64;
    for index in 0..total {
        if animation.next_frame()? == FrameOutcome::Skipped {
            log::debug!("frame {index} left the surface unchanged");
        }
        let path = args.out.join(format!("frame_{index:04}.png"));
        write_png(animation.surface(), &path)?;
        written += 1;
    }

    println!(
        "Wrote {written} frames ({}x{}) to {}",
        header.width,
        header.height,
        args.out.display()
    );
    Ok(())
}
