use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use orlando_formats::{FlxAnimation, FrameOutcome};

#[derive(Parser)]
struct Args {
    /// Path to an .flx file to inspect.
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut animation = FlxAnimation::open(std::fs::read(&args.input)?)?;
    let header = animation.header();
    println!(
        "FLX {}: {} frames, {}x{}",
        args.input.display(),
        header.frame_count,
        header.width,
        header.height
    );

    let mut skipped = 0u32;
    for _ in 0..header.frame_count {
        if animation.next_frame()? == FrameOutcome::Skipped {
            skipped += 1;
        }
    }
    println!("Frames decoded: {}, blank: {skipped}", animation.frames_read());
    Ok(())
}
