use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use orlando_formats::PakArchive;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(about = "List the members of an Orlando PAK archive", version)]
struct Args {
    /// PAK archive to inspect
    archive: PathBuf,

    /// Emit the table as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Listing<'a> {
    archive: String,
    layout: orlando_formats::PakLayout,
    entries: &'a [orlando_formats::PakEntry],
}

fn main() -> Result<()> {
    let args = Args::parse();
    let archive = PakArchive::open(&args.archive)?;

    if args.json {
        let listing = Listing {
            archive: args.archive.display().to_string(),
            layout: archive.layout(),
            entries: archive.entries(),
        };
        serde_json::to_writer_pretty(io::stdout().lock(), &listing)?;
        println!();
        return Ok(());
    }

    println!(
        "{} entries in {} ({:?} layout)",
        archive.entries().len(),
        args.archive.display(),
        archive.layout()
    );
    for entry in archive.entries() {
        println!(
            "{name:<24} {offset:>10} {size:>10}",
            name = entry.name,
            offset = entry.offset,
            size = entry.size
        );
    }
    Ok(())
}
