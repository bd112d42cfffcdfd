use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use orlando_formats::PakArchive;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract Orlando PAK archives", version)]
struct Args {
    /// PAK archive to extract (may be passed multiple times)
    #[arg(long = "pak", value_name = "PATH", conflicts_with = "root")]
    paks: Vec<PathBuf>,

    /// Directory containing PAK archives (recursively scanned when --pak is not used)
    #[arg(long = "root", value_name = "DIR", conflicts_with = "paks")]
    root: Option<PathBuf>,

    /// Destination directory to materialise members
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Member names to extract (case-insensitive, may repeat)
    #[arg(long = "member", value_name = "NAME")]
    members: Vec<String>,

    /// Decode obfuscated text members (CCG, MCC, ...) while extracting
    #[arg(long)]
    decode_text: bool,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

const TEXT_EXTENSIONS: &[&str] = &["CCG", "DLG", "FCS", "PCS", "ACE", "ANM", "INS", "FLM", "MCC"];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let paks = resolve_pak_paths(&args);
    if paks.is_empty() {
        bail!("no PAK archives to extract");
    }

    let filter: HashSet<String> = args
        .members
        .iter()
        .map(|name| name.trim().to_ascii_uppercase())
        .collect();

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for pak_path in paks {
        let archive = PakArchive::open(&pak_path)?;
        extract_archive(&archive, &pak_path, &args, &filter)?;
    }
    Ok(())
}

fn resolve_pak_paths(args: &Args) -> Vec<PathBuf> {
    let mut paks = Vec::new();
    if !args.paks.is_empty() {
        paks.extend(args.paks.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let is_pak = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pak"));
            if entry.file_type().is_file() && is_pak {
                paks.push(entry.into_path());
            }
        }
    }
    paks.sort();
    paks.dedup();
    paks
}

fn is_text_member(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)))
}

fn extract_archive(
    archive: &PakArchive,
    pak_path: &Path,
    args: &Args,
    filter: &HashSet<String>,
) -> Result<()> {
    let stem = pak_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("pak")
        .to_ascii_uppercase();
    let pak_dest = args.dest.join(stem);
    fs::create_dir_all(&pak_dest).with_context(|| format!("creating {}", pak_dest.display()))?;

    let mut extracted = 0usize;
    for entry in archive.entries() {
        if !filter.is_empty() && !filter.contains(&entry.name.to_ascii_uppercase()) {
            continue;
        }

        let raw = PathBuf::from(entry.name.replace('\\', "/"));
        let mut relative = PathBuf::new();
        for component in raw.components() {
            if let Component::Normal(part) = component {
                relative.push(part);
            }
        }

        let dest_path = pak_dest.join(&relative);
        if dest_path.exists() && !args.overwrite {
            log::debug!("skipping existing {}", dest_path.display());
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }

        if args.decode_text && is_text_member(&entry.name) {
            let plain = orlando_formats::text::decode(archive.read_entry_bytes(entry));
            fs::write(&dest_path, plain)
                .with_context(|| format!("writing {}", dest_path.display()))?;
        } else {
            archive
                .extract_entry(entry, &dest_path)
                .with_context(|| format!("extracting {}", entry.name))?;
        }
        extracted += 1;
    }

    println!(
        "Extracted {} entries from {} into {}",
        extracted,
        pak_path.display(),
        pak_dest.display()
    );
    Ok(())
}
