use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use orlando_formats::bitmap::decode_bitmap;
use orlando_formats::{FlxAnimation, PakArchive, Surface, TextParser};

use crate::config::EngineConfig;
use crate::scene::entities::Graphic;
use crate::scene::SceneLoadError;

/// Ordered set of archives plus a loose-file directory, searched first to last.
#[derive(Debug)]
pub struct ResourceManager {
    data_root: PathBuf,
    archives: Vec<PakArchive>,
    obfuscated_text: bool,
}

fn has_extension(name: &str, wanted: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

impl ResourceManager {
    pub fn new(data_root: impl Into<PathBuf>, archives: Vec<PakArchive>, obfuscated_text: bool) -> Self {
        Self {
            data_root: data_root.into(),
            archives,
            obfuscated_text,
        }
    }

    /// Open `NAME.PAK` (required), `NAMEX.PAK` and the shared archives.
    pub fn for_scene(config: &EngineConfig, scene: &str) -> Result<Self> {
        let primary = format!("{scene}.PAK");
        let primary_path = find_file(&config.data_root, &primary)
            .ok_or_else(|| SceneLoadError::MissingArchive(primary.clone()))?;
        let mut archives = vec![PakArchive::open(&primary_path)?];

        let extra = format!("{scene}X.PAK");
        match find_file(&config.data_root, &extra) {
            Some(path) => archives.push(PakArchive::open(&path)?),
            None => debug!("scene {scene} has no extra archive {extra}"),
        }

        for shared in &config.shared_archives {
            match find_file(&config.data_root, shared) {
                Some(path) => archives.push(PakArchive::open(&path)?),
                None => warn!("shared archive {shared} not found in {}", config.data_root.display()),
            }
        }

        Ok(Self::new(
            config.data_root.clone(),
            archives,
            config.obfuscated_text,
        ))
    }

    pub fn archives(&self) -> &[PakArchive] {
        &self.archives
    }

    pub fn obfuscated_text(&self) -> bool {
        self.obfuscated_text
    }

    pub fn exists(&self, name: &str) -> bool {
        self.archives.iter().any(|archive| archive.has_member(name))
            || find_file(&self.data_root, name).is_some()
    }

    /// Bytes of `name`, borrowed from an archive when possible.
    pub fn read(&self, name: &str) -> Option<Cow<'_, [u8]>> {
        for archive in &self.archives {
            if let Some(bytes) = archive.member_bytes(name) {
                return Some(Cow::Borrowed(bytes));
            }
        }
        let path = find_file(&self.data_root, name)?;
        match fs::read(&path) {
            Ok(bytes) => Some(Cow::Owned(bytes)),
            Err(err) => {
                warn!("failed to read {}: {err}", path.display());
                None
            }
        }
    }

    pub fn read_required(&self, name: &str) -> Result<Cow<'_, [u8]>> {
        self.read(name)
            .ok_or_else(|| SceneLoadError::MissingResource(name.to_string()).into())
    }

    /// Tokenizer over a text resource, honouring the configured transform.
    pub fn text_parser(&self, name: &str) -> Option<TextParser> {
        let bytes = self.read(name)?;
        Some(TextParser::new(&bytes, self.obfuscated_text))
    }

    pub fn load_flx(&self, name: &str) -> Result<FlxAnimation> {
        let bytes = self.read_required(name)?;
        FlxAnimation::open(bytes.into_owned()).with_context(|| format!("opening FLX {name}"))
    }

    pub fn load_surface(&self, name: &str) -> Result<Surface> {
        if has_extension(name, "flx") {
            let mut flx = self.load_flx(name)?;
            flx.next_frame()
                .with_context(|| format!("decoding first frame of {name}"))?;
            return Ok(flx.surface().clone());
        }
        let bytes = self.read_required(name)?;
        decode_bitmap(name, &bytes)
    }

    /// A still or animated graphic; animations are advanced to their first frame.
    pub fn load_graphic(&self, name: &str) -> Result<Graphic> {
        if has_extension(name, "flx") {
            let mut flx = self.load_flx(name)?;
            flx.next_frame()
                .with_context(|| format!("decoding first frame of {name}"))?;
            Ok(Graphic::Animated(Box::new(flx)))
        } else {
            Ok(Graphic::Still(self.load_surface(name)?))
        }
    }
}

/// Case-insensitive lookup of `name` directly inside `dir`.
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let direct = dir.join(name);
    if direct.is_file() {
        return Some(direct);
    }
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|file| file.to_str())
                    .is_some_and(|file| file.eq_ignore_ascii_case(name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orlando_formats::bitmap::encode_raw;
    use orlando_formats::{PakLayout, PakWriter};

    #[test]
    fn archives_shadow_loose_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("note.txt"), b"loose")?;
        fs::write(dir.path().join("ONLY.TXT"), b"disk")?;

        let mut writer = PakWriter::new(PakLayout::Windows);
        writer.add("NOTE.TXT", b"packed".to_vec());
        let archive = PakArchive::from_bytes(writer.to_bytes()?)?;
        let resources = ResourceManager::new(dir.path(), vec![archive], false);

        assert_eq!(resources.read("note.txt").as_deref(), Some(&b"packed"[..]));
        assert_eq!(resources.read("only.txt").as_deref(), Some(&b"disk"[..]));
        assert!(resources.read("missing.txt").is_none());
        assert!(resources.exists("ONLY.TXT"));
        Ok(())
    }

    #[test]
    fn scene_archives_are_located_case_insensitively() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = PakWriter::new(PakLayout::Dos);
        writer.add("A.RAW", encode_raw(&Surface::new(2, 2)));
        writer.write_to(dir.path().join("hall.pak"))?;

        let config = EngineConfig {
            data_root: dir.path().to_path_buf(),
            shared_archives: vec!["COMMON.PAK".into()],
            ..EngineConfig::default()
        };
        let resources = ResourceManager::for_scene(&config, "HALL")?;
        assert_eq!(resources.archives().len(), 1);
        assert_eq!(resources.load_surface("a.raw")?.width(), 2);

        let err = ResourceManager::for_scene(&config, "ROOF").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SceneLoadError>(),
            Some(SceneLoadError::MissingArchive(name)) if name == "ROOF.PAK"
        ));
        Ok(())
    }
}
