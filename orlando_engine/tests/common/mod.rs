#![allow(dead_code)]

use std::path::Path;

use orlando_engine::EngineConfig;
use orlando_formats::bitmap::encode_raw;
use orlando_formats::{PakLayout, PakWriter, Surface, text};

pub const SCREEN_WIDTH: usize = 8;
pub const SCREEN_HEIGHT: usize = 4;
pub const BACKGROUND_COLOR: u16 = 0x0010;

pub fn config(root: &Path) -> EngineConfig {
    EngineConfig {
        data_root: root.to_path_buf(),
        screen_width: SCREEN_WIDTH as u32,
        screen_height: SCREEN_HEIGHT as u32,
        frame_delay_ms: 0,
        random_seed: Some(7),
        ..EngineConfig::default()
    }
}

pub fn solid_raw(width: usize, height: usize, color: u16) -> Vec<u8> {
    let surface = Surface::from_pixels(width, height, vec![color; width * height])
        .expect("solid surface");
    encode_raw(&surface)
}

/// Builds `NAME.PAK` with a background, a macro file and any extra members.
pub struct SceneArchive {
    name: String,
    writer: PakWriter,
    ccg: Option<String>,
    mcc: Option<String>,
}

impl SceneArchive {
    pub fn new(name: &str) -> Self {
        let mut writer = PakWriter::new(PakLayout::Windows);
        writer.add(
            "BG.RAW",
            solid_raw(SCREEN_WIDTH, SCREEN_HEIGHT, BACKGROUND_COLOR),
        );
        Self {
            name: name.to_string(),
            writer,
            ccg: Some("[BACKGROUND]\nBG.RAW\n".to_string()),
            mcc: Some(String::new()),
        }
    }

    pub fn graphics(mut self, source: &str) -> Self {
        self.ccg = Some(source.to_string());
        self
    }

    pub fn without_graphics(mut self) -> Self {
        self.ccg = None;
        self
    }

    pub fn macros(mut self, source: &str) -> Self {
        self.mcc = Some(source.to_string());
        self
    }

    pub fn without_macros(mut self) -> Self {
        self.mcc = None;
        self
    }

    /// Add `NAME.EXT` as an obfuscated text resource.
    pub fn text(mut self, extension: &str, source: &str) -> Self {
        let member = format!("{}.{extension}", self.name);
        self.writer.add(member, text::encode(source.as_bytes()));
        self
    }

    pub fn member(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.writer.add(name, bytes);
        self
    }

    pub fn write(mut self, root: &Path) {
        if let Some(ccg) = self.ccg.take() {
            let member = format!("{}.CCG", self.name);
            self.writer.add(member, text::encode(ccg.as_bytes()));
        }
        if let Some(mcc) = self.mcc.take() {
            let member = format!("{}.MCC", self.name);
            self.writer.add(member, text::encode(mcc.as_bytes()));
        }
        self.writer
            .write_to(root.join(format!("{}.PAK", self.name)))
            .expect("write scene archive");
    }
}
