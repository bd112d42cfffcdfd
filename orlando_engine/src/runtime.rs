use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use orlando_formats::{write_png, AvxReader, Surface};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::game::{GameSnapshot, GameState};
use crate::host::HostCallback;
use crate::interpreter::MacroStatus;
use crate::scene::Scene;
use crate::video::AvxVideo;

const AUDIO_DRAIN_CHUNK: usize = 4096;

/// Summary written after a headless run.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub scene: Option<String>,
    pub scene_frame: u64,
    pub frames: u64,
    pub films: Vec<String>,
    pub game: GameSnapshot,
    pub macros: Vec<MacroStatus>,
}

pub struct Runtime<H> {
    config: EngineConfig,
    game: GameState,
    host: H,
    scene: Option<Scene>,
    screen: Surface,
    frames: u64,
    films: Vec<String>,
}

impl<H: HostCallback> Runtime<H> {
    pub fn new(config: EngineConfig, host: H) -> Self {
        let game = GameState::new(config.random_seed);
        let screen = Surface::new(config.screen_width as usize, config.screen_height as usize);
        Self {
            config,
            game,
            host,
            scene: None,
            screen,
            frames: 0,
            films: Vec::new(),
        }
    }

    /// Load `name` and make it current. On failure the previous scene stays.
    pub fn enter_scene(&mut self, name: &str) -> Result<()> {
        let scene = Scene::initialize(name, &self.config, &mut self.game, &self.host)
            .with_context(|| format!("loading scene {name}"))?;
        scene.render(&mut self.screen);
        self.scene = Some(scene);
        Ok(())
    }

    /// Run one frame, then play a requested film and follow a requested
    /// scene change. Returns `false` once the scripts asked to quit.
    pub fn step(&mut self) -> Result<bool> {
        let Some(scene) = self.scene.as_mut() else {
            bail!("no scene loaded");
        };
        scene.run(&mut self.game, &self.host);
        scene.render(&mut self.screen);
        self.frames += 1;

        if let Some(film) = self.game.take_pending_film() {
            if let Err(err) = self.play_film(&film) {
                warn!("film {film} failed: {err:#}");
            }
        }

        if let Some(next) = self.game.take_pending_scene() {
            info!("frame {}: switching to scene {next}", self.frames);
            if let Err(err) = self.enter_scene(&next) {
                warn!("{err:#}; staying in the current scene");
            }
        }

        Ok(!self.game.quit_requested)
    }

    /// Run up to `frames` frames, stopping early on quit. Returns the number run.
    pub fn run(&mut self, frames: u64) -> Result<u64> {
        for done in 0..frames {
            if !self.step()? {
                debug!("quit requested after {} frames", done + 1);
                return Ok(done + 1);
            }
        }
        Ok(frames)
    }

    fn play_film(&mut self, resource: &str) -> Result<()> {
        let bytes = self
            .scene
            .as_ref()
            .and_then(|scene| scene.resources().read(resource))
            .map(|bytes| bytes.into_owned());
        let Some(bytes) = bytes else {
            warn!("film resource {resource} not found");
            return Ok(());
        };

        let reader = AvxReader::from_reader(Cursor::new(bytes))
            .with_context(|| format!("opening film {resource}"))?;
        let mut video = AvxVideo::new(
            resource,
            reader,
            self.config.audio_buffer_bytes,
            self.config.frame_delay(),
        )?;
        let audio = video.audio();
        let mut sink = vec![0u8; AUDIO_DRAIN_CHUNK];
        let mut shown = 0u64;
        while video.run(&mut self.screen)? {
            shown += 1;
            loop {
                let ready = audio.buffered().min(sink.len() as u64) as usize;
                if ready == 0 || audio.read(&mut sink[..ready]) == 0 {
                    break;
                }
            }
        }
        info!("film {resource}: {shown} frames");
        self.films.push(resource.to_string());
        Ok(())
    }

    pub fn click(&mut self, x: i32, y: i32) -> Option<String> {
        self.scene.as_mut()?.click(x, y, &self.game)
    }

    pub fn answer(&mut self, number: i32) -> bool {
        match self.scene.as_mut() {
            Some(scene) => scene.answer(number, &mut self.game, &self.host),
            None => false,
        }
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn screen(&self) -> &Surface {
        &self.screen
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Films played to completion, in order.
    pub fn films(&self) -> &[String] {
        &self.films
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        write_png(&self.screen, path)
    }

    pub fn report(&self) -> RuntimeReport {
        RuntimeReport {
            scene: self.scene.as_ref().map(|scene| scene.name().to_string()),
            scene_frame: self.scene.as_ref().map_or(0, Scene::frame),
            frames: self.frames,
            films: self.films.clone(),
            game: self.game.snapshot(),
            macros: self
                .scene
                .as_ref()
                .map(|scene| scene.interpreter().status())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    fn config(root: &Path) -> EngineConfig {
        EngineConfig {
            data_root: root.to_path_buf(),
            screen_width: 8,
            screen_height: 4,
            frame_delay_ms: 0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn stepping_without_a_scene_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = Runtime::new(config(dir.path()), NullHost);
        assert!(runtime.step().is_err());
        assert_eq!(runtime.frames(), 0);
    }

    #[test]
    fn a_missing_archive_leaves_no_scene() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = Runtime::new(config(dir.path()), NullHost);
        let err = runtime.enter_scene("NOWHERE").unwrap_err();
        assert!(format!("{err:#}").contains("NOWHERE.PAK"));
        assert!(runtime.scene().is_none());
        assert!(runtime.game().current_scene.is_none());
    }

    #[test]
    fn report_without_a_scene_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(config(dir.path()), NullHost);
        let report = runtime.report();
        assert!(report.scene.is_none());
        assert!(report.macros.is_empty());
        assert_eq!(runtime.screen().width(), 8);
    }
}
