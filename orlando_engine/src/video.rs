use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use orlando_formats::{AvxAudioDecoder, AvxHeader, AvxReader, BlitOptions, FlxAnimation, Surface};
use serde::Serialize;

use crate::audio_stream::MemoryAudioStream;
use crate::config::EngineConfig;

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub backend: &'static str,
    pub current_frame: Option<u64>,
    pub flx_stream: usize,
    pub end_of_stream: bool,
}

/// Plays an AVX film one host frame at a time, feeding decoded audio into a
/// [`MemoryAudioStream`] and pacing itself with a fixed delay.
pub struct AvxVideo<R> {
    name: String,
    reader: AvxReader<R>,
    decoder: AvxAudioDecoder,
    audio: MemoryAudioStream,
    animation: Option<FlxAnimation>,
    stream_index: usize,
    frame_delay: Duration,
    frames_shown: u64,
    finished: bool,
}

impl<R> std::fmt::Debug for AvxVideo<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvxVideo")
            .field("name", &self.name)
            .field("stream_index", &self.stream_index)
            .field("frames_shown", &self.frames_shown)
            .field("finished", &self.finished)
            .finish()
    }
}

impl AvxVideo<BufReader<File>> {
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self> {
        let reader = AvxReader::open(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, reader, config.audio_buffer_bytes, config.frame_delay())
    }
}

impl<R: Read> AvxVideo<R> {
    pub fn new(
        name: impl Into<String>,
        reader: AvxReader<R>,
        audio_capacity: usize,
        frame_delay: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let header = *reader.header();
        let decoder = AvxAudioDecoder::new(header.codec);
        let audio = MemoryAudioStream::new(audio_capacity, u64::from(header.pcm_size));
        let mut video = Self {
            name,
            reader,
            decoder,
            audio,
            animation: None,
            stream_index: 0,
            frame_delay,
            frames_shown: 0,
            finished: false,
        };
        video.open_stream(0)?;
        info!(
            "{}: {:?} audio at {} Hz, {} FLX stream(s)",
            video.name,
            header.codec,
            header.sample_rate,
            video.reader.flx_streams().len()
        );
        Ok(video)
    }

    fn open_stream(&mut self, index: usize) -> Result<()> {
        let Some(bytes) = self.reader.flx_streams().get(index) else {
            return Ok(());
        };
        let mut flx = FlxAnimation::open(bytes.clone())
            .with_context(|| format!("{}: opening FLX stream {index}", self.name))?;
        flx.next_frame()
            .with_context(|| format!("{}: first frame of FLX stream {index}", self.name))?;
        debug!("{}: switched to FLX stream {index}", self.name);
        self.animation = Some(flx);
        self.stream_index = index;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &AvxHeader {
        self.reader.header()
    }

    /// Consumer handle for the decoded PCM.
    pub fn audio(&self) -> MemoryAudioStream {
        self.audio.clone()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.animation.as_ref().map(FlxAnimation::surface)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            backend: "avx",
            current_frame: self.animation.as_ref().map(|_| self.frames_shown),
            flx_stream: self.stream_index,
            end_of_stream: self.finished,
        }
    }

    /// One host frame: draw the current picture centred in `target`, then
    /// consume the next chunk. Returns `false` once the source is exhausted.
    pub fn run(&mut self, target: &mut Surface) -> Result<bool> {
        if let Some(surface) = self.surface() {
            let x = (target.width() as i32 - surface.width() as i32) / 2;
            let y = (target.height() as i32 - surface.height() as i32) / 2;
            target.blit(surface, surface.bounds(), x, y, BlitOptions::OPAQUE);
        }
        if self.finished {
            return Ok(false);
        }

        let Some(payload) = self.reader.next_audio_chunk()? else {
            debug!("{}: end of stream after {} frames", self.name, self.frames_shown);
            self.finished = true;
            return Ok(false);
        };
        let pcm = self
            .decoder
            .decode_bytes(&payload)
            .with_context(|| format!("{}: decoding audio chunk", self.name))?;
        self.audio.write(&pcm);

        self.advance_video()?;
        self.frames_shown += 1;

        if !self.frame_delay.is_zero() {
            thread::sleep(self.frame_delay);
        }
        Ok(true)
    }

    fn advance_video(&mut self) -> Result<()> {
        let Some(flx) = self.animation.as_mut() else {
            return Ok(());
        };
        let exhausted = flx.frames_per_pass() > 0 && flx.frames_read() >= flx.frames_per_pass();
        if exhausted && self.stream_index + 1 < self.reader.flx_streams().len() {
            return self.open_stream(self.stream_index + 1);
        }
        flx.next_frame()
            .with_context(|| format!("{}: FLX stream {}", self.name, self.stream_index))?;
        Ok(())
    }
}
