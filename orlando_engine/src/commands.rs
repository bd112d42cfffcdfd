use std::fs;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use orlando_engine::audio_stream::{write_wav, MemoryAudioStream};
use orlando_engine::script::load_macros;
use orlando_engine::video::AvxVideo;
use orlando_engine::{EngineConfig, RecordingHost, Runtime};
use orlando_formats::{write_png, PakArchive, Surface, TextParser};

use crate::cli::{ConfigArgs, PlayAvxArgs, RunArgs, ScheduledInput, ScriptArgs};

fn load_config(settings: &ConfigArgs) -> Result<EngineConfig> {
    let mut config =
        EngineConfig::from_json_file(settings.config.as_deref()).context("loading engine config")?;
    if let Some(root) = &settings.data_root {
        config.data_root = root.clone();
    }
    if settings.seed.is_some() {
        config.random_seed = settings.seed;
    }
    if settings.no_delay {
        config.frame_delay_ms = 0;
    }
    Ok(config)
}

/// Move everything currently buffered in `audio` onto the end of `out`.
fn drain_audio(audio: &MemoryAudioStream, out: &mut Vec<u8>) {
    let mut chunk = [0u8; 4096];
    loop {
        let ready = audio.buffered().min(chunk.len() as u64) as usize;
        if ready == 0 {
            break;
        }
        let read = audio.read(&mut chunk[..ready]);
        if read == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..read]);
    }
}

pub fn execute_run(args: RunArgs) -> Result<()> {
    let RunArgs {
        settings,
        scene,
        frames,
        inputs,
        frame_png,
        events_json,
        state_json,
    } = args;

    let config = load_config(&settings)?;
    let mut runtime = Runtime::new(config, RecordingHost::new());
    runtime.enter_scene(&scene)?;

    let mut inputs = inputs.into_iter().peekable();
    let mut ran = 0u64;
    while ran < frames {
        while let Some(input) = inputs.next_if(|input| input.frame() <= ran) {
            match input {
                ScheduledInput::Click { x, y, .. } => match runtime.click(x, y) {
                    Some(started) => info!("frame {ran}: click ({x}, {y}) started {started}"),
                    None => info!("frame {ran}: click ({x}, {y}) hit nothing"),
                },
                ScheduledInput::Answer { number, .. } => {
                    if !runtime.answer(number) {
                        warn!("frame {ran}: answer {number} was not accepted");
                    }
                }
            }
        }
        ran += 1;
        if !runtime.step()? {
            info!("scripts requested quit on frame {ran}");
            break;
        }
    }
    for input in inputs {
        warn!("input scheduled for frame {} never ran", input.frame());
    }

    let report = runtime.report();
    println!(
        "Ran {ran} frames; current scene {}",
        report.scene.as_deref().unwrap_or("<none>")
    );

    if let Some(path) = frame_png {
        runtime.save_png(&path)?;
        println!("Saved last frame to {}", path.display());
    }
    if let Some(path) = events_json {
        let json = runtime.host().to_json().context("serializing host events")?;
        fs::write(&path, json)
            .with_context(|| format!("writing event log to {}", path.display()))?;
        println!("Saved host events to {}", path.display());
    }
    if let Some(path) = state_json {
        let json = serde_json::to_string_pretty(&report).context("serializing runtime report")?;
        fs::write(&path, json)
            .with_context(|| format!("writing runtime report to {}", path.display()))?;
        println!("Saved runtime report to {}", path.display());
    }
    Ok(())
}

pub fn execute_play_avx(args: PlayAvxArgs) -> Result<()> {
    let PlayAvxArgs {
        settings,
        path,
        wav,
        png_dir,
    } = args;

    let config = load_config(&settings)?;
    let mut video = AvxVideo::open(&path, &config)
        .with_context(|| format!("opening film {}", path.display()))?;
    let header = *video.header();
    let audio = video.audio();
    let mut screen = Surface::new(config.screen_width as usize, config.screen_height as usize);

    if let Some(dir) = &png_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating frame directory {}", dir.display()))?;
    }

    let mut pcm = Vec::new();
    let mut frames = 0u64;
    while video.run(&mut screen)? {
        if let Some(dir) = &png_dir {
            write_png(&screen, dir.join(format!("frame_{frames:04}.png")))?;
        }
        frames += 1;
        drain_audio(&audio, &mut pcm);
    }
    drain_audio(&audio, &mut pcm);

    println!(
        "{}: {frames} frames, {} of {} audio bytes",
        video.name(),
        pcm.len(),
        header.pcm_size
    );
    if let Some(dir) = &png_dir {
        println!("Saved {frames} frames to {}", dir.display());
    }
    if let Some(path) = wav {
        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        write_wav(&path, &samples, header.sample_rate)?;
        println!("Saved audio to {}", path.display());
    }
    Ok(())
}

pub fn execute_script(args: ScriptArgs) -> Result<()> {
    let ScriptArgs {
        name,
        pak,
        plain,
        verbose,
    } = args;

    let bytes = match pak.as_ref() {
        Some(pak) => {
            let archive = PakArchive::open(pak)?;
            archive
                .member_bytes(&name)
                .ok_or_else(|| anyhow!("{name} not found in {}", pak.display()))?
                .to_vec()
        }
        None => fs::read(&name).with_context(|| format!("reading {name}"))?,
    };

    let mut parser = TextParser::new(&bytes, !plain);
    let macros = load_macros(&mut parser);
    println!("{name}: {} macros", macros.len());
    for script in &macros {
        println!("  {} ({} commands)", script.id(), script.len());
        if verbose {
            for command in script.commands() {
                println!(
                    "    {:>4}  {} {}",
                    command.line,
                    command.name,
                    command.args.join(" ")
                );
            }
        }
    }
    Ok(())
}
