mod common;

use std::time::Duration;

use anyhow::Result;
use common::{config, SceneArchive, BACKGROUND_COLOR};
use orlando_engine::audio_stream::write_wav;
use orlando_engine::video::AvxVideo;
use orlando_engine::{EngineEvent, RecordingHost, Runtime};
use orlando_formats::flx::{DeltaFrame, FlxBuilder};
use orlando_formats::{AvxAudioCodec, AvxBuilder, Surface};

const FILM_COLOR: u16 = 0x7C00;

fn film(chunks: usize) -> Result<Vec<u8>> {
    let flx = FlxBuilder::new(2, 2)
        .palette(&[0, FILM_COLOR])
        .frame(&DeltaFrame::new(0).run(0, &[1, 1, 1, 1]))
        .build();
    let mut builder = AvxBuilder::new(AvxAudioCodec::Pcm16Le, 11025).flx(flx);
    for index in 0..chunks {
        let sample = (index as i16 + 1) * 100;
        builder = builder.chunk(sample.to_le_bytes().repeat(4));
    }
    builder.build()
}

#[test]
fn scripted_film_plays_before_the_macro_continues() -> Result<()> {
    let dir = tempfile::tempdir()?;
    SceneArchive::new("HALL")
        .text("FLM", "[INTRO]\nINTRO.AVX\n")
        .member("INTRO.AVX", film(3)?)
        .macros("[INIT]\nFILM- INTRO\nLET DONE 1\n")
        .write(dir.path());

    let mut runtime = Runtime::new(config(dir.path()), RecordingHost::new());
    runtime.enter_scene("HALL")?;
    runtime.run(1)?;
    assert_eq!(runtime.films(), ["INTRO.AVX"]);
    assert!(runtime.host().events().contains(&EngineEvent::FilmRequested {
        film: "INTRO".into(),
        resource: "INTRO.AVX".into(),
    }));

    runtime.run(3)?;
    assert_eq!(runtime.game().variables.get("DONE"), 1);
    assert_eq!(runtime.screen().pixel(0, 0), Some(BACKGROUND_COLOR));
    Ok(())
}

#[test]
fn missing_film_resource_does_not_stop_the_scene() -> Result<()> {
    let dir = tempfile::tempdir()?;
    SceneArchive::new("HALL")
        .macros("[INIT]\nFILM GONE.AVX\nLET AFTER 1\n")
        .write(dir.path());

    let mut runtime = Runtime::new(config(dir.path()), RecordingHost::new());
    runtime.enter_scene("HALL")?;
    runtime.run(3)?;
    assert!(runtime.films().is_empty());
    assert_eq!(runtime.game().variables.get("AFTER"), 1);
    Ok(())
}

#[test]
fn film_file_decodes_audio_for_a_wav_dump() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("INTRO.AVX");
    std::fs::write(&path, film(4)?)?;

    let cfg = config(dir.path());
    let mut video = AvxVideo::open(&path, &cfg)?;
    assert_eq!(video.name(), "INTRO.AVX");
    let audio = video.audio();
    let mut screen = Surface::new(4, 4);

    let mut pcm = Vec::new();
    let mut chunk = [0u8; 8];
    let mut frames = 0;
    while video.run(&mut screen)? {
        frames += 1;
        let read = audio.read(&mut chunk);
        pcm.extend_from_slice(&chunk[..read]);
    }
    assert_eq!(frames, 4);
    assert_eq!(pcm.len(), 32);
    assert!(audio.end_of_stream());
    assert_eq!(screen.pixel(1, 1), Some(FILM_COLOR));
    assert_eq!(screen.pixel(0, 0), Some(0));

    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(&samples[..5], &[100, 100, 100, 100, 200]);

    let wav = dir.path().join("intro.wav");
    write_wav(&wav, &samples, video.header().sample_rate)?;
    assert_eq!(std::fs::metadata(&wav)?.len(), 44 + 32);
    Ok(())
}

#[test]
fn frame_delay_paces_playback() -> Result<()> {
    let reader = orlando_formats::AvxReader::from_reader(std::io::Cursor::new(film(2)?))?;
    let mut video = AvxVideo::new("PACED", reader, 64, Duration::from_millis(5))?;
    let mut screen = Surface::new(2, 2);
    let started = std::time::Instant::now();
    while video.run(&mut screen)? {}
    assert!(started.elapsed() >= Duration::from_millis(10));
    assert!(video.status().end_of_stream);
    Ok(())
}
