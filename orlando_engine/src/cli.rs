use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Headless host for scripted scenes and AVX films",
    version
)]
pub struct Args {
    /// Optional JSON engine configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the scene archives (overrides the config file)
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Load this scene and run its scripts headlessly
    #[arg(long, value_name = "NAME")]
    pub scene: Option<String>,

    /// Number of frames to run (with --scene)
    #[arg(long, default_value_t = 100)]
    pub frames: u64,

    /// Seed for RANDOM so runs are reproducible
    #[arg(long)]
    pub seed: Option<u64>,

    /// Click at a screen point on a given frame, as FRAME:X:Y (repeatable)
    #[arg(long, value_name = "FRAME:X:Y")]
    pub click: Vec<String>,

    /// Answer the open dialog on a given frame, as FRAME:N (repeatable)
    #[arg(long, value_name = "FRAME:N")]
    pub answer: Vec<String>,

    /// Path to write the last rendered frame as PNG
    #[arg(long)]
    pub frame_png: Option<PathBuf>,

    /// Path to write the host event log as JSON
    #[arg(long)]
    pub events_json: Option<PathBuf>,

    /// Path to write game state and macro status as JSON
    #[arg(long)]
    pub state_json: Option<PathBuf>,

    /// Play an AVX film file instead of running a scene
    #[arg(long, value_name = "PATH")]
    pub play_avx: Option<PathBuf>,

    /// Path to write the film's decoded audio as WAV (with --play-avx)
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Directory receiving one PNG per film frame (with --play-avx)
    #[arg(long)]
    pub png_dir: Option<PathBuf>,

    /// Skip the pause between film frames
    #[arg(long)]
    pub no_delay: bool,

    /// Decode a macro file and list its macros; a member name when --pak is given
    #[arg(long, value_name = "NAME")]
    pub script: Option<String>,

    /// Read the --script resource out of this PAK archive
    #[arg(long, value_name = "PATH")]
    pub pak: Option<PathBuf>,

    /// The --script resource is plain text rather than obfuscated
    #[arg(long)]
    pub plain: bool,
}

#[derive(Debug)]
pub enum Command {
    Run(RunArgs),
    PlayAvx(PlayAvxArgs),
    Script(ScriptArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Run(args) => args.settings.verbose,
            Command::PlayAvx(args) => args.settings.verbose,
            Command::Script(args) => args.verbose,
        }
    }
}

/// Options shared by the commands that need an [`EngineConfig`](orlando_engine::EngineConfig).
#[derive(Debug)]
pub struct ConfigArgs {
    pub config: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
    pub seed: Option<u64>,
    pub no_delay: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledInput {
    Click { frame: u64, x: i32, y: i32 },
    Answer { frame: u64, number: i32 },
}

impl ScheduledInput {
    pub fn frame(&self) -> u64 {
        match self {
            ScheduledInput::Click { frame, .. } | ScheduledInput::Answer { frame, .. } => *frame,
        }
    }
}

#[derive(Debug)]
pub struct RunArgs {
    pub settings: ConfigArgs,
    pub scene: String,
    pub frames: u64,
    pub inputs: Vec<ScheduledInput>,
    pub frame_png: Option<PathBuf>,
    pub events_json: Option<PathBuf>,
    pub state_json: Option<PathBuf>,
}

#[derive(Debug)]
pub struct PlayAvxArgs {
    pub settings: ConfigArgs,
    pub path: PathBuf,
    pub wav: Option<PathBuf>,
    pub png_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ScriptArgs {
    pub name: String,
    pub pak: Option<PathBuf>,
    pub plain: bool,
    pub verbose: bool,
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    args.into_command()
}

fn fields<'a>(spec: &'a str, flag: &str, count: usize) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != count {
        bail!("--{flag} expects {count} colon-separated numbers, got {spec:?}");
    }
    Ok(parts)
}

fn parse_click(spec: &str) -> Result<ScheduledInput> {
    let parts = fields(spec, "click", 3)?;
    Ok(ScheduledInput::Click {
        frame: parts[0].parse().with_context(|| format!("--click frame in {spec:?}"))?,
        x: parts[1].parse().with_context(|| format!("--click x in {spec:?}"))?,
        y: parts[2].parse().with_context(|| format!("--click y in {spec:?}"))?,
    })
}

fn parse_answer(spec: &str) -> Result<ScheduledInput> {
    let parts = fields(spec, "answer", 2)?;
    Ok(ScheduledInput::Answer {
        frame: parts[0].parse().with_context(|| format!("--answer frame in {spec:?}"))?,
        number: parts[1].parse().with_context(|| format!("--answer number in {spec:?}"))?,
    })
}

impl Args {
    fn into_command(self) -> Result<Command> {
        let modes = [
            self.scene.is_some(),
            self.play_avx.is_some(),
            self.script.is_some(),
        ];
        match modes.iter().filter(|&&set| set).count() {
            0 => bail!("pass one of --scene, --play-avx or --script"),
            1 => {}
            _ => bail!("--scene, --play-avx and --script are mutually exclusive"),
        }
        if self.play_avx.is_none() && (self.wav.is_some() || self.png_dir.is_some()) {
            bail!("--wav and --png-dir require --play-avx");
        }
        if self.scene.is_none()
            && (!self.click.is_empty()
                || !self.answer.is_empty()
                || self.frame_png.is_some()
                || self.events_json.is_some()
                || self.state_json.is_some())
        {
            bail!("--click, --answer and the JSON/PNG outputs require --scene");
        }
        if self.script.is_none() && (self.pak.is_some() || self.plain) {
            bail!("--pak and --plain require --script");
        }

        if let Some(name) = self.script {
            return Ok(Command::Script(ScriptArgs {
                name,
                pak: self.pak,
                plain: self.plain,
                verbose: self.verbose,
            }));
        }

        let settings = ConfigArgs {
            config: self.config,
            data_root: self.data_root,
            seed: self.seed,
            no_delay: self.no_delay,
            verbose: self.verbose,
        };

        if let Some(path) = self.play_avx {
            return Ok(Command::PlayAvx(PlayAvxArgs {
                settings,
                path,
                wav: self.wav,
                png_dir: self.png_dir,
            }));
        }

        let scene = self
            .scene
            .ok_or_else(|| anyhow!("--scene is required"))?;
        let mut inputs = self
            .click
            .iter()
            .map(|spec| parse_click(spec))
            .chain(self.answer.iter().map(|spec| parse_answer(spec)))
            .collect::<Result<Vec<_>>>()?;
        inputs.sort_by_key(ScheduledInput::frame);

        Ok(Command::Run(RunArgs {
            settings,
            scene,
            frames: self.frames,
            inputs,
            frame_png: self.frame_png,
            events_json: self.events_json,
            state_json: self.state_json,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(argv: &[&str]) -> Result<Command> {
        let mut full = vec!["orlando_engine"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full)?.into_command()
    }

    #[test]
    fn scene_run_collects_inputs_in_frame_order() {
        let Command::Run(args) = command(&[
            "--scene",
            "HALL",
            "--frames",
            "20",
            "--answer",
            "9:2",
            "--click",
            "3:100:40",
        ])
        .unwrap() else {
            panic!("expected a run command");
        };
        assert_eq!(args.scene, "HALL");
        assert_eq!(args.frames, 20);
        assert_eq!(
            args.inputs,
            vec![
                ScheduledInput::Click { frame: 3, x: 100, y: 40 },
                ScheduledInput::Answer { frame: 9, number: 2 },
            ]
        );
    }

    #[test]
    fn exactly_one_mode_is_required() {
        assert!(command(&[]).is_err());
        assert!(command(&["--scene", "HALL", "--play-avx", "intro.avx"]).is_err());
    }

    #[test]
    fn mode_specific_flags_are_checked() {
        assert!(command(&["--scene", "HALL", "--wav", "out.wav"]).is_err());
        assert!(command(&["--play-avx", "intro.avx", "--click", "1:2:3"]).is_err());
        assert!(command(&["--scene", "HALL", "--plain"]).is_err());
        assert!(command(&["--scene", "HALL", "--click", "1:2"]).is_err());
    }

    #[test]
    fn script_mode_keeps_its_source() {
        let Command::Script(args) =
            command(&["--script", "HALL.MCC", "--pak", "HALL.PAK", "--verbose"]).unwrap()
        else {
            panic!("expected a script command");
        };
        assert_eq!(args.name, "HALL.MCC");
        assert_eq!(args.pak, Some(PathBuf::from("HALL.PAK")));
        assert!(!args.plain);
        assert!(args.verbose);
    }
}
