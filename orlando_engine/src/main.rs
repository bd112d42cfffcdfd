use anyhow::Result;

mod cli;
mod commands;

use cli::Command;

fn main() -> Result<()> {
    let command = cli::parse()?;
    let default_level = if command.verbose() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match command {
        Command::Run(args) => commands::execute_run(args),
        Command::PlayAvx(args) => commands::execute_play_avx(args),
        Command::Script(args) => commands::execute_script(args),
    }
}
