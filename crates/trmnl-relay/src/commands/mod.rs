//! Command dispatch.

pub mod config_cmd;
pub mod device;
pub mod send;

use clap::CommandFactory;

use crate::cli::{Cli, Command, CompletionsArgs, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::SendImage(args) => send::image(args, global).await,
        Command::SendVariables(args) => send::variables(args, global).await,
        Command::Batch(args) => send::batch(args, global).await,
        Command::Register => device::register(global).await,
        Command::Status => device::status(global).await,
        Command::Devices(args) => device::devices(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            completions(&args);
            Ok(())
        }
    }
}

fn completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "trmnl-relay", &mut std::io::stdout());
}
