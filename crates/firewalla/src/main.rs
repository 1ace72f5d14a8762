mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use firewalla_core::validate_rule_id;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need the MSP
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "firewalla", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            // Reject malformed ids before touching config or the network
            if let Command::Pause(args) | Command::Resume(args) = &cmd {
                validate_rule_id(&args.rule_id)?;
            }

            let (profile, sync) = config::resolve(&cli.global)?;
            tracing::debug!(
                command = ?cmd,
                profile = %profile,
                url = %sync.url,
                "dispatching command"
            );
            commands::dispatch(cmd, &profile, &sync, &cli.global).await
        }
    }
}
