mod cli;
mod exit_codes;
mod export_scenario;
mod logging;
mod output;
mod run;
mod run_error;
mod run_support;
mod scenario_file;

use clap::Parser;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    let log_level = match &cli.command {
        cli::Command::Run(args) => args.log_level.as_deref(),
        cli::Command::ExportScenario(_) => None,
    };
    if let Err(err) = logging::init(log_level) {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::ExitCode::InvalidInput.as_i32());
    }

    let res = match cli.command {
        cli::Command::Run(args) => run::run(args).await,
        cli::Command::ExportScenario(args) => export_scenario::export_scenario(args).await,
    };

    let code = match res {
        Ok(code) => code.as_i32(),
        Err(err) => {
            eprintln!("{err}");
            err.exit_code().as_i32()
        }
    };

    std::process::exit(code);
}
