use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use console::style;
use pagewright::{Config, PagewrightError, Pipeline};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pagewright", version, about = "Front-end asset build pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Remove the distribution and temp directories
    Clean,
    /// Lint style and script sources
    Lint,
    /// Compile styles, scripts and pages into the temp area
    Compile,
    /// Compile styles and scripts only
    Link,
    /// Produce the production output in dist
    Build,
    /// Serve the project with live reload
    Serve,
    /// Build, then serve
    Start,
    /// Push dist to the configured static host
    Upload,
    /// Compile, then upload
    Deploy,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), PagewrightError> {
    let cli = Cli::parse();
    let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)?;
    let pipeline = Pipeline::new(Arc::new(Config::resolve(&cwd)));

    match cli.command {
        Command::Clean => pagewright::run(&pipeline.clean())?,
        Command::Lint => pagewright::run(&pipeline.lint())?,
        Command::Compile => pagewright::run(&pipeline.compile())?,
        Command::Link => pagewright::run(&pipeline.link())?,
        Command::Build => pagewright::run(&pipeline.build())?,
        Command::Serve => pipeline.serve()?.wait(),
        Command::Start => {
            pagewright::run(&pipeline.build())?;
            pipeline.serve()?.wait();
        }
        Command::Upload => pagewright::run(&pipeline.upload())?,
        Command::Deploy => pagewright::run(&pipeline.deploy())?,
    }

    Ok(())
}
