use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = safaribooks::cli::Cli::parse();
    let config = safaribooks::config::Config::from_cli(cli).context("resolve config")?;

    let log_path = config.log_path();
    safaribooks::logging::init(Some(log_path.as_path())).context("init logging")?;
    tracing::debug!(?config, "parsed cli");

    let result = safaribooks::download::run(&config).await;
    if let Err(err) = &result {
        tracing::error!("{err:#}");
    }
    let epub_path = result?;

    if !config.preserve_log {
        std::fs::remove_file(&log_path)
            .with_context(|| format!("remove run log: {}", log_path.display()))?;
    }
    println!("{}", epub_path.display());
    Ok(())
}
