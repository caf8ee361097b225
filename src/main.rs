use std::process::ExitCode;

use clap::Parser;
use pg2parquet::cmd::{bootstrap, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    bootstrap(&cli)?;

    let response = run(cli).await?;
    println!("{}", serde_json::to_string(&response)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
