use clap::Parser;
use tally_cli::tracing_setup::{TracingConfig, init_tracing};
use tally_cli::{Cli, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&TracingConfig { level: cli.log_level.clone(), json: cli.log_json })?;

    let output = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
