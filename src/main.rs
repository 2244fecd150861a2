use clap::Parser;

use embedgate::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.log_json);
    cli::run(cli).await
}
