use anyhow::Context;
use clap::Parser;

use catalog_translate_sync::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    catalog_translate_sync::init_tracing(cli.log_json);
    catalog_translate_sync::run(cli)
        .await
        .context("translation sync service failed")
}
