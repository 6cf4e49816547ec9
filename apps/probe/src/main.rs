mod config;
mod main_lib;

use config::Config;
use main_lib::{build_service, init_tracing, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env(std::env::args().skip(1).collect())?;
    init_tracing();

    if config.symbols.is_empty() {
        anyhow::bail!("No symbols given. Pass them as arguments or set QF_SYMBOLS.");
    }

    let service = build_service(&config)?;
    tracing::info!(
        "Probing {} symbols for {:?}",
        config.symbols.len(),
        config.kinds
    );
    let report = run(&service, &config).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
