use anyhow::Context;
use lb_runner::{config_path, execute, RunnerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = |key: &str| std::env::var(key).ok();
    let path = config_path(std::env::args().skip(1), env);
    let config = RunnerConfig::load(path.as_deref(), env).with_context(|| match &path {
        Some(p) => format!("loading config from {}", p.display()),
        None => "building default config".to_string(),
    })?;
    let source = path
        .as_ref()
        .map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string());
    info!(config = %source, "lb-run starting");

    let report = execute(&config).context("optimization run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
