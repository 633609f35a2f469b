use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nanochat_parity::{
    AppConfig, Harness,
    harness::{default_prompts, load_prompts_from_path, run_comparison},
    report::{Reporter, write_json_report},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tokio::select! {
        result = run() => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ninterrupted by user");
            // run() is dropped by now, so a pending child process has been killed.
            // Blocking inference cannot be cancelled; exit without waiting for it.
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        checkpoint = %config.checkpoint_path.display(),
        remote = %config.remote_program,
        timeout = ?config.remote_timeout,
        "starting comparison"
    );

    let prompts = match config.prompts_path.as_ref() {
        Some(path) => load_prompts_from_path(path)?,
        None => default_prompts(),
    };

    let harness = Harness::from_config(&config);
    let (a_label, b_label) = harness.labels();
    let mut reporter = Reporter::new(io::stdout().lock(), a_label, b_label);

    let report = run_comparison(&harness, &prompts, &mut reporter).await?;

    if let Some(path) = config.report_path.as_ref() {
        write_json_report(path, &report)?;
        tracing::info!(path = %path.display(), "wrote JSON report");
    }

    Ok(())
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
