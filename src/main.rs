mod aggregator;
mod config;
mod detector;
mod error;
mod export;
mod loader;
mod pipeline;
mod stats;
mod types;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;

fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(&cfg) {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn run(cfg: &Config) -> Result<()> {
    info!(
        input = %cfg.input_path.display(),
        window_min = cfg.window_min,
        window_max = cfg.window_max,
        chosen_window = ?cfg.chosen_window,
        multiplier = cfg.outlier_multiplier,
        dispersion = %cfg.dispersion,
        click_policy = %cfg.click_policy,
        output_mode = %cfg.output_mode,
        "Starting CTR outlier scan"
    );

    let report = pipeline::run(cfg)?;

    info!(
        event = "SCAN_COMPLETE",
        hours = report.hours,
        window = report.window,
        outliers = report.outlier_count,
        "SCAN COMPLETE | hours: {} | SMA{} ({}) | threshold: {:.4} | outliers: {} | no_outliers: {}",
        report.hours,
        report.window,
        report.window_choice,
        report.threshold,
        report.outlier_count,
        report.points.iter().filter(|p| p.ctr.is_some() && !p.outlier).count(),
    );
    for score in &report.scores {
        let sad = score
            .sad
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        let marker = if score.window == report.window { " ← chosen" } else { "" };
        info!("[WINDOW]   SMA{:<2} SAD {sad}{marker}", score.window);
    }
    Ok(())
}
