mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use cli::Cli;
use unfrag::{flatten, FlattenOptions};

/// Summary printed by `--json`.
#[derive(Serialize)]
struct Report<'a> {
    output: &'a std::path::Path,
    bytes_written: usize,
    sample_count: usize,
    duration_secs: f64,
    discontinuity_detected: bool,
    idr_timestamps: &'a [f64],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "unfrag=trace".to_string()
        } else {
            "unfrag=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let mut buffers = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let data =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        buffers.push(data);
    }

    let options = FlattenOptions {
        normalize_across_files: !cli.no_normalize,
        allow_trun_data_offset_fallback: cli.allow_missing_data_offset,
    };
    let result = flatten(&buffers, &options)
        .with_context(|| format!("flattening {} input buffer(s)", buffers.len()))?;

    std::fs::write(&cli.output, &result.bytes)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    if cli.json {
        let report = Report {
            output: &cli.output,
            bytes_written: result.bytes.len(),
            sample_count: result.sample_count,
            duration_secs: result.duration_secs,
            discontinuity_detected: result.discontinuity_detected,
            idr_timestamps: &result.idr_timestamps,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        tracing::info!(
            "wrote {} bytes ({} samples, {:.3}s) to {}",
            result.bytes.len(),
            result.sample_count,
            result.duration_secs,
            cli.output.display()
        );
    }

    Ok(())
}
