use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Replace a literal token in every JSON file of a directory.
#[derive(Parser)]
#[command(name = "fixture-rewrite", version)]
struct Cli {
    /// Token to replace
    #[arg(long)]
    from: String,
    /// Replacement
    #[arg(long)]
    to: String,
    /// Directory holding the fixtures (not searched recursively)
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match fixture_rewrite::rewrite_dir(&cli.dir, &cli.from, &cli.to, cli.dry_run) {
        Ok(report) => {
            let verb = if cli.dry_run { "would change" } else { "changed" };
            println!(
                "scanned {} files, {verb} {} ({} replacements)",
                report.scanned,
                report.changed.len(),
                report.replacements()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
