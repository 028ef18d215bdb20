mod cmd;
mod config;
mod error;

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "sbx", version, about = "Work with remote sandboxes")]
struct Cli {
    #[command(flatten)]
    global: config::GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a sandbox, watch a directory and exercise the filesystem and
    /// process APIs
    Playground(cmd::PlaygroundArgs),
    /// Run a command in a fresh sandbox and exit with its exit code
    Exec(cmd::ExecArgs),
    /// List a directory
    Ls(cmd::PathArgs),
    /// Print a file
    Cat(cmd::PathArgs),
    /// Copy a local file into a sandbox
    Put(cmd::PutArgs),
    /// Copy a file out of a sandbox
    Get(cmd::GetArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Command::Playground(args) => cmd::run_playground(global, args)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Exec(args) => cmd::run_exec(global, args).await,
        Command::Ls(args) => cmd::run_ls(global, args).await.map(|()| ExitCode::SUCCESS),
        Command::Cat(args) => cmd::run_cat(global, args).await.map(|()| ExitCode::SUCCESS),
        Command::Put(args) => cmd::run_put(global, args).await.map(|()| ExitCode::SUCCESS),
        Command::Get(args) => cmd::run_get(global, args).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sbx",
            "ls",
            "/home",
            "--api-key",
            "e2b_flag",
            "--template",
            "python",
        ])
        .unwrap();
        assert_eq!(cli.global.api_key.as_deref(), Some("e2b_flag"));
        assert_eq!(cli.global.template.as_deref(), Some("python"));
        assert!(matches!(cli.command, Command::Ls(_)));
    }

    #[test]
    fn exec_keeps_command_flags() {
        let cli =
            Cli::try_parse_from(["sbx", "exec", "--cwd", "/tmp", "ls", "-la", "/home"]).unwrap();
        assert!(matches!(cli.command, Command::Exec(_)));
    }

    #[test]
    fn exec_requires_a_command() {
        assert!(Cli::try_parse_from(["sbx", "exec"]).is_err());
    }
}
