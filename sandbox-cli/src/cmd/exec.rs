use std::process::ExitCode;

use clap::Args;
use e2b_sandbox::E2bFactory;
use sandbox::{ProcessMessage, ProcessRequest, SandboxFactory};
use tracing::info;

use crate::config::{self, GlobalArgs};
use crate::error::CliResult;

#[derive(Args)]
pub struct ExecArgs {
    /// Working directory inside the sandbox
    #[arg(long)]
    cwd: Option<String>,
    /// Command to run (passed to the sandbox shell)
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Map a remote exit code onto a local one. Codes outside 0..=255 become 1.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

/// Run one command in a fresh sandbox, streaming its output, then kill the
/// sandbox.
pub async fn run_exec(global: &GlobalArgs, args: ExecArgs) -> CliResult<ExitCode> {
    let settings = config::resolve(global).await?;
    let factory = E2bFactory::new(settings.e2b);
    let sandbox = factory.create(settings.sandbox).await?;

    let mut request = ProcessRequest::new(args.command.join(" "))
        .on_stdout(|m: &ProcessMessage| println!("{}", m.line))
        .on_stderr(|m: &ProcessMessage| eprintln!("{}", m.line));
    request.cwd = args.cwd;

    let result = async {
        let mut process = sandbox.start_process(request).await?;
        process.wait().await
    }
    .await;
    factory.destroy(sandbox).await;

    let output = result?;
    info!(exit_code = output.exit_code, "command finished");
    Ok(exit_code(output.exit_code))
}
