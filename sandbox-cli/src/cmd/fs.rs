use std::path::{Path, PathBuf};

use clap::Args;
use e2b_sandbox::E2bFactory;
use sandbox::{Sandbox, SandboxFactory};

use crate::config::{self, GlobalArgs};
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct PathArgs {
    /// Path inside the sandbox
    path: String,
}

#[derive(Args)]
pub struct PutArgs {
    /// Local file to copy
    local: PathBuf,
    /// Destination inside the sandbox; without it the file is uploaded to
    /// the sandbox home directory under its own name
    remote: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// File inside the sandbox
    remote: String,
    /// Local destination
    local: PathBuf,
}

/// Create a sandbox, run `f` against it, and kill the sandbox afterwards
/// whatever the outcome.
async fn with_sandbox<T, F>(global: &GlobalArgs, f: F) -> CliResult<T>
where
    F: AsyncFnOnce(&dyn Sandbox) -> CliResult<T>,
{
    let settings = config::resolve(global).await?;
    let factory = E2bFactory::new(settings.e2b);
    let sandbox = factory.create(settings.sandbox).await?;
    let result = f(sandbox.as_ref()).await;
    factory.destroy(sandbox).await;
    result
}

pub async fn run_ls(global: &GlobalArgs, args: PathArgs) -> CliResult<()> {
    with_sandbox(global, async |sb: &dyn Sandbox| {
        for entry in sb.list(&args.path).await? {
            let suffix = if entry.is_dir { "/" } else { "" };
            println!("{}{suffix}", entry.name);
        }
        Ok(())
    })
    .await
}

pub async fn run_cat(global: &GlobalArgs, args: PathArgs) -> CliResult<()> {
    with_sandbox(global, async |sb: &dyn Sandbox| {
        print!("{}", sb.read(&args.path).await?);
        Ok(())
    })
    .await
}

fn file_name(path: &Path) -> CliResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| CliError::Config(format!("no file name in {}", path.display())))
}

pub async fn run_put(global: &GlobalArgs, args: PutArgs) -> CliResult<()> {
    let content = tokio::fs::read(&args.local).await?;
    let name = file_name(&args.local)?;
    with_sandbox(global, async |sb: &dyn Sandbox| {
        let remote = match &args.remote {
            Some(remote) => {
                sb.write_bytes(remote, &content).await?;
                remote.clone()
            }
            None => sb.upload_file(&name, content.clone()).await?,
        };
        println!("{} -> {remote}", args.local.display());
        Ok(())
    })
    .await
}

pub async fn run_get(global: &GlobalArgs, args: GetArgs) -> CliResult<()> {
    let content = with_sandbox(global, async |sb: &dyn Sandbox| {
        Ok(sb.download_file(&args.remote).await?)
    })
    .await?;
    tokio::fs::write(&args.local, &content).await?;
    println!("{} -> {}", args.remote, args.local.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_from_local_path() {
        assert_eq!(file_name(Path::new("./README.md")).unwrap(), "README.md");
        assert!(file_name(Path::new("/")).is_err());
    }
}
