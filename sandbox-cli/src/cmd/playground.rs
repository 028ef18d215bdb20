use std::time::{Duration, Instant};

use clap::Args;
use e2b_sandbox::E2bFactory;
use sandbox::{FsEvent, ProcessMessage, ProcessRequest, Sandbox, SandboxFactory, Watcher};
use tracing::{info, warn};

use crate::config::{self, GlobalArgs};
use crate::error::CliResult;

#[derive(Args)]
pub struct PlaygroundArgs {
    /// Rounds of each phase to run
    #[arg(long, default_value_t = 10)]
    iterations: usize,
    /// Directory to watch and work in
    #[arg(long, default_value = "/home")]
    watch_dir: String,
    /// Seconds to extend the sandbox lifetime by (1 to 3600)
    #[arg(long, default_value_t = 101)]
    keep_alive: u64,
}

/// Sandbox plus the watcher printing its events.
struct Playground {
    sandbox: Box<dyn Sandbox>,
    watcher: Option<Box<dyn Watcher>>,
    dir: String,
}

impl Playground {
    fn path(&self, name: &str) -> String {
        match self.dir.as_str() {
            "/" => format!("/{name}"),
            dir => format!("{dir}/{name}"),
        }
    }

    async fn start_watcher(&mut self) -> CliResult<()> {
        let mut watcher = self.sandbox.watch_dir(&self.dir).await?;
        watcher.add_event_listener(Box::new(|event: &FsEvent| {
            println!("{} {}", event.operation, event.path);
        }));
        watcher.start().await?;
        self.watcher = Some(watcher);
        Ok(())
    }

    async fn filesystem_phase(&self, iterations: usize) -> CliResult<()> {
        let sb = &self.sandbox;
        for i in 0..iterations {
            let file = self.path(&format!("file{i}.txt"));
            let dir = self.path(&format!("dir{i}"));
            sb.write(&file, &format!("Hello World {i}!")).await?;
            sb.make_dir(&dir).await?;
            let _ = sb.read(&file).await?;
            let _ = sb.list(&self.dir).await?;
            let _ = sb.read_bytes(&file).await?;
            sb.write_bytes(&file, format!("Hello World {i}!").as_bytes())
                .await?;
            sb.remove(&file).await?;
            sb.remove(&dir).await?;
        }
        Ok(())
    }

    async fn process_phase(&self, iterations: usize) -> CliResult<()> {
        let print_stdout = |m: &ProcessMessage| println!("stdout: {}", m.line);
        for i in 0..iterations {
            let file = self.path(&format!("file{i}.txt"));
            let commands = [
                (format!("echo 'Hello World {i}!' > {file}"), true),
                (format!("cat {file}"), false),
                (format!("ls {}", self.dir), false),
                (format!("cat {file}"), true),
                (format!("rm {file}"), false),
            ];
            for (cmd, listen) in commands {
                let mut request = ProcessRequest::new(cmd);
                if listen {
                    request = request.on_stdout(print_stdout);
                }
                let output = self.sandbox.start_process(request).await?.wait().await?;
                if !output.success() {
                    warn!(exit_code = output.exit_code, stderr = %output.stderr, "process failed");
                }
            }
        }
        Ok(())
    }

    async fn run(&mut self, args: &PlaygroundArgs) -> CliResult<()> {
        self.start_watcher().await?;
        self.sandbox
            .keep_alive(Duration::from_secs(args.keep_alive))
            .await?;

        let t = Instant::now();
        self.filesystem_phase(args.iterations).await?;
        info!(
            elapsed_ms = t.elapsed().as_millis(),
            iterations = args.iterations,
            "filesystem phase done"
        );

        let t = Instant::now();
        self.process_phase(args.iterations).await?;
        info!(
            elapsed_ms = t.elapsed().as_millis(),
            iterations = args.iterations,
            "process phase done"
        );
        Ok(())
    }

    /// Stop the watcher and close the session, even after a failed run.
    async fn shutdown(mut self) {
        if let Some(mut watcher) = self.watcher.take()
            && let Err(e) = watcher.stop().await
        {
            warn!("failed to stop watcher: {e}");
        }
        if let Err(e) = self.sandbox.close().await {
            warn!("failed to close sandbox: {e}");
        }
    }
}

pub async fn run_playground(global: &GlobalArgs, args: PlaygroundArgs) -> CliResult<()> {
    let settings = config::resolve(global).await?;
    let factory = E2bFactory::new(settings.e2b);

    let t = Instant::now();
    let sandbox = factory.create(settings.sandbox).await?;
    info!(
        sandbox_id = sandbox.id(),
        elapsed_ms = t.elapsed().as_millis(),
        "sandbox ready"
    );

    let mut playground = Playground {
        sandbox,
        watcher: None,
        dir: work_dir(&args.watch_dir),
    };
    let result = playground.run(&args).await;
    playground.shutdown().await;
    result
}

/// Watched directory without a trailing slash (except for the root).
fn work_dir(watch_dir: &str) -> String {
    match watch_dir.trim_end_matches('/') {
        "" => "/".to_string(),
        dir => dir.to_string(),
    }
}
