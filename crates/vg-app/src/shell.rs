use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use vg_core::{artifact, PipelineEvent, PipelineRunner};
use crate::error::AppError;

/// Runs one job, reporting progress on stdout, then saves or discards the SVG.
pub async fn generate(runner: &PipelineRunner, prompt: String, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Starting generation...");
    let mut handle = runner.run(prompt);

    // Listening for SIGINT disables the default handler, so a second
    // Ctrl-C has to exit explicitly.
    let cancel = handle.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling after the current step (Ctrl-C again to quit)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted again, exiting");
            std::process::exit(130);
        }
    });

    while let Some(event) = handle.recv().await {
        match event {
            PipelineEvent::Progress(progress) => {
                info!(job = %progress.job_id, stage = ?progress.stage, "progress");
                println!("{}", progress.message);
            }
            PipelineEvent::Finished(result) => {
                watcher.abort();
                println!("Generation complete!");
                let dest = match output {
                    Some(path) => Some(path),
                    None => ask_or_interrupt(ask_destination(), tokio::signal::ctrl_c()).await?,
                };
                return save_or_discard(&result.path, dest.as_deref());
            }
            PipelineEvent::Failed(failure) => {
                watcher.abort();
                return Err(AppError::Pipeline {
                    kind: failure.kind,
                    message: failure.message,
                }
                .into());
            }
        }
    }

    watcher.abort();
    Err(AppError::NoResult.into())
}

/// An interrupt while waiting for the answer counts as "discard".
async fn ask_or_interrupt<A, I, T>(ask: A, interrupt: I) -> anyhow::Result<Option<PathBuf>>
where
    A: Future<Output = anyhow::Result<Option<PathBuf>>>,
    I: Future<Output = T>,
{
    tokio::select! {
        answer = ask => answer,
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

async fn ask_destination() -> anyhow::Result<Option<PathBuf>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Save SVG to (leave empty to discard): ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| PathBuf::from(answer)))
}

fn save_or_discard(svg: &Path, dest: Option<&Path>) -> anyhow::Result<()> {
    match dest {
        Some(dest) => {
            let saved = artifact::persist(svg, dest).map_err(|e| {
                anyhow::anyhow!("Could not save file: {e}. The SVG is still at {}", svg.display())
            })?;
            println!("File saved to {}", saved.display());
        }
        None => {
            artifact::discard(svg)?;
            println!("Save cancelled. Temporary file removed.");
        }
    }
    Ok(())
}
