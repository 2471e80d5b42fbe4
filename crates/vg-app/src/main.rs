mod config;
mod error;
mod shell;

use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;
use tracing::info;
use vg_core::{PipelineRunner, VectorizerKind};

#[derive(Parser, Debug)]
#[command(name = "vectorgen", version, about = "Generate an image from a text prompt and save it as SVG")]
pub struct Cli {
    /// Text prompt, e.g. "A vibrant logo for a tech startup called 'SynthWave'"
    #[arg(required = true, num_args = 1..)]
    prompt: Vec<String>,

    /// Where to save the SVG. Asked interactively when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for per-job temporary files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// external, library or auto
    #[arg(long)]
    vectorizer: Option<VectorizerKind>,

    /// Dotenv file with TOGETHER_API_KEY and VECTORGEN_* settings
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let conf = config::load(&cli)?;
    info!(
        "Using {} ({} steps), work dir {} and {} vectorizer",
        conf.image.model.name(),
        conf.image.steps,
        conf.work_dir.display(),
        conf.vectorize.kind
    );

    let runner = PipelineRunner::from_config(&conf)?;
    let prompt = cli.prompt.join(" ");

    shell::generate(&runner, prompt, cli.output).await
}
