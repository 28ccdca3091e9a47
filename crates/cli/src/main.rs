//! `sketch3d` -- turn a sketch into a 3D model.
//!
//! Uploads the sketch to a ComfyUI server, runs the image-to-3D workflow,
//! logs progress and saves the resulting model file.
//!
//! # Environment variables
//!
//! See `PipelineConfig::from_env` for the ComfyUI and workflow settings.
//!
//! | Variable       | Required        | Default                          |
//! |----------------|-----------------|----------------------------------|
//! | `GROQ_API_KEY` | with `--voice`  | --                               |
//! | `GROQ_API_URL` | no              | `https://api.groq.com/openai/v1` |
//! | `RUST_LOG`     | no              | `sketch3d=info,...`              |

use anyhow::Context;
use clap::Parser;
use sketch3d_cli::{consume_run, load_image, voice_guidance, Args};
use sketch3d_pipeline::{GenerationPipeline, PipelineConfig};
use sketch3d_speech::GroqTranscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sketch3d=info,sketch3d_cli=info,sketch3d_pipeline=info,sketch3d_comfyui=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_env().context("Invalid configuration")?;

    let image = load_image(&args.image).await?;

    let guidance = match &args.voice {
        Some(path) => {
            let transcriber =
                GroqTranscriber::from_env().context("Voice input needs a transcription key")?;
            let clip = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read voice clip {}", path.display()))?;
            voice_guidance(&transcriber, clip, &args.guidance).await?
        }
        None => args.guidance.clone(),
    };

    let client_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        client_id = %client_id,
        api_url = %config.api_url,
        template = %config.template_path.display(),
        "Starting generation",
    );

    let pipeline = GenerationPipeline::from_config(&config);
    let path = consume_run(pipeline.run(image, guidance, client_id), &args.output_dir).await?;

    println!("{}", path.display());
    Ok(())
}
