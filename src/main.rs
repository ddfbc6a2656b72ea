use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use livescribe::{
    CaptureConstraints, Config, DeepgramConnector, MicrophoneSource, SessionController,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Live microphone transcription over a streaming recognition service
#[derive(Parser, Debug)]
#[command(name = "livescribe", version)]
struct Args {
    /// Config file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// Directory for the exported transcript; no export when omitted
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Recognition model id
    #[arg(long)]
    model: Option<String>,

    /// Recognition language
    #[arg(long)]
    language: Option<String>,

    /// Input device name (default input device when omitted)
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = Config::load(args.config.as_deref())?;

    let credential = cfg.credential();
    if credential.is_none() {
        eprintln!("No API credential configured.");
        eprintln!("Set LIVESCRIBE_API_KEY (or DEEPGRAM_API_KEY) and run again.");
        std::process::exit(2);
    }

    let mut channel_config = cfg.channel_config();
    if let Some(model) = args.model {
        channel_config.model = model;
    }
    if let Some(language) = args.language {
        channel_config.language = language;
    }

    let mut microphone = MicrophoneSource::new(CaptureConstraints::default());
    if let Some(device) = args.device {
        microphone = microphone.with_device(device);
    }

    let mut controller = SessionController::new(
        credential,
        channel_config,
        Box::new(microphone),
        Box::new(DeepgramConnector),
    );
    let mut segments = controller.segment_stream();

    controller.start().await?;
    info!("Recording. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            segment = segments.recv() => {
                match segment {
                    Some(segment) if segment.is_final => {
                        println!("\r{}", segment.text);
                    }
                    Some(segment) => {
                        print!("\r{}", segment.text);
                        std::io::stdout().flush().ok();
                    }
                    None => break,
                }
            }
        }

        if !controller.state().is_recording {
            break;
        }
    }

    controller.stop().await;

    let state = controller.state();
    if let Some(error) = &state.error {
        eprintln!("\nSession ended with error: {error}");
    }
    println!(
        "\nRecorded {} seconds, {} finalized segments.",
        state.duration_secs,
        controller.finalized_count()
    );

    let export_dir = args
        .export_dir
        .or_else(|| cfg.export_dir.as_ref().map(PathBuf::from));
    if let Some(dir) = export_dir {
        match controller.export(&dir)? {
            Some(path) => println!("Transcript exported to {}", path.display()),
            None => println!("Nothing to export."),
        }
    }

    Ok(())
}
