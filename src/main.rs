use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hearth::voice::{AudioCapture, AudioPlayback, Synthesizer};
use hearth::{Config, Pipeline};

#[derive(Parser)]
#[command(name = "hearth", version, about = "Voice-driven home-control assistant")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record a few seconds from the microphone and report levels
    TestMic {
        /// Seconds to record
        #[arg(long, default_value_t = 3)]
        seconds: u64,
    },
    /// Play a short test tone through the speaker
    TestSpeaker,
    /// Synthesize a phrase and play it
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hearth is up and running.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Command::TestMic { seconds }) => test_mic(seconds).await,
        Some(Command::TestSpeaker) => test_speaker(),
        Some(Command::TestTts { text }) => test_tts(&text).await,
        None => {
            let config = Config::load().context("failed to load configuration")?;
            let mut pipeline = Pipeline::new(&config).context("failed to build pipeline")?;
            pipeline.run().await.context("pipeline failed")?;
            Ok(())
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "hearth=info",
        1 => "hearth=debug",
        _ => "hearth=trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn test_mic(seconds: u64) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new().context("failed to open microphone")?;
    capture.start().context("failed to start capture")?;

    println!("Recording for {seconds}s, say something...");
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    capture.stop();

    let samples = capture.take_buffer();
    if samples.is_empty() {
        anyhow::bail!("no samples captured, check the input device");
    }

    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    #[allow(clippy::cast_precision_loss)]
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();

    println!("Captured {} samples", samples.len());
    println!("Peak: {peak:.4}  RMS: {rms:.4}");
    if rms < 0.001 {
        println!("Warning: signal is near silence, the microphone may be muted");
    }

    Ok(())
}

fn test_speaker() -> anyhow::Result<()> {
    let playback = AudioPlayback::new().context("failed to open speaker")?;

    // One second of 440 Hz at the playback rate
    let samples: Vec<f32> = (0..24000)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / 24000.0;
            (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3
        })
        .collect();

    println!("Playing test tone...");
    playback
        .play_samples(samples, None)
        .context("failed to play tone")?;
    println!("Done.");

    Ok(())
}

async fn test_tts(text: &str) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let synthesizer = match config.tts_provider {
        hearth::config::TtsProvider::OpenAi => Synthesizer::openai(
            config.openai_api_key.clone(),
            config.tts_model.clone(),
            config.tts_voice.clone(),
            config.tts_speed,
        )?,
        hearth::config::TtsProvider::ElevenLabs => Synthesizer::elevenlabs(
            config.elevenlabs_api_key.clone(),
            config.tts_model.clone(),
            config.tts_voice.clone(),
        )?,
    };

    println!("Synthesizing: {text}");
    let mp3 = synthesizer.synthesize(text).await.context("synthesis failed")?;
    println!("Got {} bytes of audio", mp3.len());

    let playback = AudioPlayback::new().context("failed to open speaker")?;
    playback.play_mp3(&mp3, None).context("playback failed")?;
    println!("Done.");

    Ok(())
}
