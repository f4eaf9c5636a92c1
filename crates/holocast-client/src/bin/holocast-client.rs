#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use holocast_client::{
    AudioCaptureOptions, ClientConfig, ConnectionState, LoopbackDevices, LoopbackRoom,
    RealtimeTransport, RemoteSessionClient, SessionController,
};
use holocast_common::config::{DEFAULT_AVATAR_ID, DEFAULT_BACKGROUND, DEFAULT_SERVER_URL};
use holocast_common::{ProviderConfig, Quality};
use holocast_media::{
    AudioSink, ChromaKey, CompositorConfig, NullAudioSink, PngSnapshotWriter, Resolution,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "holocast-client")]
struct Args {
    /// Provider API key, exchanged for a short-lived session token
    #[arg(long, env = "HOLOCAST_API_KEY", hide_env_values = true)]
    api_key: String,
    #[arg(long, env = "HOLOCAST_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    #[arg(long, env = "HOLOCAST_AVATAR_ID", default_value = DEFAULT_AVATAR_ID)]
    avatar_id: String,
    #[arg(long, env = "HOLOCAST_VOICE_ID")]
    voice_id: Option<String>,
    #[arg(long, env = "HOLOCAST_KNOWLEDGE_BASE_ID")]
    knowledge_base_id: Option<String>,
    /// low, medium or high
    #[arg(long, env = "HOLOCAST_QUALITY", default_value = "high")]
    quality: Quality,
    /// Backdrop colour requested from the provider
    #[arg(long, default_value = DEFAULT_BACKGROUND)]
    background: String,
    /// Write keyed frames as PNGs into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Keep one of every N captured frames
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,
    /// Size of the loopback avatar feed
    #[arg(long, default_value_t = 512)]
    feed_width: u16,
    #[arg(long, default_value_t = 512)]
    feed_height: u16,
    #[arg(long, default_value_t = ChromaKey::GREEN_SCREEN.min_green)]
    min_green: u8,
    #[arg(long, default_value_t = ChromaKey::GREEN_SCREEN.margin)]
    key_margin: u8,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            provider: ProviderConfig {
                server_url: self.server_url.clone(),
                avatar_id: self.avatar_id.clone(),
                voice_id: self.voice_id.clone(),
                knowledge_base_id: self.knowledge_base_id.clone(),
                quality: self.quality,
                background: Some(self.background.clone()),
            },
            compositor: CompositorConfig {
                key: ChromaKey {
                    min_green: self.min_green,
                    margin: self.key_margin,
                },
                ..Default::default()
            },
            audio: AudioCaptureOptions::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    holocast_common::init_tracing();
    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.client_config();
    let api = RemoteSessionClient::new(config.provider.clone())
        .context("invalid provider configuration")?;

    let (room, _room_handle) =
        LoopbackRoom::with_avatar_feed(Resolution::new(args.feed_width, args.feed_height));
    let (devices, _devices_handle) = LoopbackDevices::new();
    let transport = RealtimeTransport::new(
        Box::new(room),
        Box::new(devices),
        Box::new(|| -> anyhow::Result<Box<dyn AudioSink>> {
            Ok(Box::new(NullAudioSink::new()))
        }),
    );
    let mut controller = SessionController::new(config, Arc::new(api), transport);
    let mut notices = controller.subscribe_notices();

    let snapshots = match &args.snapshot_dir {
        Some(dir) => {
            let mut writer = PngSnapshotWriter::new(dir, args.snapshot_every)
                .with_context(|| format!("cannot write snapshots to {}", dir.display()))?;
            let mut frames = controller.compositor().subscribe();
            Some(tokio::spawn(async move {
                loop {
                    match frames.recv().await {
                        Ok(frame) => match writer.offer(&frame) {
                            Ok(Some(path)) => info!("snapshot {}", path.display()),
                            Ok(None) => {}
                            Err(err) => warn!("snapshot failed: {}", err),
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("snapshot writer skipped {} frames", skipped)
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }))
        }
        None => None,
    };

    controller.connect(&args.api_key).await?;
    if let Some(session) = controller.session() {
        info!(
            "session {} live with avatar {}; type to talk, /quit to leave",
            session.session_id, session.avatar_id
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim() == "/quit" => break,
                    Ok(Some(line)) => {
                        if let Err(err) = controller.send_message(&line).await {
                            warn!("{}", err);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("stdin closed: {}", err);
                        break;
                    }
                }
            }
            event = controller.next_event() => {
                controller.handle_event(event).await;
            }
            notice = notices.recv() => {
                match notice {
                    Ok(notice) => info!("{}", notice),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        }
        if controller.state() == ConnectionState::Idle {
            warn!("session ended");
            break;
        }
    }

    controller.disconnect().await;
    if let Some(task) = snapshots {
        task.abort();
    }
    Ok(())
}
