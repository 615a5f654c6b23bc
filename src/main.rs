use anyhow::{Context, Result};
use crossbeam_channel::bounded;

use gesture_fusion::{
    FusionOrchestrator,
    config::{Config, DEFAULT_CONFIG_PATH, SourceConfig},
    pipeline::{self, FrameStream},
    sign::SignCatalog,
    transport::UdpTransport,
    types::Frame,
};

fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration {config_path}"))?;

    let engines = pipeline::load_engines(&config.models)?;
    let catalog = SignCatalog::load(&config.catalog_path);
    let mut transport = UdpTransport::new(config.destination()?)?;

    let (frame_tx, frame_rx) = bounded(1);
    let _stream = start_source(&config.source, frame_tx)?;

    let mut orchestrator = FusionOrchestrator::new(engines, catalog, &config);
    orchestrator.run(&frame_rx, &mut transport);

    Ok(())
}

fn start_source(
    source: &SourceConfig,
    frame_tx: crossbeam_channel::Sender<Frame>,
) -> Result<FrameStream> {
    match source {
        SourceConfig::Images { directory } => pipeline::start_replay_stream(directory, frame_tx),
        #[cfg(feature = "camera-nokhwa")]
        SourceConfig::Camera { index } => {
            match pipeline::available_cameras() {
                Ok(cameras) => {
                    for camera in cameras {
                        log::info!("found camera {:?}: {}", camera.index, camera.label);
                    }
                }
                Err(err) => log::warn!("failed to enumerate cameras: {err:?}"),
            }
            pipeline::start_camera_stream(*index, frame_tx)
        }
        #[cfg(not(feature = "camera-nokhwa"))]
        SourceConfig::Camera { .. } => {
            anyhow::bail!("built without camera support; configure an image directory source")
        }
    }
}
