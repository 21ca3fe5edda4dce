use std::sync::Arc;

use tracing::{info, warn};
use tunedeck::{
  common::{
    banner::{BannerInfo, print_banner},
    logger,
    types::AnyResult,
  },
  configs::Config,
  sources::SourceManager,
};

/// Resolves every reference given on the command line and prints what a
/// session would enqueue for it.
#[tokio::main]
async fn main() -> AnyResult<()> {
  let config = Config::load()?;
  logger::init(&config);
  print_banner(&BannerInfo::default());

  let sources = Arc::new(SourceManager::new(&config).await?);

  let inputs: Vec<String> = std::env::args().skip(1).collect();
  if inputs.is_empty() {
    warn!("Nothing to resolve; pass links or search terms as arguments");
    return Ok(());
  }

  for input in &inputs {
    match sources.load(input).await {
      Ok(result) => {
        if let Some(playlist) = &result.playlist {
          info!("{} ({} entries)", playlist.title, playlist.track_count);
        }
        for track in &result.tracks {
          tunedeck::log_println!(
            "{} [{}] {}",
            track.title,
            track.formatted_duration(),
            track.webpage_url
          );
        }
        for failure in &result.failures {
          warn!("Could not load {}: {}", failure.reference, failure.error);
        }
      }
      Err(e) => warn!("Could not load {}: {}", input, e),
    }
  }

  Ok(())
}
