use crate::services::scene::Viewport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Redraws the viewport at a fixed rate until shutdown
pub struct RenderWorker {
    viewport: Arc<dyn Viewport>,
    frame_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RenderWorker {
    pub fn new(
        viewport: Arc<dyn Viewport>,
        frame_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            viewport,
            frame_interval,
            shutdown,
        }
    }

    /// Returns the number of frames rendered
    pub async fn run(mut self) -> u64 {
        tracing::info!(
            "🎬 Render worker started ({} ms per frame)",
            self.frame_interval.as_millis()
        );

        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("🛑 Render worker shutting down after {} frames", frames);
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // Rasterizing is CPU-bound; keep it off the async workers
                    let viewport = self.viewport.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || viewport.render()).await {
                        tracing::error!("Render task failed: {}", e);
                        break;
                    }
                    frames += 1;
                }
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scene::{RenderContext, ViewportSettings};

    #[tokio::test]
    async fn test_renders_until_shutdown() {
        let viewport = Arc::new(RenderContext::new(ViewportSettings::with_size(8)));
        let (tx, rx) = watch::channel(false);
        let worker = RenderWorker::new(viewport.clone(), Duration::from_millis(1), rx);
        let handle = tokio::spawn(worker.run());

        while viewport.current_frame().is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tx.send(true).unwrap();

        let frames = handle.await.unwrap();
        assert!(frames >= 1);
        assert!(viewport.current_frame().unwrap().seq >= 1);
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let viewport = Arc::new(RenderContext::new(ViewportSettings::with_size(8)));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(RenderWorker::new(viewport, Duration::from_secs(60), rx).run());
        drop(tx);
        handle.await.unwrap();
    }
}
