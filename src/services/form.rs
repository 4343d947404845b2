use crate::config::{AdvancePolicy, ThumbnailPolicy};
use crate::error::IngestError;
use crate::models::{
    ActiveAsset, AssetId, AssetMetadata, SubmissionEvent, SubmissionOutcome, ThumbnailPayload,
};
use crate::services::gate::SubmissionSignal;
use crate::services::scene::Viewport;
use crate::services::thumbnail::{ThumbnailCapturer, ThumbnailSlot};
use crate::services::uploader::UploadSubmitter;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{info, warn};

/// Operator-facing side of the pipeline: holds the asset currently open in the
/// form, the captured thumbnail, and releases the gate once a submission
/// resolves.
pub struct FormController {
    viewport: Arc<dyn Viewport>,
    capturer: ThumbnailCapturer,
    thumbnail: ThumbnailSlot,
    submitter: Arc<UploadSubmitter>,
    signal: SubmissionSignal,
    thumbnail_policy: ThumbnailPolicy,
    advance_on: AdvancePolicy,
    active: watch::Sender<Option<ActiveAsset>>,
    captures: broadcast::Sender<ThumbnailPayload>,
    submitting: Mutex<()>,
}

impl FormController {
    pub fn new(
        viewport: Arc<dyn Viewport>,
        capturer: ThumbnailCapturer,
        submitter: Arc<UploadSubmitter>,
        signal: SubmissionSignal,
        thumbnail_policy: ThumbnailPolicy,
        advance_on: AdvancePolicy,
    ) -> Self {
        let (active, _) = watch::channel(None);
        let (captures, _) = broadcast::channel(8);
        Self {
            viewport,
            capturer,
            thumbnail: ThumbnailSlot::new(),
            submitter,
            signal,
            thumbnail_policy,
            advance_on,
            active,
            captures,
            submitting: Mutex::new(()),
        }
    }

    /// Opens the form for an asset. Called by the pipeline once the gate is armed.
    pub fn activate(&self, asset: ActiveAsset) {
        info!(
            "📝 [{}/{}] {} is ready for metadata",
            asset.index + 1,
            asset.total,
            asset.file.name
        );
        self.active.send_replace(Some(asset));
    }

    pub fn deactivate(&self) {
        self.active.send_replace(None);
    }

    pub fn active(&self) -> Option<ActiveAsset> {
        self.active.borrow().clone()
    }

    pub fn watch_active(&self) -> watch::Receiver<Option<ActiveAsset>> {
        self.active.subscribe()
    }

    /// Every thumbnail produced, whether captured explicitly or at submit time
    pub fn subscribe_captures(&self) -> broadcast::Receiver<ThumbnailPayload> {
        self.captures.subscribe()
    }

    /// Whether an outcome releases the gate
    pub fn advances(&self, outcome: &SubmissionOutcome) -> bool {
        match self.advance_on {
            AdvancePolicy::AnyOutcome => true,
            AdvancePolicy::AcceptedOnly => outcome.is_accepted(),
        }
    }

    fn encode(&self) -> Result<ThumbnailPayload, IngestError> {
        let payload = self.capturer.capture(self.viewport.as_ref())?;
        let _ = self.captures.send(payload.clone());
        Ok(payload)
    }

    /// Captures the current frame into the thumbnail slot
    pub fn capture(&self) -> Result<ThumbnailPayload, IngestError> {
        let payload = self.encode()?;
        if self.thumbnail.store(payload.clone()).is_some() {
            tracing::debug!("Replaced an unconsumed thumbnail");
        }
        Ok(payload)
    }

    /// Renders a new frame first, so the capture shows what is resident now
    pub fn render_and_capture(&self) -> Result<ThumbnailPayload, IngestError> {
        self.viewport.render();
        self.capture()
    }

    /// Picks the thumbnail for the active asset according to the policy
    fn resolve_thumbnail(&self, asset: &ActiveAsset) -> Result<ThumbnailPayload, IngestError> {
        let held = self.thumbnail.take();
        match self.thumbnail_policy {
            ThumbnailPolicy::Manual => held.ok_or(IngestError::MissingThumbnail),
            ThumbnailPolicy::RequireFresh => match held {
                Some(payload) if payload.is_of(asset.id) => Ok(payload),
                Some(_) => Err(IngestError::StaleThumbnail),
                None => Err(IngestError::MissingThumbnail),
            },
            ThumbnailPolicy::AutoCapture => match held {
                Some(payload) if payload.is_of(asset.id) => Ok(payload),
                _ => {
                    self.viewport.render();
                    self.encode()
                }
            },
        }
    }

    /// Uploads the active asset with the given metadata. The gate is released
    /// according to the advance policy; a non-advancing failure leaves the
    /// asset open for another attempt with the same thumbnail.
    pub async fn submit(&self, metadata: AssetMetadata) -> Result<SubmissionOutcome, IngestError> {
        let _guard = self.submitting.lock().await;
        let asset = self.active().ok_or(IngestError::NoActiveAsset)?;
        let thumbnail = self.resolve_thumbnail(&asset)?;

        let outcome = self
            .submitter
            .submit(&asset.file, &metadata, &thumbnail)
            .await;

        if self.advances(&outcome) {
            let event = SubmissionEvent::from_outcome(outcome.clone());
            if !self.signal.fire(asset.id, event) {
                warn!("Submission for {} resolved after its wait ended", asset.file.name);
            }
        } else {
            self.thumbnail.restore(thumbnail);
            info!(
                "{} stays open for another attempt (use skip to move on)",
                asset.file.name
            );
        }
        Ok(outcome)
    }

    /// Releases the gate for `asset` without uploading. Fails when `asset` is
    /// no longer the one open in the form.
    pub fn skip(&self, asset: AssetId) -> Result<(), IngestError> {
        let active = self
            .active()
            .filter(|active| active.id == asset)
            .ok_or(IngestError::NoActiveAsset)?;
        if self.signal.fire(asset, SubmissionEvent::skipped()) {
            info!("⏭️  Skipped {}", active.file.name);
            Ok(())
        } else {
            Err(IngestError::NoActiveAsset)
        }
    }
}
