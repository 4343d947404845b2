pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::services::form::FormController;
use crate::services::gate::SubmissionGate;
use crate::services::loader::AssetLoader;
use crate::services::pipeline::{IngestionPipeline, PipelinePolicy};
use crate::services::render_loop::RenderWorker;
use crate::services::scene::{RenderContext, ViewportSettings};
use crate::services::thumbnail::ThumbnailCapturer;
use crate::services::uploader::UploadSubmitter;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything one ingestion run needs, wired together
pub struct IngestSession {
    pub config: IngestConfig,
    pub viewport: Arc<RenderContext>,
    pub form: Arc<FormController>,
    pub pipeline: IngestionPipeline,
}

impl IngestSession {
    pub fn render_worker(&self, shutdown: watch::Receiver<bool>) -> RenderWorker {
        RenderWorker::new(self.viewport.clone(), self.config.frame_interval(), shutdown)
    }
}

pub fn create_session(config: IngestConfig) -> Result<IngestSession, IngestError> {
    create_session_with_loader(config, AssetLoader::gltf())
}

pub fn create_session_with_loader(
    config: IngestConfig,
    loader: AssetLoader,
) -> Result<IngestSession, IngestError> {
    config.validate()?;

    let viewport = Arc::new(RenderContext::new(ViewportSettings::with_size(
        config.viewport_size,
    )));
    let gate = SubmissionGate::new();
    let submitter = Arc::new(UploadSubmitter::new(&config)?);
    let form = Arc::new(FormController::new(
        viewport.clone(),
        ThumbnailCapturer::new(config.thumbnail_max_size),
        submitter,
        gate.signal(),
        config.thumbnail_policy,
        config.advance_on,
    ));
    let pipeline = IngestionPipeline::new(
        loader,
        viewport.clone(),
        gate,
        form.clone(),
        PipelinePolicy::from(&config),
    );

    Ok(IngestSession {
        config,
        viewport,
        form,
        pipeline,
    })
}
