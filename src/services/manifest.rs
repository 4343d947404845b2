//! Unattended mode: metadata for every file comes from a JSON manifest
//! instead of the console.

use crate::error::IngestError;
use crate::models::{ActiveAsset, MetadataDraft, PendingFile};
use crate::services::form::FormController;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// File name to form values, e.g.
/// `{"chair.glb": {"name": "Chair", "category": "seating"}}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct BatchManifest {
    entries: HashMap<String, MetadataDraft>,
}

impl BatchManifest {
    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        serde_json::from_str(json)
            .map_err(|e| IngestError::Config(format!("invalid manifest: {}", e)))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Form values for a file: the manifest entry over the form defaults
    pub fn draft_for(&self, file: &PendingFile) -> Option<MetadataDraft> {
        let entry = self.entries.get(&file.name)?;
        let defaults = MetadataDraft::for_file(file);
        Some(MetadataDraft {
            name: entry.name.clone().or(defaults.name),
            filename: entry.filename.clone().or(defaults.filename),
            category: entry.category.clone().or(defaults.category),
        })
    }
}

/// Answers the form from a manifest: one capture and one submission per
/// asset, skipping it when the outcome does not release the gate.
pub struct BatchDriver {
    form: Arc<FormController>,
    manifest: BatchManifest,
    active: watch::Receiver<Option<ActiveAsset>>,
}

impl BatchDriver {
    pub fn new(form: Arc<FormController>, manifest: BatchManifest) -> Self {
        let active = form.watch_active();
        Self {
            form,
            manifest,
            active,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("🤖 Batch driver started with {} manifest entries", self.manifest.len());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.active.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = self.active.borrow_and_update().clone();
                    if let Some(asset) = current {
                        self.handle(&asset).await;
                    }
                }
            }
        }
    }

    async fn handle(&self, asset: &ActiveAsset) {
        let name = &asset.file.name;
        let metadata = match self.manifest.draft_for(&asset.file) {
            Some(draft) => draft.to_metadata(),
            None => {
                warn!("No manifest entry for {}, skipping", name);
                self.skip(asset);
                return;
            }
        };
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Manifest entry for {} is invalid ({}), skipping", name, e);
                self.skip(asset);
                return;
            }
        };

        if let Err(e) = self.form.render_and_capture() {
            warn!("Capture for {} failed: {}", name, e);
            self.skip(asset);
            return;
        }

        match self.form.submit(metadata).await {
            Ok(outcome) if self.form.advances(&outcome) => {}
            Ok(outcome) => {
                warn!("{} not advanced after {}, skipping", name, outcome);
                self.skip(asset);
            }
            Err(e) => {
                warn!("Submission of {} failed: {}", name, e);
                self.skip(asset);
            }
        }
    }

    fn skip(&self, asset: &ActiveAsset) {
        if let Err(e) = self.form.skip(asset.id) {
            warn!("Could not skip {}: {}", asset.file.name, e);
        }
    }
}
