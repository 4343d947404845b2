//! Sequential ingestion: one file is loaded, shown, submitted and detached
//! before the next one is touched.

use crate::config::{DecodeFailurePolicy, IngestConfig};
use crate::error::{GateError, IngestError};
use crate::models::{ActiveAsset, PendingFile, SubmissionOutcome};
use crate::services::form::FormController;
use crate::services::gate::SubmissionGate;
use crate::services::loader::AssetLoader;
use crate::services::scene::Viewport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Loading,
    Resident,
    AwaitingSubmission,
    Detaching,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FileResult {
    Submitted { outcome: SubmissionOutcome },
    Skipped,
    DecodeFailed { reason: String },
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub result: FileResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub files: Vec<FileReport>,
    /// Files never reached because the run stopped early
    pub not_processed: Vec<String>,
    pub halted: bool,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn accepted(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(&f.result, FileResult::Submitted { outcome } if outcome.is_accepted()))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelinePolicy {
    pub on_decode_failure: DecodeFailurePolicy,
    pub gate_timeout: Option<Duration>,
}

impl From<&IngestConfig> for PipelinePolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            on_decode_failure: config.on_decode_failure,
            gate_timeout: config.gate_timeout(),
        }
    }
}

pub struct IngestionPipeline {
    loader: AssetLoader,
    viewport: Arc<dyn Viewport>,
    gate: SubmissionGate,
    form: Arc<FormController>,
    policy: PipelinePolicy,
    state: watch::Sender<PipelineState>,
}

impl IngestionPipeline {
    pub fn new(
        loader: AssetLoader,
        viewport: Arc<dyn Viewport>,
        gate: SubmissionGate,
        form: Arc<FormController>,
        policy: PipelinePolicy,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            loader,
            viewport,
            gate,
            form,
            policy,
            state,
        }
    }

    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn transition(&self, next: PipelineState) {
        tracing::debug!("Pipeline state -> {:?}", next);
        self.state.send_replace(next);
    }

    /// Processes `files` in order. Returns once every file has been resolved,
    /// the run is halted by a decode failure, or `cancel` fires.
    pub async fn run(
        &self,
        files: Vec<PendingFile>,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, IngestError> {
        let total = files.len();
        let mut report = PipelineReport {
            files: Vec::with_capacity(total),
            not_processed: Vec::new(),
            halted: false,
            cancelled: false,
        };
        info!("🚚 Starting ingestion of {} file(s)", total);

        let mut queue = files.into_iter().enumerate();
        for (index, file) in queue.by_ref() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.not_processed.push(file.name);
                break;
            }

            let started_at = Utc::now();
            let name = file.name.clone();
            let result = self.process(index, total, Arc::new(file), &cancel).await?;
            let stop = match &result {
                FileResult::DecodeFailed { .. } => {
                    self.policy.on_decode_failure == DecodeFailurePolicy::Halt
                }
                FileResult::Cancelled => true,
                _ => false,
            };
            report.halted = matches!(result, FileResult::DecodeFailed { .. }) && stop;
            report.cancelled = matches!(result, FileResult::Cancelled);
            report.files.push(FileReport {
                file: name,
                result,
                started_at,
                finished_at: Utc::now(),
            });
            if stop {
                break;
            }
        }
        report
            .not_processed
            .extend(queue.map(|(_, file)| file.name));

        self.transition(PipelineState::Finished);
        info!(
            "🏁 Ingestion finished: {} accepted, {} processed, {} not processed",
            report.accepted(),
            report.files.len(),
            report.not_processed.len()
        );
        Ok(report)
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        file: Arc<PendingFile>,
        cancel: &CancellationToken,
    ) -> Result<FileResult, IngestError> {
        self.transition(PipelineState::Loading);
        info!("⏳ [{}/{}] Loading {}", index + 1, total, file.name);

        let asset = match self.loader.load(file.clone()).await {
            Ok(asset) => asset,
            Err(IngestError::Decode { file, reason }) => {
                warn!("Could not decode {}: {}", file, reason);
                self.transition(PipelineState::Idle);
                return Ok(FileResult::DecodeFailed { reason });
            }
            Err(IngestError::Validation(e)) => {
                warn!("Rejected {}: {}", file.name, e);
                self.transition(PipelineState::Idle);
                return Ok(FileResult::DecodeFailed {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let id = asset.id;
        self.viewport.attach(id, asset.object)?;
        self.transition(PipelineState::Resident);

        // Arm before the form can see the asset so no submission is lost
        let wait = match self.gate.arm(id) {
            Ok(wait) => wait,
            Err(e) => {
                self.viewport.detach(id);
                return Err(e.into());
            }
        };
        self.form.activate(ActiveAsset {
            id,
            file: asset.file,
            index,
            total,
        });
        self.transition(PipelineState::AwaitingSubmission);

        let waited = wait.wait(self.policy.gate_timeout, cancel).await;

        self.form.deactivate();
        self.transition(PipelineState::Detaching);
        self.viewport.detach(id);
        self.transition(PipelineState::Idle);

        Ok(match waited {
            Ok(event) => match event.outcome {
                Some(outcome) => FileResult::Submitted { outcome },
                None => FileResult::Skipped,
            },
            Err(GateError::TimedOut) => {
                warn!("No submission for {} before the gate timed out", file.name);
                FileResult::TimedOut
            }
            Err(GateError::Cancelled) => FileResult::Cancelled,
            Err(e @ GateError::AlreadyArmed) => return Err(e.into()),
        })
    }
}
