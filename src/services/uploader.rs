use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::models::{AssetMetadata, PendingFile, SubmissionEvent, SubmissionOutcome, ThumbnailPayload};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

/// Body of one multipart field
#[derive(Debug, Clone, PartialEq)]
pub enum PartBody {
    Text(String),
    Binary {
        bytes: Bytes,
        file_name: String,
        mime: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: &'static str,
    pub body: PartBody,
}

/// The multipart request for one asset, before it is handed to the HTTP client
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub parts: Vec<FormPart>,
}

impl UploadForm {
    pub fn build(file: &PendingFile, metadata: &AssetMetadata, thumbnail: &ThumbnailPayload) -> Self {
        let parts = vec![
            FormPart {
                name: "item_name",
                body: PartBody::Text(metadata.name.clone()),
            },
            FormPart {
                name: "filename",
                body: PartBody::Text(metadata.filename.clone()),
            },
            FormPart {
                name: "category",
                body: PartBody::Text(metadata.category.to_string()),
            },
            FormPart {
                name: "thumbnail",
                body: PartBody::Binary {
                    bytes: thumbnail.bytes.clone(),
                    file_name: file.base_name().to_string(),
                    mime: thumbnail.mime.to_string(),
                },
            },
            FormPart {
                name: "model",
                body: PartBody::Binary {
                    bytes: file.content.clone(),
                    file_name: file.name.clone(),
                    mime: file.mime.to_string(),
                },
            },
        ];
        Self { parts }
    }

    pub fn part(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn body_len(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match &p.body {
                PartBody::Text(text) => text.len(),
                PartBody::Binary { bytes, .. } => bytes.len(),
            })
            .sum()
    }

    pub fn into_multipart(self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for part in self.parts {
            form = match part.body {
                PartBody::Text(text) => form.text(part.name, text),
                PartBody::Binary {
                    bytes,
                    file_name,
                    mime,
                } => form.part(
                    part.name,
                    Part::bytes(bytes.to_vec())
                        .file_name(file_name)
                        .mime_str(&mime)?,
                ),
            };
        }
        Ok(form)
    }
}

/// Sends one asset to the ingestion endpoint and reports the outcome
pub struct UploadSubmitter {
    client: reqwest::Client,
    endpoint: Url,
    events: broadcast::Sender<SubmissionEvent>,
}

impl UploadSubmitter {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let endpoint = config.endpoint_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client,
            endpoint,
            events,
        }
    }

    /// Observers of every completed submission attempt
    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events.subscribe()
    }

    pub async fn submit(
        &self,
        file: &PendingFile,
        metadata: &AssetMetadata,
        thumbnail: &ThumbnailPayload,
    ) -> SubmissionOutcome {
        let form = UploadForm::build(file, metadata, thumbnail);
        debug!(
            "Uploading {} as '{}' [{}], {} bytes in {} parts, thumbnail {}",
            file.name,
            metadata.name,
            metadata.category,
            form.body_len(),
            form.parts.len(),
            thumbnail.fingerprint()
        );

        let outcome = self.send(form).await;
        match &outcome {
            SubmissionOutcome::Accepted { status } => {
                info!("✅ {} accepted by ingestion endpoint ({})", file.name, status)
            }
            SubmissionOutcome::RejectedByServer { status } => {
                warn!("⛔ {} rejected by ingestion endpoint ({})", file.name, status)
            }
            SubmissionOutcome::TransportFailure { reason } => {
                error!("❌ Upload of {} failed: {}", file.name, reason)
            }
        }

        // No receivers is fine
        let _ = self.events.send(SubmissionEvent::from_outcome(outcome.clone()));
        outcome
    }

    async fn send(&self, form: UploadForm) -> SubmissionOutcome {
        let multipart = match form.into_multipart() {
            Ok(multipart) => multipart,
            Err(e) => {
                return SubmissionOutcome::TransportFailure {
                    reason: format!("could not build request: {}", e),
                };
            }
        };

        match self
            .client
            .post(self.endpoint.clone())
            .multipart(multipart)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => SubmissionOutcome::Accepted {
                status: response.status().as_u16(),
            },
            Ok(response) => SubmissionOutcome::RejectedByServer {
                status: response.status().as_u16(),
            },
            Err(e) => SubmissionOutcome::TransportFailure {
                reason: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn chair() -> PendingFile {
        PendingFile::from_bytes("chair.glb", &b"glTF\x02\x00\x00\x00model-bytes"[..], 1024).unwrap()
    }

    fn thumbnail() -> ThumbnailPayload {
        ThumbnailPayload {
            bytes: Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47, 1, 2, 3]),
            mime: mime::IMAGE_PNG,
            width: 1,
            height: 1,
            asset: None,
            frame_seq: 1,
        }
    }

    #[test]
    fn test_form_composition() {
        let metadata = AssetMetadata::new("Chair", "chair.glb", Category::Seating).unwrap();
        let file = chair();
        let thumb = thumbnail();
        let form = UploadForm::build(&file, &metadata, &thumb);

        let names: Vec<_> = form.parts.iter().map(|p| p.name).collect();
        assert_eq!(names, ["item_name", "filename", "category", "thumbnail", "model"]);

        assert_eq!(form.part("item_name").unwrap().body, PartBody::Text("Chair".into()));
        assert_eq!(form.part("filename").unwrap().body, PartBody::Text("chair.glb".into()));
        assert_eq!(form.part("category").unwrap().body, PartBody::Text("seating".into()));
        assert_eq!(
            form.part("thumbnail").unwrap().body,
            PartBody::Binary {
                bytes: thumb.bytes.clone(),
                file_name: "chair".into(),
                mime: "image/png".into(),
            }
        );
        assert_eq!(
            form.part("model").unwrap().body,
            PartBody::Binary {
                bytes: file.content.clone(),
                file_name: "chair.glb".into(),
                mime: "model/gltf-binary".into(),
            }
        );
        assert_eq!(
            form.body_len(),
            "Chair".len() + "chair.glb".len() + "seating".len() + thumb.bytes.len() + file.size()
        );
    }

    #[test]
    fn test_into_multipart() {
        let metadata = AssetMetadata::new("Chair", "chair.glb", Category::Seating).unwrap();
        let form = UploadForm::build(&chair(), &metadata, &thumbnail());
        assert!(form.into_multipart().is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_outcome() {
        // Nothing listens on port 9 on loopback
        let endpoint = Url::parse("http://127.0.0.1:9/ims-uploader").unwrap();
        let submitter = UploadSubmitter::with_client(reqwest::Client::new(), endpoint);
        let mut events = submitter.subscribe();

        let metadata = AssetMetadata::new("Chair", "chair", Category::Seating).unwrap();
        let outcome = submitter.submit(&chair(), &metadata, &thumbnail()).await;

        assert!(matches!(outcome, SubmissionOutcome::TransportFailure { .. }));
        let event = events.recv().await.unwrap();
        assert!(!event.success);
        assert_eq!(event.outcome, Some(outcome));
    }
}
