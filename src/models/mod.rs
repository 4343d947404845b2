use crate::error::IngestError;
use crate::utils::hash::short_fingerprint;
use crate::utils::validation::{ValidationError, validate_model_file};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Closed set of catalogue categories accepted by the ingestion endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bedding,
    Electronics,
    Environment,
    Lights,
    Seating,
    Sofas,
    Storage,
    Table,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Bedding,
        Category::Electronics,
        Category::Environment,
        Category::Lights,
        Category::Seating,
        Category::Sofas,
        Category::Storage,
        Category::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bedding => "bedding",
            Category::Electronics => "electronics",
            Category::Environment => "environment",
            Category::Lights => "lights",
            Category::Seating => "seating",
            Category::Sofas => "sofas",
            Category::Storage => "storage",
            Category::Table => "table",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ValidationError {
                code: "INVALID_CATEGORY",
                message: format!(
                    "'{}' is not a known category. Expected one of: {}",
                    s,
                    Category::ALL.map(|c| c.as_str()).join(", ")
                ),
            })
    }
}

/// A raw model file selected by the operator
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub name: String,
    pub mime: &'static str,
    pub content: Bytes,
    /// Where the file was read from, so relative glTF buffers can resolve
    pub source: Option<PathBuf>,
}

impl PendingFile {
    pub fn from_bytes(
        name: &str,
        content: impl Into<Bytes>,
        max_size: usize,
    ) -> Result<Self, ValidationError> {
        let content = content.into();
        let (name, mime) = validate_model_file(name, &content, max_size)?;
        Ok(Self {
            name,
            mime,
            content,
            source: None,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>, max_size: usize) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > max_size as u64 {
            return Err(IngestError::Validation(ValidationError {
                code: "FILE_TOO_LARGE",
                message: format!(
                    "{} is {} bytes, maximum is {} bytes",
                    path.display(),
                    metadata.len(),
                    max_size
                ),
            }));
        }

        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let mut file = Self::from_bytes(name, content, max_size)?;
        file.source = Some(path.to_path_buf());
        Ok(file)
    }

    /// File name without its extension; names the thumbnail part
    pub fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

impl AssetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PNG encoding of one rendered frame
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailPayload {
    pub bytes: Bytes,
    pub mime: mime::Mime,
    pub width: u32,
    pub height: u32,
    /// Asset resident in the scene when the frame was rendered
    pub asset: Option<AssetId>,
    pub frame_seq: u64,
}

impl ThumbnailPayload {
    pub fn is_of(&self, asset: AssetId) -> bool {
        self.asset == Some(asset)
    }

    pub fn fingerprint(&self) -> String {
        short_fingerprint(&self.bytes)
    }
}

/// Operator-entered fields, validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub filename: String,
    pub category: Category,
}

impl AssetMetadata {
    pub fn new(name: &str, filename: &str, category: Category) -> Result<Self, ValidationError> {
        let name = name.trim();
        let filename = filename.trim();
        if name.is_empty() {
            return Err(ValidationError {
                code: "MISSING_FIELD",
                message: "item name is required".to_string(),
            });
        }
        if filename.is_empty() {
            return Err(ValidationError {
                code: "MISSING_FIELD",
                message: "filename is required".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            filename: filename.to_string(),
            category,
        })
    }
}

/// Form state as the operator fills it in; nothing is validated until submit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDraft {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub category: Option<String>,
}

impl MetadataDraft {
    /// Draft pre-filled the way the form opens for a newly loaded file
    pub fn for_file(file: &PendingFile) -> Self {
        Self {
            name: None,
            filename: Some(file.name.clone()),
            category: None,
        }
    }

    pub fn to_metadata(&self) -> Result<AssetMetadata, ValidationError> {
        let category = match self.category.as_deref() {
            Some(c) => c.parse()?,
            None => {
                return Err(ValidationError {
                    code: "MISSING_FIELD",
                    message: "category is required".to_string(),
                });
            }
        };
        AssetMetadata::new(
            self.name.as_deref().unwrap_or_default(),
            self.filename.as_deref().unwrap_or_default(),
            category,
        )
    }
}

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Accepted { status: u16 },
    RejectedByServer { status: u16 },
    TransportFailure { reason: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted { .. })
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Accepted { status } => write!(f, "accepted ({})", status),
            SubmissionOutcome::RejectedByServer { status } => {
                write!(f, "rejected by server ({})", status)
            }
            SubmissionOutcome::TransportFailure { reason } => {
                write!(f, "transport failure: {}", reason)
            }
        }
    }
}

/// Fired once per completed form action. `outcome` is `None` when the
/// operator skipped the asset instead of submitting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionEvent {
    pub success: bool,
    pub outcome: Option<SubmissionOutcome>,
}

impl SubmissionEvent {
    pub fn from_outcome(outcome: SubmissionOutcome) -> Self {
        Self {
            success: outcome.is_accepted(),
            outcome: Some(outcome),
        }
    }

    pub fn skipped() -> Self {
        Self {
            success: false,
            outcome: None,
        }
    }
}

/// The asset currently open in the form
#[derive(Debug, Clone)]
pub struct ActiveAsset {
    pub id: AssetId,
    pub file: Arc<PendingFile>,
    /// Zero-based position in the selection
    pub index: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(" Seating ".parse::<Category>().unwrap(), Category::Seating);
    }

    #[test]
    fn test_category_rejects_unknown() {
        let err = "chairs".parse::<Category>().unwrap_err();
        assert_eq!(err.code, "INVALID_CATEGORY");
        assert!(err.message.contains("seating"));
    }

    #[test]
    fn test_pending_file_names() {
        let file = PendingFile::from_bytes("models/Chair.Big.glb", &b"glTF\x02\x00\x00\x00"[..], 1024)
            .unwrap();
        assert_eq!(file.name, "Chair.Big.glb");
        assert_eq!(file.base_name(), "Chair.Big");
        assert_eq!(file.extension(), "glb");
        assert_eq!(file.mime, "model/gltf-binary");
    }

    #[test]
    fn test_pending_file_rejects_wrong_extension() {
        let err = PendingFile::from_bytes("chair.fbx", &b"glTF"[..], 1024).unwrap_err();
        assert_eq!(err.code, "UNSUPPORTED_EXTENSION");
    }

    #[tokio::test]
    async fn test_from_path_checks_size_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chair.glb");
        let mut content = b"glTF\x02\x00\x00\x00".to_vec();
        content.resize(64, 0);
        tokio::fs::write(&path, &content).await.unwrap();

        let err = PendingFile::from_path(&path, 16).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError { code: "FILE_TOO_LARGE", .. })
        ));

        let file = PendingFile::from_path(&path, 64).await.unwrap();
        assert_eq!(file.name, "chair.glb");
        assert_eq!(file.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_draft_to_metadata() {
        let draft = MetadataDraft {
            name: Some("Chair".into()),
            filename: Some("chair.glb".into()),
            category: Some("seating".into()),
        };
        let meta = draft.to_metadata().unwrap();
        assert_eq!(meta.category, Category::Seating);

        let missing = MetadataDraft {
            category: None,
            ..draft.clone()
        };
        assert_eq!(missing.to_metadata().unwrap_err().code, "MISSING_FIELD");

        let bad = MetadataDraft {
            category: Some("garden".into()),
            ..draft
        };
        assert_eq!(bad.to_metadata().unwrap_err().code, "INVALID_CATEGORY");
    }

    #[test]
    fn test_metadata_requires_fields() {
        assert!(AssetMetadata::new("  ", "a.glb", Category::Table).is_err());
        assert!(AssetMetadata::new("A", "", Category::Table).is_err());
    }

    #[test]
    fn test_event_from_outcome() {
        let ok = SubmissionEvent::from_outcome(SubmissionOutcome::Accepted { status: 200 });
        assert!(ok.success);
        let bad = SubmissionEvent::from_outcome(SubmissionOutcome::RejectedByServer { status: 500 });
        assert!(!bad.success);
        assert_eq!(SubmissionEvent::skipped().outcome, None);
    }
}
