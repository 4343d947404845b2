use std::path::Path;

/// Maximum model size: 256 MB
pub const MAX_FILE_SIZE: usize = 256 * 1024 * 1024; // 256 MB

/// Extensions accepted by the file selector
pub const ACCEPTED_EXTENSIONS: &[&str] = &["glb", "gltf"];

pub const GLB_MIME: &str = "model/gltf-binary";
pub const GLTF_MIME: &str = "model/gltf+json";

/// Binary glTF container magic
const GLB_MAGIC: &[u8] = b"glTF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        });
    }
    if size > max_size {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        });
    }
    Ok(())
}

/// Returns the lowercased extension if it is one of the accepted model formats
pub fn validate_extension(filename: &str) -> Result<String, ValidationError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(ext);
    }

    Err(ValidationError {
        code: "UNSUPPORTED_EXTENSION",
        message: format!(
            "'{}' is not a supported model file. Accepted: .glb, .gltf",
            filename
        ),
    })
}

/// Sanitizes filename to prevent path traversal and injection attacks
/// Returns the sanitized filename or an error if the name is invalid
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Windows separators are not path separators on unix, normalise them first
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::debug!("Stripping directory components from {}", filename);
    }

    const RESERVED: &[char] = &[':', '*', '?', '"', '<', '>', '|', ';'];
    let mut sanitized: String = name
        .chars()
        .map(|c| if c.is_control() || RESERVED.contains(&c) { '_' } else { c })
        .collect();

    // Model names end up in multipart headers; keep them to 255 bytes
    if sanitized.len() > 255 {
        let end = (0..=255)
            .rev()
            .find(|&i| sanitized.is_char_boundary(i))
            .unwrap_or(0);
        sanitized.truncate(end);
    }

    if sanitized.starts_with('.') {
        return Err(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        });
    }

    Ok(sanitized)
}

/// Maps an accepted extension to the MIME marker sent with the model part
pub fn model_mime_for(ext: &str) -> &'static str {
    if ext.eq_ignore_ascii_case("glb") {
        GLB_MIME
    } else {
        GLTF_MIME
    }
}

/// Checks the leading bytes against the container the extension claims
pub fn verify_magic_bytes(header: &[u8], ext: &str) -> Result<(), ValidationError> {
    if header.is_empty() {
        return Err(ValidationError {
            code: "EMPTY_FILE",
            message: "File appears to be empty".to_string(),
        });
    }

    if ext.eq_ignore_ascii_case("glb") {
        if header.starts_with(GLB_MAGIC) {
            return Ok(());
        }
        return Err(ValidationError {
            code: "INVALID_MAGIC",
            message: "Binary glTF must start with the 'glTF' magic".to_string(),
        });
    }

    // JSON glTF: first non-whitespace byte opens an object (BOM tolerated)
    let body = header.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(header);
    match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Ok(()),
        _ => Err(ValidationError {
            code: "INVALID_MAGIC",
            message: "glTF JSON must start with '{'".to_string(),
        }),
    }
}

/// Full validation pipeline for a selected model file.
/// Returns the sanitized filename and the MIME marker.
pub fn validate_model_file(
    filename: &str,
    content: &[u8],
    max_size: usize,
) -> Result<(String, &'static str), ValidationError> {
    // 1. Size check
    validate_file_size(content.len(), max_size)?;

    // 2. Sanitize filename
    let sanitized = sanitize_filename(filename)?;

    // 3. Extension allowlist
    let ext = validate_extension(&sanitized)?;

    // 4. Container check
    verify_magic_bytes(&content[..content.len().min(64)], &ext)?;

    Ok((sanitized, model_mime_for(&ext)))
}
