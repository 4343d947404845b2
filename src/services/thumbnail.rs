use crate::error::IngestError;
use crate::models::{AssetId, ThumbnailPayload};
use crate::services::scene::Viewport;
use bytes::Bytes;
use image::{ImageFormat, RgbaImage};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Encodes the viewport's current frame as a PNG thumbnail
#[derive(Debug, Clone, Default)]
pub struct ThumbnailCapturer {
    /// Downscale to fit within this edge, preserving aspect ratio
    max_size: Option<u32>,
}

impl ThumbnailCapturer {
    pub fn new(max_size: Option<u32>) -> Self {
        Self { max_size }
    }

    pub fn capture(&self, viewport: &dyn Viewport) -> Result<ThumbnailPayload, IngestError> {
        let frame = viewport
            .current_frame()
            .ok_or_else(|| IngestError::Capture("no frame has been rendered yet".into()))?;

        let image = RgbaImage::from_raw(frame.width, frame.height, frame.pixels.to_vec())
            .ok_or_else(|| IngestError::Capture("frame buffer does not match its dimensions".into()))?;
        let image = image::DynamicImage::ImageRgba8(image);
        let image = match self.max_size {
            Some(max) if frame.width > max || frame.height > max => image.thumbnail(max, max),
            _ => image,
        };

        let mut out = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| IngestError::Capture(format!("failed to encode PNG: {}", e)))?;

        let payload = ThumbnailPayload {
            bytes: Bytes::from(out),
            mime: mime::IMAGE_PNG,
            width: image.width(),
            height: image.height(),
            asset: frame.asset,
            frame_seq: frame.seq,
        };
        debug!(
            "📸 Captured frame #{} as {}x{} PNG ({} bytes, {})",
            payload.frame_seq,
            payload.width,
            payload.height,
            payload.bytes.len(),
            payload.fingerprint()
        );
        Ok(payload)
    }
}

/// Single last-write-wins holder for the next submission's thumbnail
#[derive(Debug, Default)]
pub struct ThumbnailSlot {
    inner: Mutex<Option<ThumbnailPayload>>,
}

impl ThumbnailSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ThumbnailPayload>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a capture, returning the unconsumed one it replaced
    pub fn store(&self, payload: ThumbnailPayload) -> Option<ThumbnailPayload> {
        self.lock().replace(payload)
    }

    pub fn take(&self) -> Option<ThumbnailPayload> {
        self.lock().take()
    }

    /// Puts back a capture that was taken but not consumed. A capture stored
    /// in the meantime is newer and stays.
    pub fn restore(&self, payload: ThumbnailPayload) {
        let mut held = self.lock();
        if held.is_none() {
            *held = Some(payload);
        }
    }

    /// Asset shown by the held capture, if any
    #[cfg(test)]
    pub fn held_asset(&self) -> Option<Option<AssetId>> {
        self.lock().as_ref().map(|p| p.asset)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scene::{Mesh, RenderContext, SceneObject, ViewportSettings};

    fn viewport() -> RenderContext {
        RenderContext::new(ViewportSettings::with_size(48))
    }

    fn quad() -> SceneObject {
        SceneObject::new(
            "quad",
            vec![Mesh {
                positions: vec![
                    [-0.5, 0.0, 0.0],
                    [0.5, 0.0, 0.0],
                    [0.5, 1.0, 0.0],
                    [-0.5, 1.0, 0.0],
                ],
                indices: vec![0, 1, 2, 0, 2, 3],
                color: [250, 250, 250],
            }],
        )
    }

    #[test]
    fn test_capture_without_frame_fails() {
        let err = ThumbnailCapturer::default().capture(&viewport()).unwrap_err();
        assert!(matches!(err, IngestError::Capture(_)));
    }

    #[test]
    fn test_capture_is_png() {
        let vp = viewport();
        vp.render();
        let payload = ThumbnailCapturer::default().capture(&vp).unwrap();
        assert!(payload.bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
        assert_eq!(payload.mime, mime::IMAGE_PNG);
        assert_eq!((payload.width, payload.height), (48, 48));

        let decoded = image::load_from_memory(&payload.bytes).unwrap();
        assert_eq!(decoded.width(), 48);
    }

    #[test]
    fn test_capture_deterministic_without_rerender() {
        let vp = viewport();
        let id = AssetId::new();
        vp.attach(id, quad()).unwrap();
        vp.render();

        let capturer = ThumbnailCapturer::default();
        let a = capturer.capture(&vp).unwrap();
        let b = capturer.capture(&vp).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.frame_seq, b.frame_seq);
        assert!(a.is_of(id));
    }

    #[test]
    fn test_capture_downscales() {
        let vp = viewport();
        vp.render();
        let payload = ThumbnailCapturer::new(Some(16)).capture(&vp).unwrap();
        assert_eq!((payload.width, payload.height), (16, 16));
    }

    #[test]
    fn test_slot_last_write_wins() {
        let vp = viewport();
        let capturer = ThumbnailCapturer::default();
        let slot = ThumbnailSlot::new();

        vp.render();
        let first = capturer.capture(&vp).unwrap();
        assert!(slot.store(first.clone()).is_none());

        let id = AssetId::new();
        vp.attach(id, quad()).unwrap();
        vp.render();
        let second = capturer.capture(&vp).unwrap();

        assert_eq!(slot.store(second.clone()), Some(first));
        assert_eq!(slot.held_asset(), Some(Some(id)));
        assert_eq!(slot.take(), Some(second));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_restore_does_not_override_newer_capture() {
        let vp = viewport();
        let capturer = ThumbnailCapturer::default();
        let slot = ThumbnailSlot::new();

        vp.render();
        let first = capturer.capture(&vp).unwrap();
        slot.store(first.clone());
        let taken = slot.take().unwrap();
        slot.restore(taken);
        assert_eq!(slot.held_asset(), Some(None));

        let taken = slot.take().unwrap();
        let id = AssetId::new();
        vp.attach(id, quad()).unwrap();
        vp.render();
        slot.store(capturer.capture(&vp).unwrap());
        slot.restore(taken);
        assert_eq!(slot.held_asset(), Some(Some(id)));
    }
}
