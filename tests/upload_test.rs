mod common;

use asset_ingest::config::IngestConfig;
use asset_ingest::models::{AssetMetadata, Category, PendingFile, SubmissionOutcome, ThumbnailPayload};
use asset_ingest::services::uploader::UploadSubmitter;
use axum::http::StatusCode;
use bytes::Bytes;
use common::MockEndpoint;

fn submitter(endpoint: &str) -> UploadSubmitter {
    let config = IngestConfig {
        endpoint: endpoint.to_string(),
        request_timeout_secs: 5,
        ..IngestConfig::default()
    };
    UploadSubmitter::new(&config).unwrap()
}

fn chair() -> PendingFile {
    PendingFile::from_bytes("chair.glb", common::triangle_glb([0.0; 3]), 1024 * 1024).unwrap()
}

fn thumbnail() -> ThumbnailPayload {
    ThumbnailPayload {
        bytes: Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        mime: mime::IMAGE_PNG,
        width: 1,
        height: 1,
        asset: None,
        frame_seq: 1,
    }
}

#[tokio::test]
async fn test_upload_sends_five_literal_parts() {
    common::init_tracing();
    let endpoint = MockEndpoint::start(StatusCode::OK).await;
    let file = chair();
    let metadata = AssetMetadata::new("Chair", "chair", Category::Seating).unwrap();

    let outcome = submitter(&endpoint.url)
        .submit(&file, &metadata, &thumbnail())
        .await;
    assert_eq!(outcome, SubmissionOutcome::Accepted { status: 200 });

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    let parts = &requests[0];
    let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["item_name", "filename", "category", "thumbnail", "model"]);

    assert_eq!(parts[0].text(), "Chair");
    assert_eq!(parts[1].text(), "chair");
    assert_eq!(parts[2].text(), "seating");

    let thumb = &parts[3];
    assert_eq!(thumb.file_name.as_deref(), Some("chair"));
    assert_eq!(thumb.content_type.as_deref(), Some("image/png"));
    assert_eq!(thumb.data, thumbnail().bytes.to_vec());

    let model = &parts[4];
    assert_eq!(model.file_name.as_deref(), Some("chair.glb"));
    assert_eq!(model.content_type.as_deref(), Some("model/gltf-binary"));
    assert_eq!(model.data, file.content.to_vec());
}

#[tokio::test]
async fn test_server_rejections_are_outcomes() {
    for status in [StatusCode::BAD_REQUEST, StatusCode::INTERNAL_SERVER_ERROR] {
        let endpoint = MockEndpoint::start(status).await;
        let metadata = AssetMetadata::new("Chair", "chair", Category::Seating).unwrap();

        let outcome = submitter(&endpoint.url)
            .submit(&chair(), &metadata, &thumbnail())
            .await;
        assert_eq!(
            outcome,
            SubmissionOutcome::RejectedByServer {
                status: status.as_u16()
            }
        );
        assert_eq!(endpoint.requests().len(), 1);
    }
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let metadata = AssetMetadata::new("Chair", "chair", Category::Seating).unwrap();
    let outcome = submitter(&format!("http://{}/ims-uploader", addr))
        .submit(&chair(), &metadata, &thumbnail())
        .await;

    assert!(matches!(outcome, SubmissionOutcome::TransportFailure { .. }));
}

#[tokio::test]
async fn test_every_attempt_is_broadcast() {
    let endpoint = MockEndpoint::start(StatusCode::CREATED).await;
    let submitter = submitter(&endpoint.url);
    let mut events = submitter.subscribe();
    let metadata = AssetMetadata::new("Lamp", "lamp", Category::Lights).unwrap();

    submitter.submit(&chair(), &metadata, &thumbnail()).await;

    let event = events.recv().await.unwrap();
    assert!(event.success);
    assert_eq!(event.outcome, Some(SubmissionOutcome::Accepted { status: 201 }));
}
