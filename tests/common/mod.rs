#![allow(dead_code)]

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl ReceivedPart {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.data).unwrap()
    }
}

#[derive(Clone)]
struct EndpointState {
    requests: Arc<Mutex<Vec<Vec<ReceivedPart>>>>,
    status: StatusCode,
    delay: Duration,
}

async fn ingest(State(state): State<EndpointState>, mut multipart: Multipart) -> StatusCode {
    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            data,
        });
    }
    state.requests.lock().unwrap().push(parts);
    tokio::time::sleep(state.delay).await;
    state.status
}

/// In-process ingestion endpoint answering every upload with `status`
pub struct MockEndpoint {
    pub url: String,
    requests: Arc<Mutex<Vec<Vec<ReceivedPart>>>>,
}

impl MockEndpoint {
    pub async fn start(status: StatusCode) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    /// Records each upload on arrival but answers only after `delay`
    pub async fn start_with_delay(status: StatusCode, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = EndpointState {
            requests: requests.clone(),
            status,
            delay,
        };
        let app = Router::new()
            .route("/ims-uploader", post(ingest))
            .layer(DefaultBodyLimit::disable())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/ims-uploader", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Vec<ReceivedPart>> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// Binary glTF holding one triangle, moved by `translation`
pub fn triangle_glb(translation: [f32; 3]) -> Vec<u8> {
    let bin: Vec<u8> = [-0.5f32, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 1.0, 0.0]
        .iter()
        .flat_map(|f| f.to_le_bytes())
        .collect();
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],
"nodes":[{{"mesh":0,"translation":[{},{},{}]}}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}}}}]}}],
"buffers":[{{"byteLength":36}}],
"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}}],
"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[-0.5,0.0,0.0],"max":[0.5,1.0,0.0]}}]}}"#,
        translation[0], translation[1], translation[2]
    );

    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}
