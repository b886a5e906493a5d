//! Shared setup for integration tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use poetry_family::config::{ApiKey, EnrichmentConfig};
use poetry_family::db::{MemoryStore, PoetryStore};
use poetry_family::models::poetry::{NewPoetry, PoetryRecord};
use poetry_family::services::enrichment::{EnrichmentPipeline, WorkerReport};
use poetry_family::services::storage::LocalImageStore;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;
use wiremock::{MockServer, ResponseTemplate};

pub const CHAT_PATH: &str = "/v1/chat/completions";
pub const IMAGE_PATH: &str = "/v1/images/generations";
pub const ARTWORK_PATH: &str = "/files/artwork.png";

/// A pipeline over an in-memory store and a temporary upload directory,
/// with its worker running in the background.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub images: Arc<LocalImageStore>,
    pub enrichment: EnrichmentPipeline,
    pub upload_dir: TempDir,
    stop: oneshot::Sender<()>,
    worker: JoinHandle<WorkerReport>,
}

impl Harness {
    pub fn start(config: EnrichmentConfig) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let images = Arc::new(LocalImageStore::new(upload_dir.path()));
        let (enrichment, worker) =
            EnrichmentPipeline::new(&config, store.clone(), images.clone()).unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let worker = tokio::spawn(worker.run(async move {
            let _ = stopped.await;
        }));

        Self {
            store,
            images,
            enrichment,
            upload_dir,
            stop,
            worker,
        }
    }

    /// Stop the worker after every accepted job has finished.
    pub async fn shutdown(self) -> (WorkerReport, Arc<MemoryStore>, TempDir) {
        let _ = self.stop.send(());
        let report = tokio::time::timeout(Duration::from_secs(10), self.worker)
            .await
            .expect("worker did not drain in time")
            .unwrap();
        (report, self.store, self.upload_dir)
    }

    pub async fn poem(&self, id: Uuid) -> Option<PoetryRecord> {
        self.store.find_poetry(id).await.unwrap()
    }

    /// Poll until `done` holds for the poem or fail after a few seconds.
    pub async fn wait_for<F>(&self, id: Uuid, done: F) -> PoetryRecord
    where
        F: Fn(&PoetryRecord) -> bool,
    {
        for _ in 0..200 {
            if let Some(record) = self.poem(id).await {
                if done(&record) {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("poem {id} never reached the expected state");
    }
}

/// Both gateway endpoints pointed at the mock server.
pub fn gateway_config(server: &MockServer) -> EnrichmentConfig {
    EnrichmentConfig {
        verify_credential: Some(ApiKey::new("test-text-key")),
        verify_url: format!("{}{CHAT_PATH}", server.uri()),
        verify_timeout: Duration::from_secs(2),
        image_credential: Some(ApiKey::new("test-image-key")),
        image_url: format!("{}{IMAGE_PATH}", server.uri()),
        image_timeout: Duration::from_secs(2),
        ..EnrichmentConfig::default()
    }
}

pub fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    }))
}

pub fn image_created(url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "url": url }] }))
}

/// A real 2x2 PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 30, 30]));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

pub fn new_poem(images: Vec<String>) -> NewPoetry {
    NewPoetry {
        title: "静夜思".into(),
        author: "李白".into(),
        dynasty: "唐".into(),
        content: "床前明月光，疑似地上霜。举头望明月，低头思故乡。".into(),
        tags: vec!["思乡".into()],
        images,
        created_by: Uuid::new_v4(),
    }
}

/// Number of regular files anywhere under `dir`.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
