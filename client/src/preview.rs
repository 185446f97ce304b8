use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::backend::BackendResult;
use crate::gameplay::PreviewSink;

/// Turns captured frames into the image string the GIF server stores
/// (a base64 GIF).
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frames: &[Vec<u8>]) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct InsertGif<'a> {
    gameplay_id: &'a str,
    gif: &'a str,
}

/// Client for the preview GIF service.
#[derive(Debug, Clone)]
pub struct GifServerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GifServerClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    /// Preview images for `tape_ids`, in the same order.
    pub async fn gifs(&self, tape_ids: &[String]) -> BackendResult<Vec<String>> {
        let response = self
            .http
            .post(self.endpoint("gifs")?)
            .json(tape_ids)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn insert_gif(&self, gameplay_id: &str, gif: &str) -> BackendResult<()> {
        self.http
            .post(self.endpoint("insert-gif")?)
            .json(&InsertGif { gameplay_id, gif })
            .send()
            .await?
            .error_for_status()?;
        debug!("stored preview for {}", gameplay_id);
        Ok(())
    }
}

/// Encodes the captured frames and uploads them under the tape id.
pub struct GifPreviewSink<E> {
    client: GifServerClient,
    encoder: E,
}

impl<E: FrameEncoder> GifPreviewSink<E> {
    pub fn new(client: GifServerClient, encoder: E) -> Self {
        Self { client, encoder }
    }
}

#[async_trait]
impl<E: FrameEncoder> PreviewSink for GifPreviewSink<E> {
    async fn submit(&self, tape_id: &str, frames: Vec<Vec<u8>>) -> anyhow::Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let gif = self.encoder.encode(&frames).context("encoding preview frames")?;
        self.client
            .insert_gif(tape_id, &gif)
            .await
            .with_context(|| format!("uploading preview for {}", tape_id))
    }
}
