//! Multipart HTTP upload to a remote store endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Body, Client, multipart};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::store::RemoteStore;
use crate::utils::http_client::build_upload_client;
use crate::{Error, Result};

/// Uploads each file as a `multipart/form-data` POST with a single `file` part.
///
/// A non-empty identity token is sent as `Authorization: Bearer <token>`.
pub struct HttpRemoteStore {
    client: Client,
    url: String,
}

impl HttpRemoteStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_upload_client(timeout),
            url: url.into(),
        }
    }
}

fn content_type_for(published_name: &str) -> &'static str {
    if published_name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if published_name.ends_with(".ts") {
        "video/mp2t"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn store(
        &self,
        file_path: &Path,
        published_name: &str,
        identity_token: &str,
    ) -> Result<()> {
        let file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| Error::io_path("opening file for upload", file_path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::io_path("reading upload file metadata", file_path, e))?
            .len();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = multipart::Part::stream_with_length(body, len)
            .file_name(published_name.to_string())
            .mime_str(content_type_for(published_name))
            .map_err(|e| Error::Publish(format!("Invalid content type: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if !identity_token.is_empty() {
            request = request.bearer_auth(identity_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Publish(format!("Upload request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "Upload of {published_name} rejected: {status} - {body}"
            )));
        }

        debug!(published_name, bytes = len, "Uploaded to remote store");
        Ok(())
    }
}
