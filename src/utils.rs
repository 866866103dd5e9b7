use std::{env, path::Path};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to download {url}: {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Invalid GITHUB_TOKEN format")]
    InvalidToken,
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

async fn download_file(url: &str, path: &Path) -> Result<(), DownloadError> {
    tracing::info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| DownloadError::InvalidToken)?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let request_error = |source| DownloadError::Request {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .map_err(request_error)?;

    if !response.status().is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let bytes = response.bytes().await.map_err(request_error)?;

    let write_error = |source| DownloadError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    fs::write(path, bytes).await.map_err(write_error)?;
    Ok(())
}

/// Fetches the classifier artifact when it is missing locally and a source URL is known.
pub async fn ensure_model_exists(model_path: &Path, model_url: Option<&str>) -> Result<(), DownloadError> {
    tracing::info!("Checking model...");
    if model_path.exists() {
        return Ok(());
    }

    match model_url {
        Some(url) => download_file(url, model_path).await,
        None => {
            tracing::warn!(
                "Model artifact {} not found and MODEL_URL is not set",
                model_path.display()
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_artifact_is_left_alone() {
        let path = env::temp_dir().join(format!("leaf-model-{}.pb", std::process::id()));
        std::fs::write(&path, b"graph").unwrap();

        ensure_model_exists(&path, Some("http://127.0.0.1:1/unused"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"graph");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn missing_artifact_without_url_is_not_an_error() {
        let path = env::temp_dir().join("leaf-model-never-created.pb");
        ensure_model_exists(&path, None).await.unwrap();
        assert!(!path.exists());
    }
}
