//! Utility functions
//!
use std::{
    fs::{self, File},
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<std::path::Path>,
) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;

    let mut file = File::create(filepath)?;
    let mut content = Cursor::new(resp.bytes().await?);
    std::io::copy(&mut content, &mut file)?;

    Ok(())
}

/// Directory model files are cached in, e.g. `~/.cache/detect_server`.
pub fn model_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("detect_server"))
        .ok_or_else(|| anyhow!("no cache directory on this platform"))
}

/// Name of the file a URL points to.
pub fn file_name_of_url(url: &str) -> Option<&str> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
}

/// Return the cached copy of `url` in `cache_dir`, downloading it first if needed.
pub async fn ensure_model(client: &Client, url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let file_name = file_name_of_url(url).ok_or_else(|| anyhow!("no file name in {url}"))?;
    let filepath = cache_dir.join(file_name);

    if filepath.exists() {
        log::debug!("Using cached model {}", filepath.display());
        return Ok(filepath);
    }

    fs::create_dir_all(cache_dir)?;
    log::info!("Downloading {} to {}", url, filepath.display());

    // Partial downloads never end up under the final name
    let partial = filepath.with_extension("part");
    download_file(client, url, &partial).await?;
    fs::rename(&partial, &filepath)?;

    Ok(filepath)
}

/// Use the local file if given, otherwise the cached download of `url`.
pub async fn local_or_cached(
    client: &Client,
    path: Option<PathBuf>,
    url: Option<&str>,
    cache_dir: &Path,
) -> Result<PathBuf> {
    match (path, url) {
        (Some(path), _) => Ok(path),
        (None, Some(url)) => ensure_model(client, url, cache_dir).await,
        (None, None) => Err(anyhow!("neither a local path nor a URL was given")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_file_name_of_url() {
        assert_eq!(
            file_name_of_url("https://example.com/models/ssd_mobilenet_v1_10.onnx"),
            Some("ssd_mobilenet_v1_10.onnx")
        );
        assert_eq!(
            file_name_of_url("https://example.com/vocab.txt?download=true"),
            Some("vocab.txt")
        );
        assert_eq!(file_name_of_url("https://example.com/"), None);
    }

    #[tokio::test]
    async fn test_cached_model_is_not_downloaded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cached = dir.path().join("model.onnx");
        fs::write(&cached, b"onnx")?;

        // The URL is unroutable, so any download attempt would fail
        let path = ensure_model(&Client::new(), "http://0.0.0.0:1/model.onnx", dir.path()).await?;
        assert_eq!(path, cached);

        Ok(())
    }

    #[tokio::test]
    async fn test_local_file_wins_over_url() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let local = dir.path().join("vocab.txt");

        let path = local_or_cached(
            &Client::new(),
            Some(local.clone()),
            Some("http://0.0.0.0:1/vocab.txt"),
            dir.path(),
        )
        .await?;
        assert_eq!(path, local);

        fs::write(dir.path().join("model.onnx"), b"onnx")?;
        let path =
            local_or_cached(&Client::new(), None, Some("http://0.0.0.0:1/model.onnx"), dir.path())
                .await?;
        assert_eq!(path, dir.path().join("model.onnx"));

        assert!(local_or_cached(&Client::new(), None, None, dir.path()).await.is_err());

        Ok(())
    }
}
