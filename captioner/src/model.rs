//! Whisper model cache.

use std::io::Write;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Model;
use crate::error::{Error, Result};

const MODEL_REPOSITORY: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Anything smaller is an error page, not a ggml model.
const MIN_MODEL_BYTES: u64 = 1_000_000;

/// Path of a usable model file, downloading into `cache_dir` on first use.
pub async fn ensure_model(model: &Model, cache_dir: &Path) -> Result<PathBuf> {
    if let Model::Custom(path) = model {
        return if path.is_file() {
            Ok(path.clone())
        } else {
            Err(Error::ModelNotFound { path: path.clone() })
        };
    }

    let model_path = cache_dir.join(model.filename());
    if model_path.is_file() {
        info!(path = %model_path.display(), "model already cached");
        return Ok(model_path);
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| {
        Error::Model(format!("failed to create cache dir {}: {e}", cache_dir.display()))
    })?;

    let url = format!("{MODEL_REPOSITORY}/{}", model.filename());
    info!(%url, "downloading model");
    download_model(&url, &model_path).await?;
    Ok(model_path)
}

async fn download_model(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::ModelDownload(format!("HTTP error: {e}")))?;

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {}", file_label(dest)));

    let part = part_path(dest);
    let result = stream_to(response, &part, &pb).await;
    let file_size = match result {
        Ok(size) => size,
        Err(e) => {
            std::fs::remove_file(&part).ok();
            pb.abandon_with_message("Download failed");
            return Err(e);
        }
    };

    if file_size < MIN_MODEL_BYTES {
        std::fs::remove_file(&part).ok();
        pb.abandon_with_message("Download failed");
        return Err(Error::ModelDownload(format!(
            "downloaded file too small ({file_size} bytes); likely an error page"
        )));
    }

    std::fs::rename(&part, dest)?;
    pb.finish_with_message("Download complete");

    if total_size > 0 && file_size != total_size {
        warn!(
            expected = total_size,
            actual = file_size,
            "file size mismatch, model may be corrupt"
        );
    }

    info!(path = %dest.display(), size = file_size, "model saved");
    Ok(())
}

async fn stream_to(response: reqwest::Response, part: &Path, pb: &ProgressBar) -> Result<u64> {
    let mut file = std::fs::File::create(part)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;
    Ok(downloaded)
}

/// `ggml-tiny.bin` downloads into `ggml-tiny.bin.part`.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Cached ggml files, sorted by name. Unfinished `.part` downloads are left out.
pub fn list_cached_models(cache_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut models: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
        .collect();
    models.sort();
    models
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_list_cached_models_skips_partials_and_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("ggml-tiny.bin"), b"fake model").unwrap();
        fs::write(tmp.path().join("ggml-base.bin"), b"fake model").unwrap();
        fs::write(tmp.path().join("ggml-small.bin.part"), b"partial").unwrap();
        fs::write(tmp.path().join("readme.txt"), b"not a model").unwrap();

        let names: Vec<String> = list_cached_models(tmp.path())
            .iter()
            .map(|p| file_label(p))
            .collect();
        assert_eq!(names, ["ggml-base.bin", "ggml-tiny.bin"]);
    }

    #[test]
    fn test_list_cached_models_missing_dir() {
        assert!(list_cached_models(Path::new("/nonexistent/models")).is_empty());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/cache/ggml-large-v3-turbo.bin")),
            PathBuf::from("/cache/ggml-large-v3-turbo.bin.part")
        );
    }

    #[tokio::test]
    async fn test_custom_model_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tmp.path().join("my-model.bin");
        fs::write(&custom, b"weights").unwrap();

        let found = ensure_model(&Model::Custom(custom.clone()), Path::new("/unused")).await.unwrap();
        assert_eq!(found, custom);

        let missing = Model::Custom(tmp.path().join("gone.bin"));
        let err = ensure_model(&missing, Path::new("/unused")).await.unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cached_model_is_not_downloaded_again() {
        let tmp = tempfile::tempdir().unwrap();
        let cached = tmp.path().join("ggml-tiny.bin");
        fs::write(&cached, b"fake cached model").unwrap();

        assert_eq!(ensure_model(&Model::Tiny, tmp.path()).await.unwrap(), cached);
    }
}
