//! Artifact retrieval, local downloads and ZIP packaging
//!
//! An artifact reference is whatever a processor returned: an `http(s)` URL,
//! a `file://` URL or a plain filesystem path. Output files are named after
//! the item's position in the batch, so a folder listing sorts the same way
//! the prompts were entered.

use crate::error::{Error, Result};
use crate::types::{ItemId, ItemStatus, WorkItem};
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

/// Result of downloading every completed item
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Files written, in batch order
    pub saved: Vec<(ItemId, PathBuf)>,
    /// Items whose artifact could not be fetched or written
    pub failed: Vec<(ItemId, String)>,
}

/// Read the bytes behind an artifact reference
pub async fn fetch_bytes(reference: &str) -> Result<Vec<u8>> {
    let reference = reference.trim();

    if reference.starts_with("http://") || reference.starts_with("https://") {
        let response = reqwest::get(reference).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: format!("fetching {reference}"),
            });
        }
        return Ok(response.bytes().await?.to_vec());
    }

    if reference.starts_with("file://") {
        let url = Url::parse(reference)
            .map_err(|e| Error::NotSupported(format!("invalid file URL {reference}: {e}")))?;
        let path = url
            .to_file_path()
            .map_err(|_| Error::NotSupported(format!("not a local file URL: {reference}")))?;
        return Ok(tokio::fs::read(path).await?);
    }

    if let Some((scheme, _)) = reference.split_once("://") {
        return Err(Error::NotSupported(format!(
            "artifact scheme '{scheme}' is not supported"
        )));
    }

    Ok(tokio::fs::read(reference).await?)
}

/// File name for the item at 1-based `position`
pub fn output_name(position: usize, item: &WorkItem) -> String {
    format!("video_{position:02}_{}.mp4", item.id)
}

/// Download one item's artifact into `folder`
pub async fn download_item(item: &WorkItem, position: usize, folder: &Path) -> Result<PathBuf> {
    let artifact = item.artifact.as_deref().ok_or_else(|| Error::InvalidState {
        operation: "download".to_string(),
        state: format!("item {} has no artifact", item.id),
    })?;

    tokio::fs::create_dir_all(folder).await?;
    let bytes = fetch_bytes(artifact).await?;
    let dest = folder.join(output_name(position, item));
    tokio::fs::write(&dest, &bytes).await?;

    tracing::info!(
        item_id = %item.id,
        path = %dest.display(),
        bytes = bytes.len(),
        "artifact saved"
    );
    Ok(dest)
}

/// Download every completed item of `items` (given in batch order)
///
/// Failures are collected per item; one broken link does not stop the rest.
pub async fn download_completed(items: &[WorkItem], folder: &Path) -> DownloadReport {
    let mut report = DownloadReport::default();
    for (idx, item) in items.iter().enumerate() {
        if item.status != ItemStatus::Completed || item.artifact.is_none() {
            continue;
        }
        match download_item(item, idx + 1, folder).await {
            Ok(path) => report.saved.push((item.id, path)),
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "artifact download failed");
                report.failed.push((item.id, e.to_string()));
            }
        }
    }
    report
}

/// Write every completed artifact of `items` into a ZIP archive at `dest`
///
/// Entries are named with [`output_name`]. Items whose artifact cannot be
/// fetched are skipped. Returns the number of entries written.
pub async fn package_zip(items: &[WorkItem], dest: &Path) -> Result<usize> {
    let mut entries = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        let Some(artifact) = item.artifact.as_deref() else {
            continue;
        };
        if item.status != ItemStatus::Completed {
            continue;
        }
        match fetch_bytes(artifact).await {
            Ok(bytes) => entries.push((output_name(idx + 1, item), bytes)),
            Err(e) => {
                tracing::warn!(item_id = %item.id, error = %e, "skipping artifact in archive");
            }
        }
    }

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let dest = dest.to_path_buf();
    let count = entries.len();
    tokio::task::spawn_blocking(move || write_zip(&dest, entries))
        .await
        .map_err(|e| Error::Other(format!("zip task failed: {e}")))??;

    tracing::info!(entries = count, "archive written");
    Ok(count)
}

fn write_zip(dest: &Path, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
    let file = std::fs::File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    // Video is already compressed
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (name, bytes) in entries {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }
    zip.finish()?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptPayload;
    use tempfile::tempdir;

    fn completed(id: u64, artifact: &Path) -> WorkItem {
        let mut item = WorkItem::new(ItemId(id), PromptPayload::new("p"), "pt".to_string());
        item.status = ItemStatus::Completed;
        item.artifact = Some(artifact.display().to_string());
        item
    }

    #[test]
    fn output_names_follow_position() {
        let item = WorkItem::new(ItemId(17), PromptPayload::new("p"), "pt".to_string());
        assert_eq!(output_name(3, &item), "video_03_17.mp4");
        assert_eq!(output_name(12, &item), "video_12_17.mp4");
    }

    #[tokio::test]
    async fn fetches_plain_paths_and_file_urls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"frames").unwrap();

        assert_eq!(fetch_bytes(path.to_str().unwrap()).await.unwrap(), b"frames");
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(fetch_bytes(url.as_str()).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn unknown_scheme_is_not_supported() {
        let err = fetch_bytes("ftp://example.com/a.mp4").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn download_completed_skips_unfinished_and_reports_failures() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.mp4");
        std::fs::write(&src, b"aaa").unwrap();
        let out = dir.path().join("out");

        let mut pending = WorkItem::new(ItemId(2), PromptPayload::new("p"), "pt".to_string());
        pending.artifact = Some(src.display().to_string());
        let items = vec![
            completed(1, &src),
            pending,
            completed(3, &dir.path().join("missing.mp4")),
        ];

        let report = download_completed(&items, &out).await;
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.saved[0].1, out.join("video_01_1.mp4"));
        assert_eq!(std::fs::read(&report.saved[0].1).unwrap(), b"aaa");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ItemId(3));
    }

    #[tokio::test]
    async fn download_item_without_artifact_fails() {
        let dir = tempdir().unwrap();
        let item = WorkItem::new(ItemId(1), PromptPayload::new("p"), "pt".to_string());
        let err = download_item(&item, 1, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn package_zip_uses_order_based_names() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"first").unwrap();
        std::fs::write(&b, b"second").unwrap();

        let items = vec![completed(4, &a), completed(9, &b)];
        let dest = dir.path().join("bundle").join("videos.zip");
        assert_eq!(package_zip(&items, &dest).await.unwrap(), 2);

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, ["video_01_4.mp4", "video_02_9.mp4"]);

        let mut entry = archive.by_name("video_02_9.mp4").unwrap();
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
        assert_eq!(content, b"second");
    }
}
