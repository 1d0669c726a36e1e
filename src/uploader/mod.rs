use crate::extractor;
use anyhow::{anyhow, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use tracing::{error, info};

pub fn endpoint_url(base_url: &str) -> String {
    format!("{}/upload_and_index_pdf", base_url.trim_end_matches('/'))
}

/// POST one PDF as a multipart form to the indexing service.
pub async fn upload_pdf(client: &Client, base_url: &str, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file: {}", path.display()))?
        .to_string_lossy()
        .into_owned();

    let bytes = tokio::fs::read(path).await?;
    let part = Part::bytes(bytes)
        .file_name(file_name.clone())
        .mime_str("application/pdf")?;
    let form = Form::new().part("file", part);

    let response = client
        .post(endpoint_url(base_url))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    info!("Uploading {}: {}", file_name, status);

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Upload of {} failed: {} {}", file_name, status, body));
    }

    Ok(())
}

/// Uploads every PDF in `dir`; one bad file does not abort the batch.
/// Returns `(uploaded, failed)` counts.
pub async fn upload_directory(
    client: &Client,
    base_url: &str,
    dir: &Path,
) -> Result<(usize, usize)> {
    let pdfs = extractor::list_pdfs(dir)?;
    info!("Found {} PDF files to upload", pdfs.len());

    let mut uploaded = 0;
    let mut failed = 0;
    for path in pdfs {
        match upload_pdf(client, base_url, &path).await {
            Ok(()) => uploaded += 1,
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    Ok((uploaded, failed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_tolerates_trailing_slash() {
        assert_eq!(
            endpoint_url("http://localhost:5001"),
            "http://localhost:5001/upload_and_index_pdf"
        );
        assert_eq!(
            endpoint_url("http://localhost:5001/"),
            "http://localhost:5001/upload_and_index_pdf"
        );
    }
}
