use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Every PDF in `dir`, sorted for stable processing order.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| anyhow!("Failed to read directory {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_pdf(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Embedded plain text of one PDF.
pub fn extract_text(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path)
        .map_err(|e| anyhow!("Error extracting text from {}: {}", path.display(), e))
}

/// Extracts every PDF in a directory as `(file name, text)` pairs. Files
/// that fail extraction are logged and skipped.
pub fn collect_documents(dir: &Path) -> Result<Vec<(String, String)>> {
    let paths = list_pdfs(dir)?;
    info!("Found {} PDF files", paths.len());

    let mut documents = Vec::new();
    for path in paths {
        info!("Processing {}", path.display());
        match extract_text(&path) {
            Ok(text) => {
                let id = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                documents.push((id, text));
            }
            Err(e) => warn!("{}", e),
        }
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_match_is_case_insensitive() {
        assert!(is_pdf(Path::new("incident_A1.pdf")));
        assert!(is_pdf(Path::new("REPORT.PDF")));
        assert!(!is_pdf(Path::new("notes.txt")));
        assert!(!is_pdf(Path::new("archive.pdf.gz")));
        assert!(!is_pdf(Path::new("no_extension")));
    }

    #[test]
    fn non_pdf_files_are_ignored() {
        let dir = std::env::temp_dir().join(format!("traffic_rag_extract_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("readme.txt"), "not a pdf").unwrap();

        let documents = collect_documents(&dir).unwrap();
        assert!(documents.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(collect_documents(Path::new("/nonexistent/traffic_pdfs")).is_err());
    }
}
