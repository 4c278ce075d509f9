use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::rma::Evidence;
use crate::workflow::TransitionError;

/// Public prefix under which stored documents are served
pub const UPLOADS_ROUTE: &str = "/uploads";

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist an uploaded document for `rma_id` and return its reference
    async fn store(&self, rma_id: Uuid, filename: &str, data: Vec<u8>) -> AppResult<Evidence>;

    /// Delete a document returned by `store` that no record ended up pointing to
    async fn remove(&self, evidence: &Evidence) -> AppResult<()>;
}

pub struct LocalEvidenceStore {
    base_path: PathBuf,
}

impl LocalEvidenceStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> AppResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await.map_err(|err| {
            AppError::configuration(format!("cannot create upload dir {}: {err}", base_path.display()))
        })?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Map a `/uploads/<rma>/<file>` reference back onto the disk
    fn path_of(&self, evidence: &Evidence) -> AppResult<PathBuf> {
        let relative = evidence
            .url
            .strip_prefix(UPLOADS_ROUTE)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| AppError::internal(format!("{} is not a local upload", evidence.url)))?;

        let mut parts = relative.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(rma), Some(file), None) if Uuid::parse_str(rma).is_ok() && !file.is_empty() && !file.starts_with('.') => {
                Ok(self.base_path.join(rma).join(file))
            }
            _ => Err(AppError::internal(format!("{} is not a local upload", evidence.url))),
        }
    }
}

#[async_trait]
impl EvidenceStore for LocalEvidenceStore {
    async fn store(&self, rma_id: Uuid, filename: &str, data: Vec<u8>) -> AppResult<Evidence> {
        let original = sanitize_filename(filename)?;
        let stored_name = format!("{}-{}", Uuid::new_v4().simple(), original);

        let dir = self.base_path.join(rma_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| AppError::internal(format!("cannot create {}: {err}", dir.display())))?;

        let path = dir.join(&stored_name);
        fs::write(&path, &data)
            .await
            .map_err(|err| AppError::internal(format!("cannot write {}: {err}", path.display())))?;

        tracing::info!(%rma_id, filename = %original, bytes = data.len(), "evidence stored");

        Ok(Evidence::new(
            original,
            format!("{UPLOADS_ROUTE}/{rma_id}/{stored_name}"),
        ))
    }

    async fn remove(&self, evidence: &Evidence) -> AppResult<()> {
        let path = self.path_of(evidence)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(url = %evidence.url, "orphaned evidence removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::internal(format!("cannot remove {}: {err}", path.display()))),
        }
    }
}

/// Keep the last path component, replace anything outside `[A-Za-z0-9._-]`,
/// and accept PDFs only
pub fn sanitize_filename(filename: &str) -> Result<String, TransitionError> {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        return Err(TransitionError::ValidationError("uploaded file needs a name".to_string()));
    }

    if !cleaned.to_ascii_lowercase().ends_with(".pdf") {
        return Err(TransitionError::ValidationError(format!(
            "only PDF documents are accepted, got {cleaned}"
        )));
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/quote 01.pdf").unwrap(), "quote_01.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\Cotización.PDF").unwrap(), "Cotizaci_n.PDF");
    }

    #[test]
    fn sanitize_rejects_non_pdf_and_empty_names() {
        assert!(sanitize_filename("invoice.docx").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }

    #[tokio::test]
    async fn local_store_writes_under_rma_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalEvidenceStore::new(dir.path().join("uploads")).await.unwrap();
        let rma_id = Uuid::new_v4();

        let evidence = store.store(rma_id, "quote.pdf", b"%PDF-1.4".to_vec()).await.unwrap();

        assert_eq!(evidence.filename, "quote.pdf");
        assert!(evidence.url.starts_with(&format!("/uploads/{rma_id}/")));
        assert!(evidence.is_well_formed());

        let stored = evidence.url.rsplit('/').next().unwrap();
        let on_disk = store.base_path().join(rma_id.to_string()).join(stored);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"%PDF-1.4");

        store.remove(&evidence).await.unwrap();
        assert!(!on_disk.exists());
        // already gone is fine
        store.remove(&evidence).await.unwrap();
    }

    #[tokio::test]
    async fn remove_refuses_foreign_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalEvidenceStore::new(dir.path().join("uploads")).await.unwrap();

        for url in ["https://cdn.example.com/a.pdf", "/uploads/../../etc/passwd", "/uploads/not-a-uuid/a.pdf"] {
            let err = store.remove(&Evidence::new("a.pdf", url)).await.unwrap_err();
            assert!(matches!(err, AppError::Internal(_)), "{url}: {err:?}");
        }
    }
}
