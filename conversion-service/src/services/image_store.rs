use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Directory of extracted images served under `/images/{name}`.
///
/// Images outlive the request that produced them so clients can fetch them
/// after reading the JSON response.
pub struct ImageStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl ImageStore {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.base_path
    }

    /// Store `data` under a fresh name and return that name.
    pub async fn save(&self, data: &[u8], extension: &str) -> Result<String, AppError> {
        let name = format!("{}.{}", Uuid::new_v4(), extension);
        fs::write(self.base_path.join(&name), data).await?;
        Ok(name)
    }

    /// Copy an image file produced by the converter and return its new name.
    pub async fn copy_from(&self, source: &Path, extension: &str) -> Result<String, AppError> {
        let name = format!("{}.{}", Uuid::new_v4(), extension);
        fs::copy(source, self.base_path.join(&name)).await?;
        Ok(name)
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/images/{}", self.public_base_url, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_directory_and_saves_under_unique_names() {
        let root = tempfile::tempdir().unwrap();
        let store = ImageStore::new(root.path().join("images"), "")
            .await
            .unwrap();

        let first = store.save(b"png-bytes", "png").await.unwrap();
        let second = store.save(b"png-bytes", "png").await.unwrap();

        assert_ne!(first, second);
        assert!(first.ends_with(".png"));
        assert_eq!(
            std::fs::read(store.dir().join(&first)).unwrap(),
            b"png-bytes"
        );
        assert_eq!(store.url_for(&first), format!("/images/{}", first));
    }

    #[tokio::test]
    async fn copies_converter_files_and_prefixes_public_url() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("figure.jpg");
        std::fs::write(&source, b"jpeg").unwrap();

        let store = ImageStore::new(root.path().join("images"), "https://docs.example.com")
            .await
            .unwrap();
        let name = store.copy_from(&source, "jpg").await.unwrap();

        assert!(store.dir().join(&name).exists());
        assert!(source.exists());
        assert_eq!(
            store.url_for(&name),
            format!("https://docs.example.com/images/{}", name)
        );
    }
}
