//! The `review-images` bucket on local disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use tracing::{info, warn};
use yadori_db::queries::{images, reviews};
use yadori_db::DbError;
use yadori_types::events::{RowChange, Table};
use yadori_types::review::{ImageSet, ImageUpload, ReviewImage};
use yadori_types::{ErrorKind, ReviewId, ValidationError, REVIEW_IMAGE_BUCKET};

use crate::realtime::record;
use crate::DaemonState;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to write {file_name}: {source}")]
    Write {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(_) => ErrorKind::Validation,
            StorageError::Write { .. } | StorageError::Task(_) => ErrorKind::Internal,
            StorageError::Db(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Image files under `{data_dir}/review-images/`, served elsewhere under
/// `{public_base_url}/review-images/`.
#[derive(Debug, Clone)]
pub struct ImageBucket {
    root: PathBuf,
    public_base_url: String,
    /// Held from the limit check until the last row is written.
    uploads: Arc<Mutex<()>>,
}

impl ImageBucket {
    pub fn new(data_dir: &Path, public_base_url: &str) -> Self {
        Self {
            root: data_dir.join(REVIEW_IMAGE_BUCKET),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            uploads: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize uploads so the per-review count cannot change between the
    /// check and the insert.
    pub async fn lock_uploads(&self) -> MutexGuard<'_, ()> {
        self.uploads.lock().await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{millis}_{reviewId}_{index}.{ext}`
    pub fn file_name(review_id: ReviewId, index: usize, extension: &str, millis: u64) -> String {
        format!("{millis}_{review_id}_{index}.{extension}")
    }

    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{REVIEW_IMAGE_BUCKET}/{file_name}", self.public_base_url)
    }

    /// Write every upload concurrently, numbering files from `first_index`.
    /// Results come back in upload order, each the stored file name or why
    /// it was not stored.
    pub async fn write_all(
        &self,
        review_id: ReviewId,
        uploads: Vec<ImageUpload>,
        first_index: usize,
        millis: u64,
    ) -> Vec<Result<String>> {
        if let Err(source) = tokio::fs::create_dir_all(&self.root).await {
            let file_name = self.root.display().to_string();
            return uploads
                .iter()
                .map(|_| {
                    Err(StorageError::Write {
                        file_name: file_name.clone(),
                        source: std::io::Error::new(source.kind(), source.to_string()),
                    })
                })
                .collect();
        }

        let handles: Vec<_> = uploads
            .into_iter()
            .enumerate()
            .map(|(offset, upload)| {
                let index = first_index + offset;
                let file_name = Self::file_name(review_id, index, &upload.extension(), millis);
                let path = self.root.join(&file_name);
                tokio::spawn(async move {
                    match tokio::fs::write(&path, &upload.bytes).await {
                        Ok(()) => Ok(file_name),
                        Err(source) => Err(StorageError::Write { file_name, source }),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(StorageError::Task(e.to_string())),
            });
        }
        results
    }
}

/// Attach photos to a review the caller owns.
///
/// Ownership and the per-review limit are checked before anything is
/// written, and the store rechecks the limit on every row. Files that were
/// written stay written and get their rows even when a sibling fails; the
/// first failure is then returned. A file whose row is refused is removed.
pub async fn upload_review_images(
    state: &DaemonState,
    user_id: &str,
    review_id: ReviewId,
    uploads: Vec<ImageUpload>,
) -> Result<Vec<ReviewImage>> {
    if uploads.is_empty() {
        return Err(ValidationError::Required("images").into());
    }

    let _uploading = state.bucket.lock_uploads().await;
    let existing = {
        let conn = state.db.lock().await;
        reviews::get_owned(&conn, review_id, user_id)?;
        images::count_for_review(&conn, review_id)?
    };

    let max_bytes = state.config.storage.max_image_bytes;
    let mut set = ImageSet::with_existing(existing);
    for upload in uploads {
        if upload.bytes.len() > max_bytes {
            return Err(ValidationError::ImageTooLarge(max_bytes).into());
        }
        set.try_add(upload)?;
    }

    let results = state
        .bucket
        .write_all(review_id, set.into_uploads(), existing, yadori_types::now_millis())
        .await;

    let mut attached = Vec::new();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(file_name) => {
                let url = state.bucket.public_url(&file_name);
                let inserted = {
                    let conn = state.db.lock().await;
                    images::insert(&conn, review_id, &url, yadori_types::now_secs())
                };
                match inserted {
                    Ok(image) => {
                        state
                            .feed
                            .emit(RowChange::insert(Table::ReviewImages, record(&image)));
                        attached.push(image);
                    }
                    Err(e) => {
                        let path = state.bucket.root().join(&file_name);
                        if let Err(io) = tokio::fs::remove_file(&path).await {
                            warn!(file = %file_name, error = %io, "orphaned image not removed");
                        }
                        first_error.get_or_insert(StorageError::Db(e));
                    }
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => {
            warn!(
                review_id,
                committed = attached.len(),
                error = %e,
                "image upload partially failed"
            );
            Err(e)
        }
        None => {
            info!(review_id, count = attached.len(), "images uploaded");
            Ok(attached)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "yadori-storage-{label}-{}",
            crate::realtime::new_subscription_id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    #[test]
    fn test_file_name_and_url() {
        assert_eq!(
            ImageBucket::file_name(42, 3, "jpg", 1_700_000_000_123),
            "1700000000123_42_3.jpg"
        );
        let bucket = ImageBucket::new(Path::new("/data"), "https://cdn.example.jp/storage/");
        assert_eq!(bucket.root(), Path::new("/data/review-images"));
        assert_eq!(
            bucket.public_url("1_2_0.png"),
            "https://cdn.example.jp/storage/review-images/1_2_0.png"
        );
    }

    #[tokio::test]
    async fn test_write_all_in_order() {
        let dir = temp_dir("write");
        let bucket = ImageBucket::new(&dir, "http://localhost");
        let results = bucket
            .write_all(9, vec![png("a.png"), png("b"), png("c.PNG")], 0, 555)
            .await;

        let names: Vec<String> = results.into_iter().map(|r| r.expect("written")).collect();
        assert_eq!(names, vec!["555_9_0.png", "555_9_1.png", "555_9_2.png"]);
        for name in &names {
            let bytes = std::fs::read(bucket.root().join(name)).expect("read back");
            assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unwritable_root_fails_every_file() {
        let dir = temp_dir("blocked");
        // A regular file where the bucket directory should go.
        std::fs::write(dir.join(REVIEW_IMAGE_BUCKET), b"").expect("blocker");
        let bucket = ImageBucket::new(&dir, "http://localhost");

        let results = bucket.write_all(1, vec![png("a.png"), png("b.png")], 0, 1).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(StorageError::Write { .. }))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_respect_limit() {
        use crate::commands::testutil;

        let state = testutil::state();
        let (mut client, _rx) = testutil::client();
        let user_id = testutil::sign_up(&state, &mut client, "taro").await;
        let review_id = testutil::post_review(&state, &mut client, "東京都品川区").await;
        let three = || vec![png("a.png"), png("b.png"), png("c.png")];

        let (a, b) = tokio::join!(
            upload_review_images(&state, &user_id, review_id, three()),
            upload_review_images(&state, &user_id, review_id, three()),
        );
        assert_ne!(a.is_ok(), b.is_ok());
        let refused = a.err().or(b.err()).expect("one upload refused");
        assert!(matches!(
            refused,
            StorageError::Validation(ValidationError::TooManyImages(_))
        ));

        let stored = {
            let conn = state.db.lock().await;
            images::list_for_review(&conn, review_id).expect("images")
        };
        assert_eq!(stored.len(), 3);
        let files = std::fs::read_dir(state.bucket.root()).expect("bucket").count();
        assert_eq!(files, 3);
        let _ = std::fs::remove_dir_all(state.config.data_dir());
    }
}
