// Saved job and transformation rule stores backed by JSON files

use crate::errors::StoreError;
use crate::models::{SavedJob, SavedTransformation};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// File holding saved jobs inside the store directory
pub const SAVED_JOBS_FILE: &str = "savedJobs.json";
/// File holding transformation rules inside the store directory
pub const SAVED_TRANSFORMATIONS_FILE: &str = "savedTransformations.json";

/// Records kept in a store are identified by id and ordered by position
pub trait StoreItem: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn position(&self) -> i64;
}

impl StoreItem for SavedJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i64 {
        self.position
    }
}

impl StoreItem for SavedTransformation {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i64 {
        self.position
    }
}

/// Store trait for saved records
#[async_trait]
pub trait Store<T: StoreItem>: Send + Sync {
    /// All records, in storage order
    async fn all_items(&self) -> Result<Vec<T>, StoreError>;

    /// Insert a record, replacing in place any record with the same id
    async fn add_item(&self, item: T) -> Result<bool, StoreError>;

    /// Remove the record with `id`; false when the store holds nothing yet
    async fn remove_item(&self, id: &str) -> Result<bool, StoreError>;
}

/// Records sorted by ascending position, ties keeping storage order
pub fn sorted_by_position<T: StoreItem>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_key(|item| item.position());
    items
}

/// Store keeping a JSON array in a single file
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> JsonFileStore<T>
where
    T: StoreItem + Serialize + DeserializeOwned,
{
    /// Stored records, `None` when the file does not exist yet
    async fn read(&self) -> Result<Option<Vec<T>>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Some(Vec::new()));
                }
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, items: &[T]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), count = items.len(), "Store written");
        Ok(())
    }
}

#[async_trait]
impl<T> Store<T> for JsonFileStore<T>
where
    T: StoreItem + Serialize + DeserializeOwned + 'static,
{
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn all_items(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.read().await?.unwrap_or_default())
    }

    #[instrument(skip(self, item), fields(path = %self.path.display(), id = item.id()))]
    async fn add_item(&self, item: T) -> Result<bool, StoreError> {
        let mut items = self.read().await?.unwrap_or_default();

        match items.iter().position(|existing| existing.id() == item.id()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }

        self.write(&items).await?;
        info!("Store record saved");
        Ok(true)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn remove_item(&self, id: &str) -> Result<bool, StoreError> {
        let Some(items) = self.read().await? else {
            return Ok(false);
        };

        let remaining: Vec<T> = items.into_iter().filter(|item| item.id() != id).collect();
        self.write(&remaining).await?;
        info!(id = id, "Store record removed");
        Ok(true)
    }
}

/// Saved job store under `directory`
pub fn job_store(directory: impl AsRef<Path>) -> JsonFileStore<SavedJob> {
    JsonFileStore::new(directory.as_ref().join(SAVED_JOBS_FILE))
}

/// Transformation rule store under `directory`
pub fn transformation_store(directory: impl AsRef<Path>) -> JsonFileStore<SavedTransformation> {
    JsonFileStore::new(directory.as_ref().join(SAVED_TRANSFORMATIONS_FILE))
}
