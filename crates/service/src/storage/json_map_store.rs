use std::{collections::HashMap, hash::Hash, path::PathBuf, sync::Arc};
use tokio::{fs, sync::RwLock};

use crate::errors::ServiceError;

/// Generic JSON file-backed key-value map store.
///
/// Persists a `HashMap<K, V>` to a JSON file. Every mutation is checked,
/// applied and written while the write lock is held, so a reader never sees
/// a change that did not reach disk.
#[derive(Clone)]
pub struct JsonMapStore<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
    file_path: PathBuf,
}

fn io_err(path: &std::path::Path, e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Failure(format!("{}: {}", path.display(), e))
}

impl<K, V> JsonMapStore<K, V>
where
    K: Eq + Hash + serde::Serialize + serde::de::DeserializeOwned + Clone,
    V: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    /// Initialize the store from a path. Creates the file with an empty map if missing.
    /// A file that exists but does not parse is an error, not an empty map.
    pub async fn new<P: Into<PathBuf>>(path: P) -> Result<Arc<Self>, ServiceError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_err(parent, e))?;
        }

        let map: HashMap<K, V> = match fs::read(&file_path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| io_err(&file_path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty: HashMap<K, V> = HashMap::new();
                write_atomically(&file_path, &empty).await?;
                empty
            }
            Err(e) => return Err(io_err(&file_path, e)),
        };

        Ok(Arc::new(Self { inner: Arc::new(RwLock::new(map)), file_path }))
    }

    /// List all values.
    pub async fn values(&self) -> Vec<V> {
        let map = self.inner.read().await;
        map.values().cloned().collect()
    }

    /// Get value by key.
    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    /// Remove a key and persist; returns whether it existed.
    pub async fn remove(&self, key: &K) -> Result<bool, ServiceError> {
        self.update_map(|m| Ok(m.remove(key).is_some())).await
    }

    /// Apply a mutation to the underlying map and persist atomically.
    ///
    /// If `f` or the write fails the map is put back to its previous contents
    /// and nothing new reaches disk.
    pub async fn update_map<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut HashMap<K, V>) -> Result<T, ServiceError>,
    {
        let mut map = self.inner.write().await;
        let snapshot = map.clone();
        let out = match f(&mut map) {
            Ok(out) => out,
            Err(e) => {
                *map = snapshot;
                return Err(e);
            }
        };
        if let Err(e) = write_atomically(&self.file_path, &*map).await {
            *map = snapshot;
            return Err(e);
        }
        Ok(out)
    }
}

async fn write_atomically<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<(), ServiceError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| io_err(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).await.map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).await.map_err(|e| io_err(path, e))?;
    Ok(())
}
