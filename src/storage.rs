use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ResultExt, Snafu};

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("could not read `{}`: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not write `{}`: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("stored value under `{key}` is not valid: {source}"))]
    Malformed {
        key: String,
        source: serde_json::Error,
    },

    #[snafu(display("could not encode value for `{key}`: {source}"))]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// A durable string key-value store, the backing for every client-side store.
pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: LocalStorage + ?Sized> LocalStorage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Read and decode the JSON value stored under `key`.
///
/// Missing keys and undecodable values both come back as `T::default()`; the failure is
/// logged but never propagated.
pub fn load_or_default<T, S>(storage: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: LocalStorage + ?Sized,
{
    match load(storage, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(error) => {
            tracing::warn!(%key, %error, "could not load stored value, treating it as empty");
            T::default()
        }
    }
}

pub fn load<T, S>(storage: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: LocalStorage + ?Sized,
{
    let Some(text) = storage.get(key)? else {
        return Ok(None);
    };

    serde_json::from_str(&text)
        .map(Some)
        .context(MalformedSnafu { key })
}

pub fn save<T, S>(storage: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize,
    S: LocalStorage + ?Sized,
{
    let text = serde_json::to_string(value).context(EncodeSnafu { key })?;
    storage.set(key, &text)
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);

        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).context(ReadSnafu { path }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context(WriteSnafu { path: &self.dir })?;

        // write next to the target and rename so a crash never leaves half a document
        let path = self.path(key);
        let staging = path.with_extension("json.tmp");

        std::fs::write(&staging, value).context(WriteSnafu { path: &staging })?;
        std::fs::rename(&staging, &path).context(WriteSnafu { path })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key);

        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error).context(WriteSnafu { path }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
