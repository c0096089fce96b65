//! Almacén clave-valor de bytes sobre el que se apoyan la biblioteca de
//! ficheros y el almacén de grafos.
//!
//! API pública:
//!   - `StorageBackend` (put / get / list_keys)
//!   - `FsBackend`: un fichero por clave dentro de un directorio.
//!   - `MemoryBackend`: para pruebas.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

/// Una clave válida es un nombre de fichero plano: sin separadores ni `..`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && !key.contains("..")
        && !key.contains('/')
        && !key.contains('\\')
        && !key.contains('\0')
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// `Ok(None)` si la clave no existe.
    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    async fn list_keys(&self) -> io::Result<Vec<String>>;
}

fn invalid_key(key: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("Clave de almacenamiento no válida: {key}"),
    )
}

/// Backend en disco: cada clave es un fichero dentro de `root`.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Crea el directorio si no existe.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Directorio de almacenamiento listo: {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(invalid_key(key));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key)?;
        // Escritura a un temporal y rename para no dejar ficheros a medias.
        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_keys(&self) -> io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = listed_key(name, entry.file_type().await) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Sólo ficheros visibles; una entrada ilegible se omite sin ocultar las demás.
fn listed_key(name: String, file_type: io::Result<std::fs::FileType>) -> Option<String> {
    match file_type {
        Ok(ft) if ft.is_file() && !name.starts_with('.') => Some(name),
        Ok(_) => None,
        Err(e) => {
            warn!("Se omite la entrada '{}' del listado: {}", name, e);
            None
        }
    }
}

/// Backend en memoria.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if !is_valid_key(key) {
            return Err(invalid_key(key));
        }
        self.entries().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn list_keys(&self) -> io::Result<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }
}
