//! Biblioteca de ficheros subidos.
//!
//! El contenido se guarda en `uploads/<clave>` y sus metadatos en
//! `metadata/<clave>.json`. La clave es un UUID con la extensión original.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mime_guess::MimeGuess;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{strip_extension, SourceFile},
    storage::{is_valid_key, StorageBackend},
};

/// Proveedor del texto de un fichero fuente.
#[async_trait]
pub trait FileContentSource: Send + Sync {
    async fn read_content(&self, file_id: &str) -> AppResult<String>;
}

#[derive(Clone)]
pub struct FileLibrary {
    uploads: Arc<dyn StorageBackend>,
    metadata: Arc<dyn StorageBackend>,
}

impl FileLibrary {
    pub fn new(uploads: Arc<dyn StorageBackend>, metadata: Arc<dyn StorageBackend>) -> Self {
        Self { uploads, metadata }
    }

    /// Guarda un fichero nuevo y devuelve sus metadatos.
    pub async fn upload(
        &self,
        original_name: &str,
        custom_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> AppResult<SourceFile> {
        let original_name = original_name.trim();
        if original_name.is_empty() {
            return Err(AppError::Validation("No se ha subido ningún fichero.".to_string()));
        }

        let extension = Path::new(original_name)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();
        let key = format!("{}{}", Uuid::new_v4(), extension);

        let file_type = match content_type {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
            _ => MimeGuess::from_path(original_name)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        };

        let custom_name = custom_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| strip_extension(original_name))
            .to_string();

        let file = SourceFile {
            id: key.clone(),
            filename: key.clone(),
            original_name: original_name.to_string(),
            custom_name: Some(custom_name),
            upload_date: Utc::now(),
            file_type,
            size: bytes.len() as u64,
        };

        self.uploads.put(&key, bytes).await?;
        let meta = serde_json::to_vec_pretty(&file)
            .map_err(|e| AppError::CorruptData(format!("Metadatos no serializables: {e}")))?;
        self.metadata.put(&format!("{key}.json"), &meta).await?;

        info!(
            "Fichero subido: {} -> {} ({} bytes)",
            file.original_name, file.filename, file.size
        );
        Ok(file)
    }

    /// Ficheros disponibles, del más reciente al más antiguo.
    pub async fn list(&self) -> AppResult<Vec<SourceFile>> {
        let keys = self.metadata.list_keys().await?;

        let mut files = Vec::new();
        for meta_key in keys {
            let Some(key) = meta_key.strip_suffix(".json") else {
                continue;
            };
            match self.read_metadata(key).await {
                Ok(file) => files.push(file),
                Err(e) => warn!("Error leyendo metadatos de '{}': {}", meta_key, e),
            }
        }

        files.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(files)
    }

    pub async fn get(&self, file_id: &str) -> AppResult<SourceFile> {
        if !is_valid_key(file_id) {
            return Err(AppError::NotFound(format!("Fichero '{file_id}'")));
        }
        self.read_metadata(file_id).await
    }

    async fn read_metadata(&self, key: &str) -> AppResult<SourceFile> {
        let bytes = self
            .metadata
            .get(&format!("{key}.json"))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fichero '{key}'")))?;
        let mut file: SourceFile = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::CorruptData(format!("Metadatos de '{key}': {e}")))?;
        file.id = key.to_string();
        file.filename = key.to_string();
        Ok(file)
    }
}

#[async_trait]
impl FileContentSource for FileLibrary {
    async fn read_content(&self, file_id: &str) -> AppResult<String> {
        if !is_valid_key(file_id) {
            return Err(AppError::NotFound(format!("Fichero '{file_id}'")));
        }
        let bytes = self
            .uploads
            .get(file_id)
            .await
            .map_err(|e| AppError::Upstream(format!("No se pudo leer '{file_id}': {e}")))?
            .ok_or_else(|| AppError::NotFound(format!("Fichero '{file_id}'")))?;

        String::from_utf8(bytes).map_err(|_| {
            AppError::Upstream(format!("El fichero '{file_id}' no es texto UTF-8."))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn library() -> (Arc<MemoryBackend>, Arc<MemoryBackend>, FileLibrary) {
        let uploads = Arc::new(MemoryBackend::new());
        let metadata = Arc::new(MemoryBackend::new());
        let lib = FileLibrary::new(uploads.clone(), metadata.clone());
        (uploads, metadata, lib)
    }

    #[tokio::test]
    async fn upload_then_read_back() {
        let (_, _, lib) = library();
        let file = lib
            .upload("Apuntes Tema 1.TXT", None, None, b"# Tema 1")
            .await
            .unwrap();

        assert!(file.filename.ends_with(".txt"));
        assert_eq!(file.id, file.filename);
        assert_eq!(file.custom_name.as_deref(), Some("Apuntes Tema 1"));
        assert_eq!(file.file_type, "text/plain");
        assert_eq!(file.size, 8);

        assert_eq!(lib.read_content(&file.id).await.unwrap(), "# Tema 1");
        assert_eq!(lib.get(&file.id).await.unwrap(), file);
    }

    #[tokio::test]
    async fn custom_name_and_content_type_win() {
        let (_, _, lib) = library();
        let file = lib
            .upload("a.txt", Some("  Mi nombre "), Some("text/plain"), b"x")
            .await
            .unwrap();
        assert_eq!(file.custom_name.as_deref(), Some("Mi nombre"));
        assert_eq!(file.file_type, "text/plain");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_, _, lib) = library();
        assert!(matches!(lib.read_content("nada.txt").await, Err(AppError::NotFound(_))));
        assert!(matches!(lib.read_content("../x").await, Err(AppError::NotFound(_))));
        assert!(matches!(lib.get("nada.txt").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn binary_content_is_a_read_error() {
        let (uploads, _, lib) = library();
        uploads.put("bin.dat", &[0xff, 0xfe, 0x00]).await.unwrap();
        assert!(matches!(lib.read_content("bin.dat").await, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn list_skips_corrupt_metadata() {
        let (_, metadata, lib) = library();
        lib.upload("uno.txt", None, None, b"1").await.unwrap();
        metadata.put("roto.txt.json", b"???").await.unwrap();

        let files = lib.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "uno.txt");
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let (uploads, _, lib) = library();
        assert!(matches!(lib.upload(" ", None, None, b"x").await, Err(AppError::Validation(_))));
        assert!(uploads.list_keys().await.unwrap().is_empty());
    }
}
