//! Persistencia de grafos con nombre: guardar, listar y cargar.
//!
//! Cada grafo se guarda como `<clave>.json` con `{metadata, graph}`. Los
//! extremos de enlace se almacenan como ids simples y se devuelven resueltos
//! a nodos al cargar.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{GraphDocument, SaveRequest, SavedGraph, SavedGraphMetadata, SavedGraphSummary},
    storage::{is_valid_key, StorageBackend},
};

const EXTENSION: &str = ".json";

/// Forma en disco de un grafo guardado.
#[derive(Serialize, Deserialize)]
struct StoredGraph {
    metadata: SavedGraphMetadata,
    graph: GraphDocument,
}

#[derive(Clone)]
pub struct GraphStore {
    backend: Arc<dyn StorageBackend>,
}

impl GraphStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Grafos guardados, del más reciente al más antiguo.
    ///
    /// Un fallo al listar el almacén es un error; una entrada ilegible se omite.
    pub async fn list(&self) -> AppResult<Vec<SavedGraphSummary>> {
        let keys = self.backend.list_keys().await?;

        let mut summaries = Vec::new();
        for file_key in keys {
            let Some(key) = file_key.strip_suffix(EXTENSION) else {
                continue;
            };
            match self.read(key).await {
                Ok(stored) => summaries.push(SavedGraphSummary {
                    filename: key.to_string(),
                    metadata: stored.metadata,
                }),
                Err(e) => warn!("Omitiendo grafo guardado '{}': {}", key, e),
            }
        }

        summaries.sort_by(|a, b| b.metadata.saved_at.cmp(&a.metadata.saved_at));
        Ok(summaries)
    }

    pub async fn save(
        &self,
        graph: &GraphDocument,
        request: SaveRequest,
    ) -> AppResult<SavedGraphSummary> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "El grafo necesita un nombre para guardarse.".to_string(),
            ));
        }

        let graph = graph.normalized();
        if let Some(id) = graph.find_dangling() {
            return Err(AppError::Validation(format!(
                "Un enlace apunta al nodo '{id}', que no existe en el grafo."
            )));
        }

        let now = Utc::now();
        let metadata = SavedGraphMetadata {
            name: name.to_string(),
            description: request.description.unwrap_or_default().trim().to_string(),
            source_files: request.source_files,
            generated_at: request.generated_at.unwrap_or(now),
            node_count: graph.nodes.len(),
            edge_count: graph.links.len(),
            saved_at: now,
        };

        let key = format!("graph_{}", Uuid::new_v4());
        let stored = StoredGraph { metadata, graph };
        let bytes = serde_json::to_vec_pretty(&stored)
            .map_err(|e| AppError::CorruptData(format!("No se pudo serializar el grafo: {e}")))?;
        self.backend.put(&format!("{key}{EXTENSION}"), &bytes).await?;

        info!(
            "Grafo '{}' guardado como {} ({} nodos, {} enlaces).",
            stored.metadata.name, key, stored.metadata.node_count, stored.metadata.edge_count
        );
        Ok(SavedGraphSummary {
            filename: key,
            metadata: stored.metadata,
        })
    }

    /// Carga un grafo con los extremos de enlace resueltos a nodos.
    pub async fn load(&self, key: &str) -> AppResult<SavedGraph> {
        let stored = self.read(key).await?;
        let graph = stored.graph.dereferenced().map_err(|id| {
            AppError::CorruptData(format!(
                "El grafo '{key}' tiene un enlace al nodo inexistente '{id}'."
            ))
        })?;

        Ok(SavedGraph {
            filename: key.to_string(),
            metadata: stored.metadata,
            graph,
        })
    }

    async fn read(&self, key: &str) -> AppResult<StoredGraph> {
        if !is_valid_key(key) {
            return Err(AppError::NotFound(format!("Grafo '{key}'")));
        }
        let bytes = self
            .backend
            .get(&format!("{key}{EXTENSION}"))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Grafo '{key}'")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::CorruptData(format!("El grafo '{key}' no se puede leer: {e}")))
    }
}
