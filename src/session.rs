//! Estado de la sesión: ficheros seleccionados, grafo mostrado y diálogo
//! de guardado. Incluye el análisis por lotes de la selección.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    combine::{combine, SourcedDocument},
    error::{AppError, AppResult},
    library::FileContentSource,
    llm::AnalysisGateway,
    models::{GraphDocument, SavedGraphMetadata, SourceFile},
};

/// Valores del diálogo de guardado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveDialog {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct Session {
    selected: BTreeMap<String, SourceFile>,
    current_graph: Option<GraphDocument>,
    /// Metadatos del grafo mostrado cuando viene de un guardado.
    current_source: Option<SavedGraphMetadata>,
    save_dialog: Option<SaveDialog>,
}

/// Vista serializable de la sesión.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub selected: Vec<SourceFile>,
    pub current_graph: Option<GraphDocument>,
    pub current_source: Option<SavedGraphMetadata>,
    pub save_dialog: Option<SaveDialog>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade o quita el fichero de la selección. Devuelve si queda seleccionado.
    pub fn toggle(&mut self, file: SourceFile) -> bool {
        if self.selected.remove(&file.id).is_some() {
            false
        } else {
            self.selected.insert(file.id.clone(), file);
            true
        }
    }

    pub fn selection(&self) -> Vec<SourceFile> {
        self.selected.values().cloned().collect()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn current_graph(&self) -> Option<&GraphDocument> {
        self.current_graph.as_ref()
    }

    /// Grafo recién analizado: no tiene metadatos de guardado.
    pub fn show_analysis(&mut self, graph: GraphDocument) {
        self.current_graph = Some(graph);
        self.current_source = None;
    }

    /// Grafo cargado: se limpia la selección.
    pub fn show_saved(&mut self, graph: GraphDocument, metadata: SavedGraphMetadata) {
        self.current_graph = Some(graph);
        self.current_source = Some(metadata);
        self.selected.clear();
    }

    pub fn clear_graph(&mut self) {
        self.current_graph = None;
        self.current_source = None;
    }

    /// Abre el diálogo con el nombre y la descripción propuestos.
    pub fn open_save_dialog(&mut self) -> AppResult<SaveDialog> {
        if self.current_graph.is_none() {
            return Err(AppError::Validation("No hay ningún grafo que guardar.".to_string()));
        }
        let dialog = default_save_dialog(&self.selection());
        self.save_dialog = Some(dialog.clone());
        Ok(dialog)
    }

    pub fn save_dialog(&self) -> Option<&SaveDialog> {
        self.save_dialog.as_ref()
    }

    pub fn close_save_dialog(&mut self) {
        self.save_dialog = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            selected: self.selection(),
            current_graph: self.current_graph.clone(),
            current_source: self.current_source.clone(),
            save_dialog: self.save_dialog.clone(),
        }
    }
}

/// `"a + b"` y `"Graph generated from 2 sources"`.
pub fn default_save_dialog(selection: &[SourceFile]) -> SaveDialog {
    let name = selection
        .iter()
        .map(SourceFile::display_name)
        .collect::<Vec<_>>()
        .join(" + ");
    let count = selection.len();
    SaveDialog {
        name,
        description: format!(
            "Graph generated from {} source{}",
            count,
            if count == 1 { "" } else { "s" }
        ),
    }
}

/// Analiza cada fichero en paralelo y combina los resultados.
///
/// Todas las tareas terminan aunque alguna falle; si una falla, el lote
/// entero falla y se descartan los resultados parciales.
pub async fn analyze(
    selection: &[SourceFile],
    files: &dyn FileContentSource,
    gateway: &dyn AnalysisGateway,
) -> AppResult<GraphDocument> {
    if selection.is_empty() {
        return Err(AppError::Validation("No hay ficheros seleccionados.".to_string()));
    }

    info!("Analizando {} ficheros en paralelo.", selection.len());
    let units = selection.iter().map(|file| async move {
        let content = files.read_content(&file.id).await?;
        let graph = gateway.analyze(&content).await?;
        Ok::<_, AppError>(SourcedDocument::new(file.original_name.clone(), graph))
    });
    let results = join_all(units).await;

    let mut documents = Vec::with_capacity(results.len());
    for (file, result) in selection.iter().zip(results) {
        match result {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                error!("Error procesando {}: {}", file.original_name, e);
                return Err(e.with_prefix(&format!("Error processing {}", file.original_name)));
            }
        }
    }

    let combined = combine(&documents);
    info!(
        "Grafo combinado: {} nodos, {} enlaces.",
        combined.nodes.len(),
        combined.links.len()
    );
    Ok(combined)
}
