//! Combinación de varios documentos de grafo en uno solo.
//!
//! - Nodos: se deduplican por `id`; la procedencia es la unión de las
//!   etiquetas de los documentos que los contienen.
//! - Enlaces: se deduplican por igualdad del registro completo (extremos,
//!   relación, procedencia y campos extra). Dos enlaces iguales salvo por
//!   su fichero de origen se conservan por separado.
//! - `size` y `color` se recalculan siempre a partir de `sources`.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{
    GraphDocument, GraphLink, GraphNode, NodeId, SHARED_COLOR, SINGLE_SOURCE_COLOR,
    UNKNOWN_SOURCE,
};

/// Documento producido por el análisis de un fichero, con su procedencia.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcedDocument {
    #[serde(default)]
    pub source: Option<String>,
    pub graph: GraphDocument,
}

impl SourcedDocument {
    pub fn new(source: impl Into<String>, graph: GraphDocument) -> Self {
        Self {
            source: Some(source.into()),
            graph,
        }
    }

    fn tag(&self) -> &str {
        match self.source.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => UNKNOWN_SOURCE,
        }
    }
}

/// Tamaño de un nodo en función de cuántos ficheros lo mencionan.
pub fn node_size(source_count: usize) -> u32 {
    20 + 5 * source_count as u32
}

pub fn node_color(source_count: usize) -> &'static str {
    if source_count > 1 {
        SHARED_COLOR
    } else {
        SINGLE_SOURCE_COLOR
    }
}

/// Nuevo registro con `source` añadido a la procedencia; el original no se toca.
fn merge_source(node: &GraphNode, source: &str) -> GraphNode {
    let mut sources = node.sources.clone();
    sources.insert(source.to_string());
    GraphNode {
        sources,
        ..node.clone()
    }
}

fn with_presentation(node: GraphNode) -> GraphNode {
    let count = node.sources.len();
    GraphNode {
        size: Some(node_size(count)),
        color: Some(node_color(count).to_string()),
        ..node
    }
}

/// Combina los documentos en uno: sin ids de nodo repetidos y con todos los
/// extremos de enlace presentes entre los nodos devueltos.
pub fn combine(documents: &[SourcedDocument]) -> GraphDocument {
    let mut order: Vec<NodeId> = Vec::new();
    let mut merged: HashMap<NodeId, GraphNode> = HashMap::new();

    for doc in documents {
        let tag = doc.tag();
        for node in &doc.graph.nodes {
            let next = match merged.get(&node.id) {
                Some(existing) => merge_source(existing, tag),
                None => {
                    order.push(node.id.clone());
                    GraphNode {
                        sources: BTreeSet::from([tag.to_string()]),
                        ..node.clone()
                    }
                }
            };
            merged.insert(node.id.clone(), next);
        }
    }

    let nodes: Vec<GraphNode> = order
        .iter()
        .filter_map(|id| merged.remove(id))
        .map(with_presentation)
        .collect();
    let known: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut links: Vec<GraphLink> = Vec::new();
    let mut dangling = 0usize;

    for doc in documents {
        let tag = doc.tag();
        for link in &doc.graph.links {
            if !known.contains(link.source.id()) || !known.contains(link.target.id()) {
                dangling += 1;
                continue;
            }
            let tagged = GraphLink {
                sources: vec![tag.to_string()],
                ..link.with_bare_endpoints()
            };
            // serde_json ordena las claves de los objetos: la cadena es canónica.
            if is_new_link(&mut seen, serde_json::to_string(&tagged)) {
                links.push(tagged);
            }
        }
    }

    if dangling > 0 {
        warn!(
            "Se descartaron {} enlaces cuyos extremos no existen en el grafo combinado.",
            dangling
        );
    }
    debug!(
        "Combinados {} documentos: {} nodos, {} enlaces.",
        documents.len(),
        nodes.len(),
        links.len()
    );

    GraphDocument { nodes, links }
}

/// Registra la identidad del enlace; sin identidad el enlace se conserva.
fn is_new_link(seen: &mut HashSet<String>, identity: serde_json::Result<String>) -> bool {
    match identity {
        Ok(identity) => seen.insert(identity),
        Err(e) => {
            warn!("No se pudo calcular la identidad de un enlace, se conserva: {}", e);
            true
        }
    }
}
