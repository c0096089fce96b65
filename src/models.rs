//! Modelos de dominio: documento de grafo (nodos, enlaces), ficheros fuente
//! y metadatos de los grafos guardados.
//!
//! El formato JSON es el mismo que consume el frontend (camelCase). Los
//! campos desconocidos de nodos y enlaces se conservan en `extra`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Color de un nodo presente en más de un fichero fuente.
pub const SHARED_COLOR: &str = "#e74c3c";
/// Color de un nodo que procede de un único fichero fuente.
pub const SINGLE_SOURCE_COLOR: &str = "#69b3a2";
/// Etiqueta de procedencia cuando el documento no trae ninguna.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Identificador de un nodo dentro de un documento.
///
/// El LLM a veces devuelve ids numéricos; se aceptan y se guardan como texto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => NodeId(s),
            RawId::Number(n) => NodeId(n.to_string()),
        })
    }
}

/// `null` se lee como cadena vacía, igual que un campo ausente.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Concepto del grafo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    /// Ficheros fuente que produjeron un nodo con este id.
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphNode {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            label: label.into(),
            description: String::new(),
            sources: BTreeSet::new(),
            size: None,
            color: None,
            extra: Map::new(),
        }
    }
}

/// Extremo de un enlace: un id sin más o el nodo ya resuelto.
///
/// Se persiste siempre como id; `load` devuelve nodos resueltos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkEndpoint {
    Id(NodeId),
    Node(Box<GraphNode>),
}

impl LinkEndpoint {
    pub fn id(&self) -> &NodeId {
        match self {
            LinkEndpoint::Id(id) => id,
            LinkEndpoint::Node(node) => &node.id,
        }
    }

    pub fn to_bare(&self) -> LinkEndpoint {
        LinkEndpoint::Id(self.id().clone())
    }
}

#[cfg(test)]
impl From<&str> for LinkEndpoint {
    fn from(s: &str) -> Self {
        LinkEndpoint::Id(NodeId::from(s))
    }
}

/// Relación entre dos conceptos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: LinkEndpoint,
    pub target: LinkEndpoint,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub relationship: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphLink {
    #[cfg(test)]
    pub fn new(
        source: impl Into<LinkEndpoint>,
        target: impl Into<LinkEndpoint>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
            sources: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Copia del enlace con ambos extremos reducidos a ids.
    pub fn with_bare_endpoints(&self) -> GraphLink {
        GraphLink {
            source: self.source.to_bare(),
            target: self.target.to_bare(),
            ..self.clone()
        }
    }
}

/// Unidad producida por el análisis, la combinación y la persistencia.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl GraphDocument {
    /// Documento con todos los extremos de enlace como ids simples.
    pub fn normalized(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes.clone(),
            links: self.links.iter().map(GraphLink::with_bare_endpoints).collect(),
        }
    }

    /// Sustituye cada extremo por el nodo correspondiente del propio documento.
    ///
    /// Devuelve el primer id que no se puede resolver.
    pub fn dereferenced(&self) -> Result<GraphDocument, NodeId> {
        let by_id: HashMap<&NodeId, &GraphNode> =
            self.nodes.iter().map(|n| (&n.id, n)).collect();
        let resolve = |endpoint: &LinkEndpoint| {
            by_id
                .get(endpoint.id())
                .map(|node| LinkEndpoint::Node(Box::new((*node).clone())))
                .ok_or_else(|| endpoint.id().clone())
        };

        let mut links = Vec::with_capacity(self.links.len());
        for link in &self.links {
            links.push(GraphLink {
                source: resolve(&link.source)?,
                target: resolve(&link.target)?,
                ..link.clone()
            });
        }
        Ok(GraphDocument {
            nodes: self.nodes.clone(),
            links,
        })
    }

    /// Primer extremo de enlace que no apunta a un nodo del documento.
    pub fn find_dangling(&self) -> Option<&NodeId> {
        let ids: BTreeSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();
        self.links
            .iter()
            .flat_map(|l| [l.source.id(), l.target.id()])
            .find(|id| !ids.contains(id))
    }

    /// Igualdad de contenido comparando los extremos sólo por id.
    #[cfg(test)]
    pub fn same_content(&self, other: &GraphDocument) -> bool {
        self.normalized() == other.normalized()
    }
}

/// Fichero subido por el usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    /// Igual a `filename`; se rellena al leer los metadatos.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    pub upload_date: DateTime<Utc>,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub size: u64,
}

impl SourceFile {
    /// Nombre para mostrar: el personalizado o el original sin extensión.
    pub fn display_name(&self) -> String {
        match self.custom_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => strip_extension(&self.original_name).to_string(),
        }
    }
}

/// `"informe.final.txt"` → `"informe.final"`.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Datos que envía el cliente al guardar un grafo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Metadatos tal y como quedan almacenados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGraphMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_files: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// Entrada del listado de grafos guardados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGraphSummary {
    pub filename: String,
    pub metadata: SavedGraphMetadata,
}

/// Grafo guardado completo, con la clave con la que se almacenó.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGraph {
    pub filename: String,
    pub metadata: SavedGraphMetadata,
    pub graph: GraphDocument,
}
