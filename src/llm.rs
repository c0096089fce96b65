//! Pasarela de análisis: texto → grafo de conceptos con un agente de Rig
//! sobre OpenAI.

use async_trait::async_trait;
use rig::completion::Prompt;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, LlmProvider},
    error::{AppError, AppResult},
    models::GraphDocument,
};

/// Colaborador externo que convierte texto en un grafo.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze(&self, content: &str) -> AppResult<GraphDocument>;
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes text and identifies key concepts and their relationships. Return only valid JSON without any additional text.";

const ANALYSIS_PROMPT: &str = r#"
Analyze the following content and return a JSON object containing:
1. nodes: An array of objects, each representing a key concept with properties:
   - id: unique identifier
   - label: name of the concept
   - description: brief explanation
2. links: An array of objects representing relationships between nodes with properties:
   - source: id of the source node
   - target: id of the target node
   - relationship: description of how these concepts are related

Please ensure the response is valid JSON and includes at least 5-10 key concepts and their relationships.

Content to analyze:
"#;

/// Gestor del LLM de chat usado para el análisis.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    async fn analyze_with_openai(&self, content: &str) -> AppResult<GraphDocument> {
        use rig::client::CompletionClient as _;
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.7)
            .max_tokens(2000)
            .build();

        let prompt = format!("{ANALYSIS_PROMPT}{content}");
        let response = agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| AppError::Upstream(format!("Fallo llamando al LLM: {e}")))?;

        parse_graph_response(&response)
    }
}

#[async_trait]
impl AnalysisGateway for LlmManager {
    async fn analyze(&self, content: &str) -> AppResult<GraphDocument> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("No se ha proporcionado contenido.".to_string()));
        }
        info!("Analizando contenido de {} caracteres.", content.chars().count());

        let graph = match self.provider {
            LlmProvider::OpenAI => self.analyze_with_openai(content).await?,
        };

        info!(
            "Análisis completado: {} nodos, {} enlaces.",
            graph.nodes.len(),
            graph.links.len()
        );
        Ok(graph)
    }
}

/// Interpreta la respuesta del LLM como grafo.
///
/// Una estructura mal formada es un error, nunca un grafo vacío.
pub fn parse_graph_response(response: &str) -> AppResult<GraphDocument> {
    // Limpiar la respuesta del LLM para asegurar que solo contenga el JSON
    let json_response = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let graph: GraphDocument = serde_json::from_str(json_response).map_err(|e| {
        warn!("Respuesta del LLM no interpretable: {}. Respuesta: '{}'", e, response);
        AppError::Upstream(format!("Failed to analyze content: {e}"))
    })?;

    if graph.nodes.iter().any(|n| n.id.as_str().trim().is_empty()) {
        return Err(AppError::Upstream(
            "Failed to analyze content: el LLM devolvió un nodo sin id".to_string(),
        ));
    }
    Ok(graph)
}
