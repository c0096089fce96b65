//! Carga y gestión de configuración de la aplicación (servidor, datos y LLM).

use std::env;
use std::path::PathBuf;
use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    /// Raíz de `uploads/`, `metadata/` y `graphs/`.
    pub data_dir: PathBuf,
    pub frontend_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub open_browser: bool,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:5001".to_string());

        let data_dir = var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("talk-graph"))
                .unwrap_or_else(|| PathBuf::from("data"))
        });
        let frontend_dir = PathBuf::from(var("FRONTEND_DIR").unwrap_or_else(|| "frontend".to_string()));

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow!("MAX_UPLOAD_BYTES no es un número válido: {raw}"))?,
            None => 10 * 1024 * 1024,
        };
        let open_browser = var("OPEN_BROWSER")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let llm_provider_str = var("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        if var("OPENAI_API_KEY").is_none() {
            return Err(anyhow!("Falta OPENAI_API_KEY en el entorno"));
        }

        let llm_chat_model = var("LLM_CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        Ok(Self {
            server_addr,
            data_dir,
            frontend_dir,
            max_upload_bytes,
            open_browser,
            llm_provider,
            llm_chat_model,
        })
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join("metadata")
    }

    pub fn graphs_dir(&self) -> PathBuf {
        self.data_dir.join("graphs")
    }
}
