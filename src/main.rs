// Módulos de la aplicación
mod api;
mod app_state;
mod combine;
mod config;
mod error;
mod graph_store;
mod library;
mod llm;
mod models;
mod session;
mod storage;

use crate::app_state::AppState;
use crate::graph_store::GraphStore;
use crate::library::FileLibrary;
use crate::session::Session;
use crate::storage::FsBackend;
use anyhow::Context;
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Preparar los directorios de datos
    let uploads = FsBackend::open(cfg.uploads_dir())
        .await
        .context("Error creando el directorio de subidas")?;
    let metadata = FsBackend::open(cfg.metadata_dir())
        .await
        .context("Error creando el directorio de metadatos")?;
    let graphs = FsBackend::open(cfg.graphs_dir())
        .await
        .context("Error creando el directorio de grafos")?;

    // 4. Inicializar la pasarela de análisis
    let llm_manager = llm::LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?;
    info!(
        "LLM configurado: {:?} ({})",
        llm_manager.provider, llm_manager.chat_model
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        library: FileLibrary::new(Arc::new(uploads), Arc::new(metadata)),
        graphs: GraphStore::new(Arc::new(graphs)),
        gateway: Arc::new(llm_manager),
        session: Arc::new(Mutex::new(Session::new())),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new(&cfg.frontend_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);
    info!("Datos en {}", cfg.data_dir.display());

    // Abrir el frontend en el navegador por defecto
    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
