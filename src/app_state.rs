use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use crate::{
    config::AppConfig, graph_store::GraphStore, library::FileLibrary, llm::AnalysisGateway,
    session::Session,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub library: FileLibrary,
    pub graphs: GraphStore,
    pub gateway: Arc<dyn AnalysisGateway>,
    pub session: Arc<Mutex<Session>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    /// Acceso a la sesión. Nunca debe mantenerse a través de un `.await`.
    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
