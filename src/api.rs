use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    app_state::AppState,
    combine::{combine, SourcedDocument},
    error::{AppError, AppResult},
    library::FileContentSource,
    models::{GraphDocument, SaveRequest},
    session,
};

// --- Payloads de la API ---

#[derive(Deserialize)]
pub struct AnalyzePayload {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
pub struct CombinePayload {
    graphs: Vec<SourcedDocument>,
}

#[derive(Deserialize)]
pub struct SaveGraphPayload {
    graph: GraphDocument,
    #[serde(default)]
    metadata: SaveRequest,
}

#[derive(Deserialize)]
pub struct SelectPayload {
    filename: String,
}

#[derive(Deserialize)]
pub struct SessionSavePayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = app_state.config.max_upload_bytes;
    Router::new()
        .route("/api/test", get(test_handler))
        .route("/api/files", get(list_files_handler))
        .route("/api/files/:filename", get(file_content_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/combine", post(combine_handler))
        .route("/api/graphs", get(list_graphs_handler))
        .route("/api/graphs/save", post(save_graph_handler))
        .route("/api/graphs/:filename", get(load_graph_handler))
        .route("/api/session", get(session_handler))
        .route("/api/session/select", post(select_handler))
        .route("/api/session/clear", post(clear_session_handler))
        .route("/api/session/analyze", post(analyze_selection_handler))
        .route(
            "/api/session/save-dialog",
            post(open_save_dialog_handler).delete(close_save_dialog_handler),
        )
        .route("/api/session/save", post(save_current_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(app_state)
}

// --- Handlers: ficheros ---

#[axum::debug_handler]
async fn test_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[axum::debug_handler]
async fn list_files_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let files = state.library.list().await?;
    Ok(Json(json!({ "files": files })))
}

#[axum::debug_handler]
async fn file_content_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<Value>> {
    let content = state.library.read_content(&filename).await?;
    Ok(Json(json!({ "success": true, "content": content })))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut custom_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Error leyendo la subida: {e}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Error leyendo el fichero: {e}")))?;
                upload = Some((name, content_type, bytes.to_vec()));
            }
            Some("customName") => {
                custom_name = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Error leyendo customName: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let (name, content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let file = state
        .library
        .upload(&name, custom_name.as_deref(), content_type.as_deref(), &bytes)
        .await?;

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "filename": file.filename,
        "metadata": file,
    })))
}

// --- Handlers: análisis y combinación ---

#[axum::debug_handler]
async fn analyze_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzePayload>,
) -> AppResult<Json<Value>> {
    let graph = state.gateway.analyze(&payload.content).await?;
    Ok(Json(json!({ "success": true, "data": graph })))
}

#[axum::debug_handler]
async fn combine_handler(Json(payload): Json<CombinePayload>) -> Json<Value> {
    let graph = combine(&payload.graphs);
    Json(json!({ "success": true, "data": graph }))
}

// --- Handlers: grafos guardados ---

#[axum::debug_handler]
async fn list_graphs_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let graphs = state.graphs.list().await?;
    Ok(Json(json!({ "graphs": graphs })))
}

#[axum::debug_handler]
async fn save_graph_handler(
    State(state): State<AppState>,
    Json(payload): Json<SaveGraphPayload>,
) -> AppResult<Json<Value>> {
    let summary = state.graphs.save(&payload.graph, payload.metadata).await?;
    Ok(Json(json!({
        "success": true,
        "filename": summary.filename,
        "metadata": summary.metadata,
    })))
}

#[axum::debug_handler]
async fn load_graph_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<Value>> {
    let saved = state.graphs.load(&filename).await?;
    state
        .session()
        .show_saved(saved.graph.clone(), saved.metadata.clone());
    Ok(Json(json!({ "success": true, "data": saved })))
}

// --- Handlers: sesión ---

#[axum::debug_handler]
async fn session_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.session().snapshot()))
}

#[axum::debug_handler]
async fn select_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectPayload>,
) -> AppResult<Json<Value>> {
    let file = state.library.get(&payload.filename).await?;
    let mut session = state.session();
    let selected = session.toggle(file);
    Ok(Json(json!({
        "selected": selected,
        "selection": session.selection(),
    })))
}

#[axum::debug_handler]
async fn clear_session_handler(State(state): State<AppState>) -> StatusCode {
    let mut session = state.session();
    session.clear_selection();
    session.clear_graph();
    session.close_save_dialog();
    StatusCode::OK
}

#[axum::debug_handler]
async fn analyze_selection_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let selection = state.session().selection();
    let result = session::analyze(&selection, &state.library, state.gateway.as_ref()).await;

    let mut session = state.session();
    match result {
        Ok(graph) => {
            session.show_analysis(graph.clone());
            Ok(Json(json!({ "success": true, "data": graph })))
        }
        Err(e) => {
            if !selection.is_empty() {
                session.clear_graph();
            }
            Err(e)
        }
    }
}

#[axum::debug_handler]
async fn open_save_dialog_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let dialog = state.session().open_save_dialog()?;
    Ok(Json(json!(dialog)))
}

#[axum::debug_handler]
async fn close_save_dialog_handler(State(state): State<AppState>) -> StatusCode {
    state.session().close_save_dialog();
    StatusCode::OK
}

/// Guarda el grafo que se está mostrando en la sesión.
#[axum::debug_handler]
async fn save_current_handler(
    State(state): State<AppState>,
    Json(payload): Json<SessionSavePayload>,
) -> AppResult<Json<Value>> {
    let (graph, source_files, dialog) = {
        let session = state.session();
        let graph = session
            .current_graph()
            .cloned()
            .ok_or_else(|| AppError::Validation("No hay ningún grafo que guardar.".to_string()))?;
        let sources = session
            .selection()
            .into_iter()
            .map(|f| f.original_name)
            .collect::<Vec<_>>();
        (graph, sources, session.save_dialog().cloned())
    };

    // Lo que no venga en la petición se toma del diálogo abierto.
    let (dialog_name, dialog_description) = match dialog {
        Some(d) => (Some(d.name), Some(d.description)),
        None => (None, None),
    };
    let request = SaveRequest {
        name: payload.name.or(dialog_name).unwrap_or_default(),
        description: payload.description.or(dialog_description),
        source_files,
        generated_at: Some(Utc::now()),
    };
    let summary = state.graphs.save(&graph, request).await?;
    state.session().close_save_dialog();

    Ok(Json(json!({
        "success": true,
        "filename": summary.filename,
        "metadata": summary.metadata,
    })))
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, LlmProvider},
        graph_store::GraphStore,
        library::FileLibrary,
        llm::AnalysisGateway,
        models::{GraphLink, GraphNode, SHARED_COLOR},
        session::Session,
        storage::MemoryBackend,
    };
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    /// Un nodo por palabra, enlazados en orden.
    struct WordGateway;

    #[async_trait]
    impl AnalysisGateway for WordGateway {
        async fn analyze(&self, content: &str) -> AppResult<GraphDocument> {
            if content.trim().is_empty() {
                return Err(AppError::Validation("No content provided".into()));
            }
            let words: Vec<&str> = content.split_whitespace().collect();
            Ok(GraphDocument {
                nodes: words.iter().map(|w| GraphNode::new(*w, *w)).collect(),
                links: words
                    .windows(2)
                    .map(|w| GraphLink::new(w[0], w[1], "next"))
                    .collect(),
            })
        }
    }

    fn test_state() -> AppState {
        let config = AppConfig {
            server_addr: "127.0.0.1:0".into(),
            data_dir: PathBuf::from("unused"),
            frontend_dir: PathBuf::from("unused"),
            max_upload_bytes: 1024 * 1024,
            open_browser: false,
            llm_provider: LlmProvider::OpenAI,
            llm_chat_model: String::new(),
        };
        AppState {
            config,
            library: FileLibrary::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryBackend::new())),
            graphs: GraphStore::new(Arc::new(MemoryBackend::new())),
            gateway: Arc::new(WordGateway),
            session: Arc::new(Mutex::new(Session::new())),
            shutdown_sender: Arc::new(Mutex::new(None)),
        }
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn upload(app: &Router, name: &str, content: &str) -> String {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        json["filename"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let app = create_router(test_state());
        let (status, body) = call(&app, Method::GET, "/api/test", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_list_and_read() {
        let app = create_router(test_state());
        let filename = upload(&app, "notas.txt", "hola mundo").await;

        let (_, listed) = call(&app, Method::GET, "/api/files", None).await;
        assert_eq!(listed["files"][0]["originalName"], "notas.txt");
        assert_eq!(listed["files"][0]["customName"], "notas");

        let (status, content) =
            call(&app, Method::GET, &format!("/api/files/{filename}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content["content"], "hola mundo");

        let (status, missing) = call(&app, Method::GET, "/api/files/nada.txt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["success"], false);
    }

    #[tokio::test]
    async fn analyze_requires_content() {
        let app = create_router(test_state());
        let (status, body) =
            call(&app, Method::POST, "/api/analyze", Some(json!({ "content": "a b" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nodes"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, Method::POST, "/api/analyze", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn combine_endpoint_merges_documents() {
        let app = create_router(test_state());
        let doc = json!({ "nodes": [{ "id": "a" }], "links": [] });
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/combine",
            Some(json!({ "graphs": [
                { "source": "f1", "graph": doc },
                { "source": "f2", "graph": doc }
            ]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let node = &body["data"]["nodes"][0];
        assert_eq!(node["sources"], json!(["f1", "f2"]));
        assert_eq!(node["size"], 30);
        assert_eq!(node["color"], SHARED_COLOR);
    }

    #[tokio::test]
    async fn save_list_and_load_graph() {
        let app = create_router(test_state());
        let graph = json!({
            "nodes": [{ "id": "a", "label": "A" }, { "id": "b", "label": "B" }],
            "links": [{ "source": { "id": "a" }, "target": "b", "relationship": "r" }]
        });

        let (status, saved) = call(
            &app,
            Method::POST,
            "/api/graphs/save",
            Some(json!({ "graph": graph, "metadata": { "name": "Mi grafo", "nodeCount": 99 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["metadata"]["nodeCount"], 2);
        let filename = saved["filename"].as_str().unwrap().to_string();

        let (_, listed) = call(&app, Method::GET, "/api/graphs", None).await;
        assert_eq!(listed["graphs"][0]["filename"], filename.as_str());

        let (status, loaded) =
            call(&app, Method::GET, &format!("/api/graphs/{filename}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(loaded["data"]["graph"]["links"][0]["source"]["label"], "A");
        assert_eq!(loaded["data"]["metadata"]["name"], "Mi grafo");

        let (_, session) = call(&app, Method::GET, "/api/session", None).await;
        assert_eq!(session["currentSource"]["name"], "Mi grafo");
    }

    #[tokio::test]
    async fn save_without_name_is_rejected() {
        let app = create_router(test_state());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/graphs/save",
            Some(json!({ "graph": { "nodes": [], "links": [] }, "metadata": { "name": "" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, listed) = call(&app, Method::GET, "/api/graphs", None).await;
        assert!(listed["graphs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_graph_is_not_found() {
        let app = create_router(test_state());
        let (status, _) = call(&app, Method::GET, "/api/graphs/graph_nada", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_flow_select_analyze_save() {
        let app = create_router(test_state());
        let one = upload(&app, "uno.txt", "gato perro").await;
        let two = upload(&app, "dos.txt", "perro lobo").await;

        let (status, _) = call(&app, Method::POST, "/api/session/analyze", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for f in [&one, &two] {
            let (_, body) =
                call(&app, Method::POST, "/api/session/select", Some(json!({ "filename": f }))).await;
            assert_eq!(body["selected"], true);
        }

        let (status, analyzed) = call(&app, Method::POST, "/api/session/analyze", None).await;
        assert_eq!(status, StatusCode::OK);
        let nodes = analyzed["data"]["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 3);
        let perro = nodes.iter().find(|n| n["id"] == "perro").unwrap();
        assert_eq!(perro["sources"], json!(["dos.txt", "uno.txt"]));

        let (_, dialog) = call(&app, Method::POST, "/api/session/save-dialog", None).await;
        assert_eq!(dialog["description"], "Graph generated from 2 sources");

        let (status, saved) = call(
            &app,
            Method::POST,
            "/api/session/save",
            Some(json!({ "name": dialog["name"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["metadata"]["sourceFiles"].as_array().unwrap().len(), 2);
        assert_eq!(saved["metadata"]["edgeCount"], 2);
        assert_eq!(saved["metadata"]["description"], "Graph generated from 2 sources");

        let (_, session) = call(&app, Method::GET, "/api/session", None).await;
        assert!(session["saveDialog"].is_null());
    }

    #[tokio::test]
    async fn session_save_uses_the_dialog_when_fields_are_missing() {
        let app = create_router(test_state());
        let one = upload(&app, "apuntes.txt", "gato perro").await;
        call(&app, Method::POST, "/api/session/select", Some(json!({ "filename": one }))).await;
        call(&app, Method::POST, "/api/session/analyze", None).await;
        call(&app, Method::POST, "/api/session/save-dialog", None).await;

        let (status, saved) =
            call(&app, Method::POST, "/api/session/save", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["metadata"]["name"], "apuntes");
        assert_eq!(saved["metadata"]["description"], "Graph generated from 1 source");

        // Sin diálogo abierto y sin nombre no hay guardado.
        let (status, _) = call(&app, Method::POST, "/api/session/save", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn selecting_twice_deselects() {
        let app = create_router(test_state());
        let one = upload(&app, "uno.txt", "a").await;
        let payload = json!({ "filename": one });

        call(&app, Method::POST, "/api/session/select", Some(payload.clone())).await;
        let (_, body) = call(&app, Method::POST, "/api/session/select", Some(payload)).await;
        assert_eq!(body["selected"], false);
        assert!(body["selection"].as_array().unwrap().is_empty());

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/session/select",
            Some(json!({ "filename": "nada.txt" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
