//! Thin axum translation layer (§6, §10.6): request/response (de)serialization
//! only. Every handler takes the per-session lock implicitly through
//! [`crate::session::SessionManager::handle_turn`] before touching state.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::ProjectConfig;
use crate::errors::EngineError;
use crate::llm::LlmProvider;
use crate::session::SessionManager;
use crate::store::SessionStore;

pub struct AppState<S: SessionStore> {
    pub manager: SessionManager<S>,
    pub llm: Box<dyn LlmProvider>,
}

#[derive(Deserialize)]
pub struct ChatRequestBody {
    pub session_id: String,
    pub stimulus: String,
    pub message: String,
    pub config: ProjectConfig,
}

#[derive(Serialize)]
pub struct ChatResponseBody {
    pub next_question: String,
    pub asking_interviewee_for: String,
    pub thought_process: String,
    pub end_of_interview: bool,
    pub completion_reason: Option<String>,
    pub touched_nodes: Vec<String>,
}

#[derive(Deserialize)]
pub struct LoadRequestBody {
    pub session_id: String,
}

#[derive(Serialize)]
pub struct ChatHistoryEntryBody {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct StimulusHistoryBody {
    pub stimulus: String,
    pub history: Vec<ChatHistoryEntryBody>,
}

#[derive(Serialize)]
pub struct LoadResponseBody {
    pub found: bool,
    pub chat_histories: Vec<StimulusHistoryBody>,
    pub tree: Option<crate::session::MergedTree>,
}

#[derive(Deserialize)]
pub struct SaveOrderRequestBody {
    pub session_id: String,
    pub stimulus_order: Vec<String>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        let status = match &self {
            EngineError::Graph(crate::errors::GraphError::MissingNode(_))
            | EngineError::Graph(crate::errors::GraphError::NoActiveNode) => StatusCode::NOT_FOUND,
            EngineError::SessionContended(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

async fn chat<S: SessionStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, EngineError> {
    let turn = state
        .manager
        .handle_turn(&body.session_id, &body.stimulus, &body.message, &body.config, state.llm.as_ref())
        .await?;

    Ok(Json(ChatResponseBody {
        next_question: turn.next.next_question,
        asking_interviewee_for: turn.next.asking_interviewee_for,
        thought_process: turn.next.thought_process,
        end_of_interview: turn.next.end_of_interview,
        completion_reason: turn.next.completion_reason,
        touched_nodes: turn.touched_nodes.iter().map(ToString::to_string).collect(),
    }))
}

async fn load<S: SessionStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<LoadRequestBody>,
) -> Result<Json<LoadResponseBody>, EngineError> {
    match state.manager.load_full(&body.session_id).await? {
        Some(loaded) => Ok(Json(LoadResponseBody {
            found: true,
            chat_histories: loaded
                .chat_histories
                .into_iter()
                .map(|(stimulus, entries)| StimulusHistoryBody {
                    stimulus,
                    history: entries
                        .into_iter()
                        .map(|e| ChatHistoryEntryBody { role: e.role, content: e.content })
                        .collect(),
                })
                .collect(),
            tree: Some(loaded.merged_tree),
        })),
        None => Ok(Json(LoadResponseBody { found: false, chat_histories: Vec::new(), tree: None })),
    }
}

async fn save_order<S: SessionStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<SaveOrderRequestBody>,
) -> Result<StatusCode, EngineError> {
    state.manager.save_order(&body.session_id, &body.stimulus_order).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session<S: SessionStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, EngineError> {
    state.manager.delete_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[must_use]
pub fn router<S: SessionStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/interview/chat", post(chat::<S>))
        .route("/interview/load", post(load::<S>))
        .route("/interview/save_order", post(save_order::<S>))
        .route("/session/:id", delete(delete_session::<S>))
        .with_state(state)
}
