//! Session Manager: orchestrates C1-C7 per session, loading/persisting
//! snapshots and enforcing the per-session turn lock (§5).

pub mod cache;
pub mod handler;
pub mod merged;
pub mod snapshot;

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;

use crate::analyzer::ElementAnalyzer;
use crate::config::ProjectConfig;
use crate::errors::EngineError;
use crate::generator::{GeneratedQuestion, PromptContext, QuestionGenerator};
use crate::graph::NodeLabel;
use crate::ids::NodeId;
use crate::llm::LlmProvider;
use crate::similarity::{SimilarityOracle, SimilarityThresholds};
use crate::stage::{values_limit_tripped, AdvanceContext, Stage};
use crate::store::SessionStore;
use crate::updater::TreeUpdater;

pub use cache::SessionCache;
pub use handler::{ChatHandler, ChatHistoryEntry};
pub use merged::MergedTree;
pub use snapshot::{ChatHandlerSnapshot, SessionSnapshot};

/// A session: one topic, the stimuli presented, and one chat handler per
/// stimulus (§3). Cheap-ish to clone for the cache's copy-on-read model.
#[derive(Clone)]
pub struct Session {
    pub session_id: String,
    pub topic: String,
    pub stimuli: Vec<String>,
    pub n_values_max: i64,
    pub max_retries: i64,
    pub handlers: FxHashMap<String, ChatHandler>,
}

impl Session {
    #[must_use]
    pub fn new(session_id: String, config: &ProjectConfig) -> Self {
        let mut handlers = FxHashMap::default();
        for stimulus in &config.stimuli {
            handlers.insert(
                stimulus.clone(),
                ChatHandler::new(session_id.clone(), config.topic.clone(), stimulus, config),
            );
        }
        Self {
            session_id,
            topic: config.topic.clone(),
            stimuli: config.stimuli.clone(),
            n_values_max: config.n_values_max,
            max_retries: config.max_retries,
            handlers,
        }
    }

    #[must_use]
    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            topic: self.topic.clone(),
            stimuli: self.stimuli.clone(),
            n_values_max: self.n_values_max,
            max_retries: self.max_retries,
            chat_sessions: self.stimuli.iter().filter_map(|s| self.handlers.get(s)).map(ChatHandler::to_snapshot).collect(),
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut handlers = FxHashMap::default();
        for chs in snapshot.chat_sessions {
            handlers.insert(chs.stimulus.clone(), ChatHandler::from_snapshot(chs));
        }
        Self {
            session_id: snapshot.session_id,
            topic: snapshot.topic,
            stimuli: snapshot.stimuli,
            n_values_max: snapshot.n_values_max,
            max_retries: snapshot.max_retries,
            handlers,
        }
    }
}

/// Response shape for `POST /interview/chat` (§6): `{Next, Chains, Tree}`.
#[derive(Debug)]
pub struct TurnResponse {
    pub next: GeneratedQuestion,
    pub touched_nodes: Vec<NodeId>,
}

/// Response shape for `POST /interview/load` (§6).
#[derive(Debug)]
pub struct LoadedSession {
    pub chat_histories: Vec<(String, Vec<ChatHistoryEntry>)>,
    pub merged_tree: MergedTree,
}

/// Orchestrates one turn through the fixed analyze -> graft -> queue ->
/// stage -> generate pipeline (§2, §5). Holds no per-session state itself;
/// the per-session lock lives in the caller (the HTTP layer, §10.6) keyed
/// by session-id, since the Session Manager itself is stateless per
/// request aside from the cache/store it's constructed with.
pub struct SessionManager<S: SessionStore> {
    store: S,
    cache: SessionCache,
    locks: AsyncMutex<StdHashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S: SessionStore> SessionManager<S> {
    #[must_use]
    pub fn new(store: S, cache: SessionCache) -> Self {
        Self {
            store,
            cache,
            locks: AsyncMutex::new(StdHashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn load_or_create(&self, session_id: &str, config: &ProjectConfig) -> Result<Session, EngineError> {
        if let Some(session) = self.cache.get(session_id) {
            return Ok(session);
        }
        match self.store.load(session_id).await? {
            Some(json) => match serde_json::from_str::<SessionSnapshot>(&json) {
                Ok(snapshot) => Ok(Session::from_snapshot(snapshot)),
                Err(_) => {
                    // §7: snapshot deserialization failure -> treat as
                    // fresh, leave the stored snapshot untouched.
                    Ok(Session::new(session_id.to_string(), config))
                }
            },
            None => Ok(Session::new(session_id.to_string(), config)),
        }
    }

    /// Looks up a session without creating one; used by endpoints that must
    /// not fabricate state for an unknown id (§6 `load`/`save_order`).
    async fn fetch_existing(&self, session_id: &str) -> Result<Option<Session>, EngineError> {
        if let Some(session) = self.cache.get(session_id) {
            return Ok(Some(session));
        }
        match self.store.load(session_id).await? {
            Some(json) => match serde_json::from_str::<SessionSnapshot>(&json) {
                Ok(snapshot) => Ok(Some(Session::from_snapshot(snapshot))),
                Err(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool, EngineError> {
        Ok(self.fetch_existing(session_id).await?.is_some())
    }

    /// `POST /interview/load` (§6): full chat histories per stimulus plus
    /// the merged tree. `None` if the session does not exist.
    pub async fn load_full(&self, session_id: &str) -> Result<Option<LoadedSession>, EngineError> {
        let Some(session) = self.fetch_existing(session_id).await? else {
            return Ok(None);
        };
        let merged_tree = session.merged_tree();
        let chat_histories = session
            .stimuli
            .iter()
            .filter_map(|s| session.handlers.get(s))
            .map(|h| (h.stimulus.clone(), h.chat_history.clone()))
            .collect();
        Ok(Some(LoadedSession { chat_histories, merged_tree }))
    }

    /// `POST /interview/save_order` (§6): records the per-session
    /// presentation order of stimuli. Unknown stimuli in `order` are
    /// ignored; stimuli missing from `order` keep their relative order and
    /// are appended after the requested ones.
    pub async fn save_order(&self, session_id: &str, order: &[String]) -> Result<(), EngineError> {
        let Some(mut session) = self.fetch_existing(session_id).await? else {
            return Ok(());
        };
        let mut new_order: Vec<String> = order.iter().filter(|s| session.stimuli.contains(s)).cloned().collect();
        for stimulus in &session.stimuli {
            if !new_order.contains(stimulus) {
                new_order.push(stimulus.clone());
            }
        }
        session.stimuli = new_order;
        self.persist(&session).await
    }

    async fn persist(&self, session: &Session) -> Result<(), EngineError> {
        let json = serde_json::to_string(&session.to_snapshot())
            .map_err(|e| crate::errors::StoreError::CorruptSnapshot {
                session_id: session.session_id.clone(),
                source: e,
            })?;
        self.store.save(&session.session_id, &json).await?;
        self.cache.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    /// Runs one turn (§2, §5): analyze -> graft -> queue -> stage ->
    /// generate -> persist. The per-session lock is held for the whole
    /// duration, including every LLM suspension point.
    #[instrument(skip(self, llm, config, message), fields(session_id, stimulus))]
    pub async fn handle_turn(
        &self,
        session_id: &str,
        stimulus: &str,
        message: &str,
        config: &ProjectConfig,
        llm: &dyn LlmProvider,
    ) -> Result<TurnResponse, EngineError> {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load_or_create(session_id, config).await?;
        let handler = session
            .handlers
            .entry(stimulus.to_string())
            .or_insert_with(|| ChatHandler::new(session_id.to_string(), config.topic.clone(), stimulus, config));

        let thresholds = SimilarityThresholds::default();
        let oracle = SimilarityOracle::new(thresholds, Some(llm)).with_provider_config(config.model_id.as_str(), &config.base_url);
        let analyzer = ElementAnalyzer::new(llm, config.model_id.as_str(), &config.base_url);
        let generator = QuestionGenerator::new(llm, config.model_id.as_str(), &config.base_url);

        handler.message_count += 1;

        let active_id = handler.graph.active_id().ok_or(crate::errors::GraphError::NoActiveNode)?;
        let active_label = handler
            .graph
            .get(active_id)
            .map(|n| n.label)
            .ok_or(crate::errors::GraphError::MissingNode(active_id))?;

        let mut touched_nodes = Vec::new();
        let mut topic_switch = None;

        if handler.stage.stage() == Stage::Initial || handler.stage.stage() == Stage::AskingForIdea {
            if handler.stage.stage() == Stage::Initial {
                handler.stage.advance(AdvanceContext {
                    required_element_satisfied: false,
                    queue_empty: true,
                    values_limit_tripped: false,
                    real_node_produced_this_round: false,
                    node_count: handler.graph.node_count(),
                    min_nodes: handler.min_nodes,
                })?;
            }

            let check = analyzer.check_idea(message).await.unwrap_or(crate::analyzer::IdeaCheck {
                is_idea: false,
                is_relevant: false,
                summary: message.chars().take(50).collect(),
            });
            handler.content_message_count += 1;

            if check.is_relevant {
                let root = handler.graph.root_id();
                let idea = handler.graph.add_child(root, NodeLabel::Idea, check.summary)?;
                handler.graph.set_active(idea);
                touched_nodes.push(idea);
                handler.stage.advance(AdvanceContext {
                    required_element_satisfied: true,
                    queue_empty: true,
                    values_limit_tripped: false,
                    real_node_produced_this_round: true,
                    node_count: handler.graph.node_count(),
                    min_nodes: handler.min_nodes,
                })?;
            } else if handler.graph.get(active_id).is_some_and(|n| n.label == NodeLabel::Irrelevant) {
                crate::updater::irrelevant::stack_onto(&mut handler.graph, active_id, &check.summary);
                touched_nodes.push(active_id);
            } else {
                let dummy = crate::updater::irrelevant::create_dummy(&mut handler.graph, active_id, &check.summary);
                handler.graph.set_active(dummy);
                touched_nodes.push(dummy);
            }
        } else {
            handler.content_message_count += 1;
            let path = generator_path(handler, active_id);
            let analysis = analyzer
                .analyze(message, stimulus, &handler.topic, &path, active_label)
                .await
                .unwrap_or_default();

            let stimulus_root = handler.graph.root_id();
            let outcome = TreeUpdater::apply(
                &mut handler.graph,
                &mut handler.queue,
                &oracle,
                stimulus_root,
                active_id,
                active_label,
                analysis,
                handler.message_count,
            )
            .await?;
            touched_nodes.extend(outcome.created.iter().copied());
            touched_nodes.extend(outcome.reused.iter().copied());

            for &id in &outcome.created {
                if let Some(node) = handler.graph.get(id) {
                    handler.queue.enqueue(&handler.graph, id, node.label);
                }
            }

            let required = crate::stage::required_element_present(&handler.graph, active_id, active_label);
            topic_switch = handler.queue.record_turn_outcome(&mut handler.graph, required);

            handler.stage.advance(AdvanceContext {
                required_element_satisfied: required,
                queue_empty: handler.queue.is_empty(),
                values_limit_tripped: values_limit_tripped(handler.value_count(), handler.n_values_max),
                real_node_produced_this_round: outcome.produced_real_element,
                node_count: handler.graph.node_count(),
                min_nodes: handler.min_nodes,
            })?;
        }

        handler.chat_history.push(ChatHistoryEntry {
            role: "user".to_string(),
            content: message.to_string(),
            node_ids: touched_nodes.clone(),
        });

        let gate_tripped_before = values_limit_tripped(handler.value_count(), handler.n_values_max);
        let next = if gate_tripped_before && handler.stage.stage() == Stage::ValuesLimitReached {
            handler.is_finished = true;
            QuestionGenerator::values_limit_acknowledgment()
        } else {
            let active_id = handler.graph.active_id().unwrap_or(active_id);
            let active_label = handler.graph.get(active_id).map(|n| n.label).unwrap_or(active_label);
            let path_labels = crate::generator::render_path_to_root(&handler.graph, active_id);
            let active_content = handler.graph.get(active_id).map(|n| n.conclusion.clone()).unwrap_or_default();
            let parent_content = handler.graph.latest_parent(active_id).and_then(|p| handler.graph.get(p)).map(|n| n.conclusion.as_str());
            let ctx = PromptContext {
                topic: &handler.topic,
                stimulus,
                stage: handler.stage.stage(),
                active_label,
                active_content: &active_content,
                path_to_root: path_labels,
                parent_content,
                latest_user_response: Some(message),
            };
            let values_limit_after = values_limit_tripped(handler.value_count(), handler.n_values_max);
            generator
                .generate(&ctx, handler.queue.unchanged_count(), topic_switch.as_ref(), values_limit_after)
                .await
                .unwrap_or_else(|_| safe_fallback())
        };

        handler.chat_history.push(ChatHistoryEntry {
            role: "system".to_string(),
            content: next.next_question.clone(),
            node_ids: vec![],
        });

        self.persist(&session).await?;

        Ok(TurnResponse { next, touched_nodes })
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.cache.remove(session_id);
        self.store.delete(session_id).await?;
        Ok(())
    }
}

fn generator_path(handler: &ChatHandler, active: NodeId) -> String {
    crate::generator::render_path_to_root(&handler.graph, active).join(" > ")
}

/// §7: the next question is always populated, even on internal errors,
/// with a safe prompt and `AskingIntervieweeFor=fallback`.
fn safe_fallback() -> GeneratedQuestion {
    GeneratedQuestion {
        next_question: "Could you tell me more about that?".to_string(),
        asking_interviewee_for: "fallback".to_string(),
        thought_process: "recovered from an internal classification or generation failure".to_string(),
        end_of_interview: false,
        completion_reason: None,
    }
}
