//! JSON snapshot format (§6). Plain `serde` structs mirroring the wire
//! shape exactly; conversion to/from the live [`Graph`]/[`Queue`]/
//! [`StageController`] lives in `super::handler`.

use serde::{Deserialize, Serialize};

use crate::graph::{NodeLabel, TraceElement};
use crate::ids::NodeId;
use crate::stage::Stage;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub label: NodeLabel,
    pub conclusion: String,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub backwards_relations: Vec<NodeId>,
    pub trace: Vec<TraceSnapshot>,
    pub is_value_path_completed: bool,
    pub created_ns: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceSnapshot {
    pub interaction_id: Option<u64>,
    pub node_id: Option<NodeId>,
}

impl From<&TraceElement> for TraceSnapshot {
    fn from(t: &TraceElement) -> Self {
        Self {
            interaction_id: t.interaction_id,
            node_id: t.back_reference,
        }
    }
}

impl From<&TraceSnapshot> for TraceElement {
    fn from(t: &TraceSnapshot) -> Self {
        Self {
            interaction_id: t.interaction_id,
            back_reference: t.node_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root_node_id: NodeId,
    pub active_node_id: Option<NodeId>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStub {
    pub id: NodeId,
    pub label: NodeLabel,
    pub conclusion: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<NodeStub>,
    pub active_node: Option<NodeStub>,
    pub active_node_unchanged_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub stage: String,
    pub message_count: u64,
    pub content_message_count: u64,
}

impl StateSnapshot {
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        crate::stage::decode_stage(&self.stage)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatHistoryEntrySnapshot {
    pub role: String,
    pub content: String,
    pub node_ids: Vec<NodeId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatHandlerSnapshot {
    pub topic: String,
    pub stimulus: String,
    pub session_id: String,
    pub chat_history: Vec<ChatHistoryEntrySnapshot>,
    pub tree: TreeSnapshot,
    pub queue_manager: QueueSnapshot,
    pub state_manager: StateSnapshot,
    pub is_finished: bool,
    pub asked_again_for_attributes: bool,
    pub n_values_max: i64,
    pub max_retries: i64,
    pub min_nodes: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub topic: String,
    pub stimuli: Vec<String>,
    pub n_values_max: i64,
    pub max_retries: i64,
    pub chat_sessions: Vec<ChatHandlerSnapshot>,
}
