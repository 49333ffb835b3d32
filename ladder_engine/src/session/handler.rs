//! One chat handler per stimulus (§3): owns a Graph, Queue, Stage
//! Controller, chat history, and the per-stimulus config consumed from the
//! project (§6).

use crate::config::ProjectConfig;
use crate::graph::{Graph, Node, NodeLabel, TraceElement};
use crate::ids::NodeId;
use crate::queue::Queue;
use crate::stage::{Stage, StageController};

use super::snapshot::{
    ChatHandlerSnapshot, ChatHistoryEntrySnapshot, NodeSnapshot, NodeStub, QueueSnapshot, StateSnapshot,
    TraceSnapshot, TreeSnapshot,
};

#[derive(Clone, Debug)]
pub struct ChatHistoryEntry {
    pub role: String,
    pub content: String,
    pub node_ids: Vec<NodeId>,
}

#[derive(Clone)]
pub struct ChatHandler {
    pub topic: String,
    pub stimulus: String,
    pub session_id: String,
    pub graph: Graph,
    pub queue: Queue,
    pub stage: StageController,
    pub chat_history: Vec<ChatHistoryEntry>,
    pub is_finished: bool,
    pub n_values_max: i64,
    pub max_retries: i64,
    pub min_nodes: usize,
    pub message_count: u64,
    pub content_message_count: u64,
}

impl ChatHandler {
    #[must_use]
    pub fn new(session_id: impl Into<String>, topic: impl Into<String>, stimulus: &str, config: &ProjectConfig) -> Self {
        Self {
            topic: topic.into(),
            stimulus: stimulus.to_string(),
            session_id: session_id.into(),
            graph: Graph::new_for_stimulus(stimulus),
            queue: Queue::new(config.max_unchanged_count()),
            stage: StageController::new(),
            chat_history: Vec::new(),
            is_finished: false,
            n_values_max: config.n_values_max,
            max_retries: config.max_retries,
            min_nodes: config.min_nodes,
            message_count: 0,
            content_message_count: 0,
        }
    }

    #[must_use]
    pub fn value_count(&self) -> usize {
        self.graph.nodes_by_label(NodeLabel::Value).len()
    }

    #[must_use]
    pub fn to_snapshot(&self) -> ChatHandlerSnapshot {
        let nodes: Vec<NodeSnapshot> = self
            .graph
            .nodes()
            .iter()
            .map(|n| NodeSnapshot {
                id: n.id,
                label: n.label,
                conclusion: n.conclusion.clone(),
                parents: n.parents.clone(),
                children: n.children.clone(),
                backwards_relations: n.backwards_relations.clone(),
                trace: n.trace.iter().map(TraceSnapshot::from).collect(),
                is_value_path_completed: n.value_path_completed,
                created_ns: n.created_tick,
            })
            .collect();

        let stub = |id: NodeId| -> Option<NodeStub> {
            self.graph.get(id).map(|n| NodeStub {
                id: n.id,
                label: n.label,
                conclusion: n.conclusion.clone(),
            })
        };

        ChatHandlerSnapshot {
            topic: self.topic.clone(),
            stimulus: self.stimulus.clone(),
            session_id: self.session_id.clone(),
            chat_history: self
                .chat_history
                .iter()
                .map(|e| ChatHistoryEntrySnapshot {
                    role: e.role.clone(),
                    content: e.content.clone(),
                    node_ids: e.node_ids.clone(),
                })
                .collect(),
            tree: TreeSnapshot {
                root_node_id: self.graph.root_id(),
                active_node_id: self.graph.active_id(),
                nodes,
            },
            queue_manager: QueueSnapshot {
                queue: self.queue.entries().iter().filter_map(|&id| stub(id)).collect(),
                active_node: self.graph.active_id().and_then(stub),
                active_node_unchanged_count: self.queue.unchanged_count(),
            },
            state_manager: StateSnapshot {
                stage: self.stage.stage().to_string(),
                message_count: self.message_count,
                content_message_count: self.content_message_count,
            },
            is_finished: self.is_finished,
            asked_again_for_attributes: self.stage.asked_again_for_attributes(),
            n_values_max: self.n_values_max,
            max_retries: self.max_retries,
            min_nodes: self.min_nodes,
        }
    }

    /// Reconstructs a handler from a snapshot (§6, §7: a corrupt snapshot
    /// is the caller's concern — this function trusts its input).
    #[must_use]
    pub fn from_snapshot(snapshot: ChatHandlerSnapshot) -> Self {
        let nodes: Vec<Node> = snapshot
            .tree
            .nodes
            .into_iter()
            .map(|n| Node {
                id: n.id,
                label: n.label,
                conclusion: n.conclusion,
                created_tick: n.created_ns,
                trace: n.trace.iter().map(TraceElement::from).collect(),
                value_path_completed: n.is_value_path_completed,
                parents: n.parents,
                children: n.children,
                backwards_relations: n.backwards_relations,
            })
            .collect();
        let graph = Graph::from_parts(snapshot.tree.root_node_id, snapshot.tree.active_node_id, nodes);

        let max_unchanged = if snapshot.max_retries < 0 {
            usize::MAX
        } else {
            snapshot.max_retries as usize
        };
        let queue = Queue::from_parts(
            snapshot.queue_manager.queue.into_iter().map(|s| s.id).collect(),
            snapshot.queue_manager.active_node_unchanged_count,
            max_unchanged,
        );

        let stage = snapshot
            .state_manager
            .stage()
            .unwrap_or(Stage::Initial);

        Self {
            topic: snapshot.topic,
            stimulus: snapshot.stimulus,
            session_id: snapshot.session_id,
            graph,
            queue,
            stage: StageController::from_parts(stage, snapshot.asked_again_for_attributes),
            chat_history: snapshot
                .chat_history
                .into_iter()
                .map(|e| ChatHistoryEntry {
                    role: e.role,
                    content: e.content,
                    node_ids: e.node_ids,
                })
                .collect(),
            is_finished: snapshot.is_finished,
            n_values_max: snapshot.n_values_max,
            max_retries: snapshot.max_retries,
            min_nodes: snapshot.min_nodes,
            message_count: snapshot.state_manager.message_count,
            content_message_count: snapshot.state_manager.content_message_count,
        }
    }
}
