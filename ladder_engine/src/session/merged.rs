//! Builds the *merged* response tree (§6): a synthetic TOPIC root with each
//! per-stimulus root as a child, subroots carrying an `order_index`, and
//! backwards relations already resolved into forward edges via
//! [`crate::graph::Graph::export`].

use serde::Serialize;

use crate::graph::NodeLabel;
use crate::ids::NodeId;

use super::Session;

#[derive(Clone, Debug, Serialize)]
pub struct MergedNode {
    pub id: NodeId,
    pub label: NodeLabel,
    pub conclusion: String,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub order_index: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MergedTree {
    pub root_node_id: NodeId,
    pub nodes: Vec<MergedNode>,
}

impl Session {
    /// Builds the merged, client-facing tree (§6 "Response Tree field").
    /// Per-stimulus presentation order follows `self.stimuli`'s current
    /// order, which `save_order` mutates directly.
    #[must_use]
    pub fn merged_tree(&self) -> MergedTree {
        let topic_root = NodeId::new();
        let mut nodes = Vec::new();
        let mut subroot_ids = Vec::new();

        for (order_index, stimulus) in self.stimuli.iter().enumerate() {
            let Some(handler) = self.handlers.get(stimulus) else {
                continue;
            };
            let exported = handler.graph.export();
            subroot_ids.push(exported.root_id);

            for node in exported.nodes {
                let mut parents = node.parents.clone();
                let order = if node.id == exported.root_id {
                    parents.push(topic_root);
                    Some(order_index as u32)
                } else {
                    None
                };
                nodes.push(MergedNode {
                    id: node.id,
                    label: node.label,
                    conclusion: node.conclusion,
                    parents,
                    children: node.children,
                    order_index: order,
                });
            }
        }

        nodes.push(MergedNode {
            id: topic_root,
            label: NodeLabel::Topic,
            conclusion: self.topic.clone(),
            parents: Vec::new(),
            children: subroot_ids,
            order_index: None,
        });

        MergedTree {
            root_node_id: topic_root,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;

    fn config() -> ProjectConfig {
        ProjectConfig {
            topic: "music apps".to_string(),
            stimuli: vec!["a".to_string(), "b".to_string()],
            n_values_max: -1,
            min_nodes: 1,
            max_retries: 3,
            language_hint: None,
            model_id: "m".to_string(),
            base_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn merges_per_stimulus_roots_under_synthetic_topic() {
        let session = Session::new("s1".to_string(), &config());
        let tree = session.merged_tree();
        let topic_node = tree.nodes.iter().find(|n| n.id == tree.root_node_id).unwrap();
        assert_eq!(topic_node.children.len(), 2);
        let ordered: Vec<_> = tree.nodes.iter().filter_map(|n| n.order_index).collect();
        assert_eq!(ordered, vec![0, 1]);
    }
}
