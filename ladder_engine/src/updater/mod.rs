//! Tree Updater (C4): applies the analyzer's output to the graph —
//! filtering, pruning, grafting, IRRELEVANT stacking, and backwards-relation
//! recording.

pub mod irrelevant;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::instrument;

use crate::analyzer::{AnalysisResult, AnalyzedElement, RelationType};
use crate::errors::GraphError;
use crate::graph::{Graph, NodeLabel, TraceElement, AUTO_NODE_PREFIX};
use crate::ids::NodeId;
use crate::queue::Queue;
use crate::similarity::{GraftDecision, SimilarityOracle};

/// What the turn produced, consumed by the Stage Controller's
/// required-element test and the Question Generator's context (§4.4-§4.7).
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub created: Vec<NodeId>,
    pub reused: Vec<NodeId>,
    /// True if at least one non-IRRELEVANT node was produced this turn.
    pub produced_real_element: bool,
}

pub struct TreeUpdater;

impl TreeUpdater {
    /// Applies one turn's classified elements to the graph (§4.4). `active`
    /// is the graph's active node at turn start; `stimulus_root` anchors
    /// first-content-message grafting.
    #[instrument(skip(graph, queue, oracle, analysis), fields(active_label = %active_label))]
    pub async fn apply(
        graph: &mut Graph,
        queue: &mut Queue,
        oracle: &SimilarityOracle<'_>,
        stimulus_root: NodeId,
        active: NodeId,
        active_label: NodeLabel,
        mut analysis: AnalysisResult,
        interaction_id: u64,
    ) -> Result<UpdateOutcome, GraphError> {
        filter_acv_chains(&mut analysis);
        if active_label == NodeLabel::Consequence {
            prune_disconnected_consequences(&mut analysis);
        }

        let mut outcome = UpdateOutcome::default();
        let touched: FxHashSet<usize> = analysis
            .relations
            .iter()
            .flat_map(|r| [r.source_index, r.target_index])
            .collect();

        let mut resolved: FxHashMap<usize, NodeId> = FxHashMap::default();

        // Relations first: source resolved (or skipped per the special
        // cases), then each new target grafted under it.
        for relation in &analysis.relations {
            let Some(source_element) = analysis.elements.get(relation.source_index) else {
                continue;
            };
            let Some(target_element) = analysis.elements.get(relation.target_index) else {
                continue;
            };

            if active_label == NodeLabel::Consequence && source_element.category == NodeLabel::Attribute {
                continue; // A-after-C context mismatch: skip the whole relation.
            }

            let skip_source = (active_label == NodeLabel::Attribute
                && matches!(source_element.category, NodeLabel::Attribute | NodeLabel::Consequence))
                || (active_label == NodeLabel::Consequence
                    && matches!(source_element.category, NodeLabel::Consequence | NodeLabel::Value));

            let source_id = if skip_source {
                None
            } else if let Some(&id) = resolved.get(&relation.source_index) {
                Some(id)
            } else if source_element.is_new_element {
                let parent = select_parent(graph, source_element.category, active_label, active, stimulus_root);
                let Some(parent) = parent else { continue };
                let id = graft(graph, oracle, parent, source_element, &mut outcome).await?;
                resolved.insert(relation.source_index, id);
                Some(id)
            } else {
                None
            };

            if target_element.is_new_element && !resolved.contains_key(&relation.target_index) {
                let parent = match source_id {
                    Some(id) => Some(id),
                    None => select_parent(graph, target_element.category, active_label, active, stimulus_root),
                };
                if let Some(parent) = parent {
                    let id = graft(graph, oracle, parent, target_element, &mut outcome).await?;
                    resolved.insert(relation.target_index, id);
                    if relation.relation_type == RelationType::ConsequenceToValue {
                        graph.mark_value_path_completed(id);
                    }
                }
            } else if let (Some(source_id), Some(&target_id)) = (source_id, resolved.get(&relation.target_index)) {
                record_relation(graph, source_id, target_id, active_label, active)?;
            }
        }

        // Independent new elements: not touched by any surviving relation.
        for (index, element) in analysis.elements.iter().enumerate() {
            if touched.contains(&index) || !element.is_new_element {
                continue;
            }
            if element.category == NodeLabel::Irrelevant {
                handle_irrelevant(graph, active, &element.summary, interaction_id, &mut outcome);
                continue;
            }
            let Some(parent) = select_parent(graph, element.category, active_label, active, stimulus_root) else {
                continue;
            };
            graft(graph, oracle, parent, element, &mut outcome).await?;
        }

        Ok(outcome)
    }
}

/// Records that `source` and `target` are linked without re-grafting
/// (relation referenced an already-resolved node on both ends). Also
/// records the backwards relation when an A is discovered while active is
/// C (§4.4).
fn record_relation(
    graph: &mut Graph,
    source: NodeId,
    target: NodeId,
    active_label: NodeLabel,
    active: NodeId,
) -> Result<(), GraphError> {
    if graph.is_ancestor_of(target, source) {
        return Ok(()); // cycle prevention (§4.4).
    }
    graph.add_existing_as_child(source, target)?;
    if active_label == NodeLabel::Consequence {
        graph.add_backwards_relation(active, target);
    }
    Ok(())
}

/// Grafts one analyzed element, deduplicating via the Similarity Oracle
/// (§4.2, §4.4).
async fn graft(
    graph: &mut Graph,
    oracle: &SimilarityOracle<'_>,
    parent: NodeId,
    element: &AnalyzedElement,
    outcome: &mut UpdateOutcome,
) -> Result<NodeId, GraphError> {
    match oracle.decide_graft(graph, parent, element.category, &element.summary).await {
        GraftDecision::DuplicateUnderParent(existing) => {
            outcome.reused.push(existing);
            Ok(existing)
        }
        GraftDecision::ShareExisting(existing) => {
            if graph.is_ancestor_of(existing, parent) {
                outcome.reused.push(existing);
                return Ok(existing);
            }
            graph.add_existing_as_child(parent, existing)?;
            outcome.reused.push(existing);
            outcome.produced_real_element = true;
            Ok(existing)
        }
        GraftDecision::NoMatch => {
            // Enqueueing (§4.5) is the Session Manager's job once the
            // whole turn's grafts are known.
            let id = graph.add_child(parent, element.category, element.summary.clone())?;
            outcome.created.push(id);
            outcome.produced_real_element = true;
            Ok(id)
        }
    }
}

/// Parent selection when no explicit parent is supplied (§4.4): hierarchy
/// match first, then semantic search, then AUTO-node synthesis.
fn select_parent(
    graph: &mut Graph,
    category: NodeLabel,
    active_label: NodeLabel,
    active: NodeId,
    stimulus_root: NodeId,
) -> Option<NodeId> {
    if active_label.permits_child(category) {
        return Some(active);
    }

    match category {
        NodeLabel::Attribute => {
            // Latest IDEA under the current stimulus ancestor.
            graph
                .nodes_by_label(NodeLabel::Idea)
                .into_iter()
                .filter(|&idea| graph.is_ancestor_of(stimulus_root, idea) || stimulus_root == idea)
                .max_by_key(|&idea| graph.get(idea).map(|n| n.created_tick).unwrap_or(0))
                .or_else(|| auto_chain(graph, stimulus_root, category))
        }
        NodeLabel::Consequence => {
            if matches!(active_label, NodeLabel::Attribute | NodeLabel::Consequence) {
                Some(active)
            } else {
                auto_chain(graph, active, category)
            }
        }
        NodeLabel::Value => {
            if active_label == NodeLabel::Consequence {
                Some(active)
            } else {
                auto_chain(graph, active, category)
            }
        }
        _ => Some(active),
    }
}

/// Synthesizes AUTO- intermediate nodes to repair a broken chain (e.g. V
/// found while active is A: create an `AUTO-` CONSEQUENCE in between,
/// §4.4).
fn auto_chain(graph: &mut Graph, from: NodeId, target_category: NodeLabel) -> Option<NodeId> {
    let from_label = graph.get(from)?.label;
    let mut cursor = from;
    let mut cursor_label = from_label;
    loop {
        if cursor_label.permits_child(target_category) {
            return Some(cursor);
        }
        let next_label = match cursor_label {
            NodeLabel::Stimulus => NodeLabel::Idea,
            NodeLabel::Idea => NodeLabel::Attribute,
            NodeLabel::Attribute => NodeLabel::Consequence,
            NodeLabel::Consequence => NodeLabel::Consequence,
            _ => return None,
        };
        if next_label == cursor_label {
            return None; // no further progress possible
        }
        let conclusion = format!("{AUTO_NODE_PREFIX}{next_label}");
        cursor = graph.add_child(cursor, next_label, conclusion).ok()?;
        cursor_label = next_label;
    }
}

fn handle_irrelevant(
    graph: &mut Graph,
    active: NodeId,
    summary: &str,
    interaction_id: u64,
    outcome: &mut UpdateOutcome,
) {
    if graph.get(active).is_some_and(|n| n.label == NodeLabel::Irrelevant) {
        irrelevant::stack_onto(graph, active, summary);
        outcome.reused.push(active);
    } else {
        let dummy = irrelevant::create_dummy(graph, active, summary);
        graph.push_trace(
            dummy,
            TraceElement {
                interaction_id: Some(interaction_id),
                back_reference: None,
            },
        );
        outcome.created.push(dummy);
    }
}

/// Transforms an IRRELEVANT dummy into its resolved label once a relevant
/// answer arrives (§4.4). Exposed for the Session Manager to call when the
/// active node is a dummy and the new turn produced a real element.
pub fn transform_dummy(graph: &mut Graph, dummy: NodeId, new_label: NodeLabel, new_conclusion: &str) {
    let parent_is_stimulus = graph
        .get(dummy)
        .and_then(|n| n.parents.first().copied())
        .and_then(|p| graph.get(p).map(|n| n.label))
        == Some(NodeLabel::Stimulus);
    let effective_label = if parent_is_stimulus { NodeLabel::Idea } else { new_label };
    let new_parent = graph
        .get(dummy)
        .and_then(|n| n.parents.first().copied())
        .unwrap_or_else(|| graph.root_id());
    irrelevant::transform_in_place(graph, dummy, effective_label, new_conclusion, new_parent);
}

/// ACV-chain filtering (§4.4a): strips free-standing V elements (and their
/// incoming C->V relations) when at least one complete A-to-V chain exists
/// in the same turn. Reachability is computed over the extracted relation
/// set, not the persistent graph.
fn filter_acv_chains(analysis: &mut AnalysisResult) {
    let value_indices: Vec<usize> = analysis
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| e.category == NodeLabel::Value)
        .map(|(i, _)| i)
        .collect();
    if value_indices.is_empty() {
        return;
    }

    let reaches_from_attribute = |target: usize, relations: &[crate::analyzer::CausalRelation]| -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![target];
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                continue;
            }
            for r in relations {
                if r.target_index == cur {
                    if r.relation_type == RelationType::AttributeToConsequence {
                        return true;
                    }
                    stack.push(r.source_index);
                }
            }
        }
        false
    };

    let complete: FxHashSet<usize> = value_indices
        .iter()
        .copied()
        .filter(|&v| reaches_from_attribute(v, &analysis.relations))
        .collect();

    if complete.is_empty() {
        return; // no complete chain this turn; keep all Vs as-is.
    }

    let free_standing: FxHashSet<usize> = value_indices.into_iter().filter(|v| !complete.contains(v)).collect();
    if free_standing.is_empty() {
        return;
    }

    analysis.relations.retain(|r| !free_standing.contains(&r.target_index));
    for &idx in &free_standing {
        if let Some(e) = analysis.elements.get_mut(idx) {
            e.is_new_element = false;
        }
    }
}

/// Consequence pruning (§4.4b): when active is C, detected Cs not
/// connected (directly or transitively) to any detected V are removed.
fn prune_disconnected_consequences(analysis: &mut AnalysisResult) {
    let value_indices: FxHashSet<usize> = analysis
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| e.category == NodeLabel::Value)
        .map(|(i, _)| i)
        .collect();

    let reaches_value = |start: usize, relations: &[crate::analyzer::CausalRelation]| -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                continue;
            }
            for r in relations {
                if r.source_index == cur {
                    if value_indices.contains(&r.target_index) {
                        return true;
                    }
                    stack.push(r.target_index);
                }
            }
        }
        false
    };

    let disconnected: FxHashSet<usize> = analysis
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| e.category == NodeLabel::Consequence)
        .map(|(i, _)| i)
        .filter(|&i| !reaches_value(i, &analysis.relations))
        .collect();

    if disconnected.is_empty() {
        return;
    }
    analysis
        .relations
        .retain(|r| !disconnected.contains(&r.source_index) && !disconnected.contains(&r.target_index));
    for &idx in &disconnected {
        if let Some(e) = analysis.elements.get_mut(idx) {
            e.is_new_element = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CausalRelation;
    use crate::similarity::SimilarityThresholds;

    fn element(category: NodeLabel, summary: &str) -> AnalyzedElement {
        AnalyzedElement {
            category,
            summary: summary.to_string(),
            text_segment: summary.to_string(),
            is_new_element: true,
        }
    }

    #[tokio::test]
    async fn grafts_independent_new_attribute_under_idea() {
        let mut g = Graph::new_for_stimulus("offline playback");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "save playlists").unwrap();
        g.set_active(idea);
        let mut q = Queue::new(3);
        let oracle = SimilarityOracle::new(SimilarityThresholds::default(), None);

        let analysis = AnalysisResult {
            elements: vec![element(NodeLabel::Attribute, "automatic playlist downloads")],
            relations: vec![],
        };
        let outcome = TreeUpdater::apply(&mut g, &mut q, &oracle, root, idea, NodeLabel::Idea, analysis, 1)
            .await
            .unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert!(g.get(outcome.created[0]).unwrap().parents.contains(&idea));
    }

    #[test]
    fn filter_acv_chains_strips_free_standing_value() {
        let mut analysis = AnalysisResult {
            elements: vec![
                element(NodeLabel::Attribute, "a"),
                element(NodeLabel::Consequence, "c"),
                element(NodeLabel::Value, "complete-v"),
                element(NodeLabel::Value, "free-standing-v"),
            ],
            relations: vec![
                CausalRelation {
                    source_index: 0,
                    target_index: 1,
                    relation_type: RelationType::AttributeToConsequence,
                    explanation: String::new(),
                },
                CausalRelation {
                    source_index: 1,
                    target_index: 2,
                    relation_type: RelationType::ConsequenceToValue,
                    explanation: String::new(),
                },
            ],
        };
        filter_acv_chains(&mut analysis);
        assert!(analysis.elements[2].is_new_element);
        assert!(!analysis.elements[3].is_new_element);
    }
}
