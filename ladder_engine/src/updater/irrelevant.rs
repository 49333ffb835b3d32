//! IRRELEVANT node handling (§4.4), grounded on the original
//! `irrelevant_node_handler.py`: the first irrelevant answer creates a
//! dummy node; subsequent ones stack onto it; the next relevant answer
//! transforms it in place.

use crate::graph::{Graph, NodeLabel};
use crate::ids::NodeId;

/// Creates a new IRRELEVANT child under `parent` with the `DUMMY-k:` prefix,
/// `k` being one more than the count of existing IRRELEVANT nodes.
pub fn create_dummy(graph: &mut Graph, parent: NodeId, summary: &str) -> NodeId {
    let counter = graph.nodes_by_label(NodeLabel::Irrelevant).len() + 1;
    let conclusion = format!("DUMMY-{counter}: {summary}");
    graph
        .add_child(parent, NodeLabel::Irrelevant, conclusion)
        .expect("parent already validated present")
}

/// Stacks a new irrelevant summary onto an existing dummy (§4.4): appends
/// `| STACK-k: <summary>`, overriding to a length-bounded `(Total: k)` form
/// once the accumulated conclusion exceeds 200 characters.
pub fn stack_onto(graph: &mut Graph, dummy: NodeId, summary: &str) {
    let Some(current) = graph.get(dummy).map(|n| n.conclusion.clone()) else {
        return;
    };
    let counter = extract_counter(&current) + 1;
    let candidate = format!("{current} | STACK-{counter}: {summary}");
    let new_conclusion = if candidate.chars().count() > 200 {
        let original_part: String = current.chars().take(120).collect();
        let truncated_summary: String = summary.chars().take(50).collect();
        format!("{original_part} | STACK-{counter}: {truncated_summary}... (Total: {counter})")
    } else {
        candidate
    };
    graph.set_conclusion(dummy, new_conclusion);
}

/// Parses the stacking counter out of a dummy/stacked conclusion. Fallback
/// order matches the source: `(Total:` substring, else a count of
/// `STACK-` occurrences, else the `DUMMY-` prefix, defaulting to 1.
pub fn extract_counter(conclusion: &str) -> usize {
    if let Some(pos) = conclusion.find("(Total:") {
        let rest = &conclusion[pos + "(Total:".len()..];
        if let Some(n) = rest.trim().split(')').next().and_then(|s| s.trim().parse().ok()) {
            return n;
        }
    }
    let stack_count = conclusion.matches("STACK-").count();
    if stack_count > 0 {
        return stack_count;
    }
    if let Some(pos) = conclusion.find("DUMMY-") {
        let rest = &conclusion[pos + "DUMMY-".len()..];
        if let Some(n) = rest.split(':').next().and_then(|s| s.trim().parse().ok()) {
            return n;
        }
    }
    1
}

/// Transforms a dummy node in place once a relevant answer arrives
/// (§4.4): its trace is inherited by the new label/conclusion and its
/// parent linkage is replaced with one appropriate for the new label. If
/// the dummy's sole parent is the STIMULUS the new label becomes IDEA;
/// otherwise the caller has already resolved `new_parent` via the normal
/// parent-search chain.
pub fn transform_in_place(
    graph: &mut Graph,
    dummy: NodeId,
    new_label: NodeLabel,
    new_conclusion: &str,
    new_parent: NodeId,
) {
    let old_parent = graph.get(dummy).and_then(|n| n.parents.first().copied());

    graph.set_conclusion(dummy, new_conclusion.to_string());
    graph.set_label(dummy, new_label);
    let _ = graph.reparent(dummy, old_parent, new_parent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_dummy_uses_counter_one() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let dummy = create_dummy(&mut g, root, "hmm");
        assert_eq!(g.get(dummy).unwrap().conclusion, "DUMMY-1: hmm");
    }

    #[test]
    fn stacking_appends_and_increments_counter() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let dummy = create_dummy(&mut g, root, "hmm");
        stack_onto(&mut g, dummy, "ok");
        stack_onto(&mut g, dummy, "???");
        let conclusion = &g.get(dummy).unwrap().conclusion;
        assert_eq!(conclusion, "DUMMY-1: hmm | STACK-2: ok | STACK-3: ???");
    }

    #[test]
    fn extract_counter_fallback_chain() {
        assert_eq!(extract_counter("DUMMY-1: hmm"), 1);
        assert_eq!(extract_counter("DUMMY-1: hmm | STACK-2: ok"), 2);
        assert_eq!(extract_counter("... (Total: 9)"), 9);
    }
}
