//! Similarity Oracle (C2): lexical + LLM-backed equivalence judgements used
//! when grafting a new node would otherwise duplicate an existing one.

use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::graph::{Graph, NodeLabel};
use crate::ids::NodeId;
use crate::llm::{chat_json, ChatMessage, ChatRequest, LlmProvider, ResponseFormatStrategy};

/// Tunables the source baked in as magic numbers (Jaccard thresholds, LLM
/// confidence floor). Exposed as constructor-injected values per the Open
/// Question resolution in `SPEC_FULL.md` §9.
#[derive(Clone, Copy, Debug)]
pub struct SimilarityThresholds {
    pub jaccard_attribute: f64,
    pub jaccard_consequence: f64,
    pub jaccard_value: f64,
    pub llm_confidence_floor: u8,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            jaccard_attribute: 0.35,
            jaccard_consequence: 0.30,
            jaccard_value: 0.25,
            llm_confidence_floor: 70,
        }
    }
}

impl SimilarityThresholds {
    fn jaccard_for(self, label: NodeLabel) -> f64 {
        match label {
            NodeLabel::Attribute => self.jaccard_attribute,
            NodeLabel::Consequence => self.jaccard_consequence,
            NodeLabel::Value => self.jaccard_value,
            _ => self.jaccard_attribute,
        }
    }
}

/// Outcome of attempting to graft `(label, text)` under `effective_parent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraftDecision {
    /// An identical node already exists under the effective parent; the
    /// caller must not graft a new node.
    DuplicateUnderParent(NodeId),
    /// A semantically equivalent node exists elsewhere; share it as an
    /// additional parent edge instead of creating a new node.
    ShareExisting(NodeId),
    /// No match found; the caller should create a brand new node.
    NoMatch,
}

/// One candidate's LLM-judged equivalence verdict (Tier 2, §4.2).
#[derive(Clone, Debug)]
pub struct LlmSimilarityVerdict {
    pub candidate: NodeId,
    pub should_merge: bool,
    pub confidence: u8,
    #[allow(dead_code)]
    pub explanation: String,
}

pub struct SimilarityOracle<'a> {
    thresholds: SimilarityThresholds,
    llm: Option<&'a dyn LlmProvider>,
    model: String,
    strategy: ResponseFormatStrategy,
}

impl<'a> SimilarityOracle<'a> {
    #[must_use]
    pub fn new(thresholds: SimilarityThresholds, llm: Option<&'a dyn LlmProvider>) -> Self {
        Self {
            thresholds,
            llm,
            model: String::new(),
            strategy: ResponseFormatStrategy::PromptInstructionOnly,
        }
    }

    /// Attaches the provider configuration used to build Tier 2 requests.
    /// Needed only when `llm` is `Some`; a bare `new` is enough for
    /// lexical-only use (e.g. in tests).
    #[must_use]
    pub fn with_provider_config(mut self, model: impl Into<String>, base_url: &str) -> Self {
        self.model = model.into();
        self.strategy = ResponseFormatStrategy::detect(base_url);
        self
    }

    /// Tier 1: synchronous lexical similarity (§4.2). Exact match is
    /// case-normalized; substring match only applies to inputs of at most 30
    /// characters; otherwise falls back to Jaccard over word tokens of at
    /// least 3 characters, thresholded per label.
    #[must_use]
    pub fn lexically_similar(&self, label: NodeLabel, a: &str, b: &str) -> LexicalVerdict {
        let (na, nb) = (normalize(a), normalize(b));
        if na == nb {
            return LexicalVerdict::Exact;
        }
        if na.len() <= 30 && nb.len() <= 30 && (nb.contains(&na) || na.contains(&nb)) {
            return LexicalVerdict::Similar;
        }
        let ta = tokenize(&na);
        let tb = tokenize(&nb);
        if ta.is_empty() || tb.is_empty() {
            return LexicalVerdict::None;
        }
        let score = jaccard(&ta, &tb);
        if score >= self.thresholds.jaccard_for(label) {
            LexicalVerdict::Similar
        } else {
            LexicalVerdict::None
        }
    }

    /// Full decision policy (§4.2 steps 1-6).
    pub async fn decide_graft(
        &self,
        graph: &Graph,
        effective_parent: NodeId,
        label: NodeLabel,
        text: &str,
    ) -> GraftDecision {
        let candidates = graph.nodes_by_label(label);
        if candidates.is_empty() {
            return GraftDecision::NoMatch;
        }

        let mut same_parent_exact = None;
        let mut same_parent_similar = Vec::new();
        let mut diff_parent_exact = None;
        let mut diff_parent_similar = Vec::new();

        for &candidate in &candidates {
            let Some(node) = graph.get(candidate) else {
                continue;
            };
            let is_same_parent = candidate == effective_parent
                || node.parents.contains(&effective_parent)
                || graph.is_ancestor_of(candidate, effective_parent);
            let verdict = self.lexically_similar(label, &node.conclusion, text);

            match (is_same_parent, verdict) {
                (true, LexicalVerdict::Exact) => {
                    same_parent_exact.get_or_insert(candidate);
                }
                (true, LexicalVerdict::Similar) => same_parent_similar.push(candidate),
                (false, LexicalVerdict::Exact) => {
                    diff_parent_exact.get_or_insert(candidate);
                }
                (false, LexicalVerdict::Similar) => diff_parent_similar.push(candidate),
                (_, LexicalVerdict::None) => {}
            }
        }

        // Step 2: exact same-parent match means the caller must not graft.
        if let Some(existing) = same_parent_exact {
            return GraftDecision::DuplicateUnderParent(existing);
        }

        // Step 4: batched Tier 2 judgement over every lexical candidate.
        if let Some(llm) = self.llm {
            let mut lexical_candidates: Vec<NodeId> = same_parent_similar
                .iter()
                .chain(diff_parent_exact.iter())
                .chain(diff_parent_similar.iter())
                .copied()
                .collect::<FxHashSet<_>>()
                .into_iter()
                .collect();
            lexical_candidates.sort();

            if !lexical_candidates.is_empty() {
                let texts: Vec<(NodeId, String)> = lexical_candidates
                    .iter()
                    .filter_map(|&id| graph.get(id).map(|n| (id, n.conclusion.clone())))
                    .collect();
                if let Ok(verdicts) = judge_similarity_batch(llm, &self.model, self.strategy, text, &texts).await {
                    for verdict in &verdicts {
                        let is_same_parent = same_parent_similar.contains(&verdict.candidate);
                        if verdict.confidence < self.thresholds.llm_confidence_floor {
                            continue;
                        }
                        if is_same_parent && !verdict.should_merge {
                            return GraftDecision::DuplicateUnderParent(verdict.candidate);
                        }
                        if !is_same_parent && verdict.should_merge {
                            return GraftDecision::ShareExisting(verdict.candidate);
                        }
                    }
                }
            }
        }

        // Step 5: fall back to exact different-parent match.
        if let Some(existing) = diff_parent_exact {
            return GraftDecision::ShareExisting(existing);
        }

        GraftDecision::NoMatch
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexicalVerdict {
    Exact,
    Similar,
    None,
}

#[derive(Deserialize)]
struct RawVerdict {
    candidate_index: usize,
    should_merge: bool,
    confidence: u8,
    #[serde(default)]
    explanation: String,
}

#[derive(Deserialize)]
struct RawVerdicts {
    verdicts: Vec<RawVerdict>,
}

/// Batches every lexical candidate into a single Tier 2 call (§4.2 step 4):
/// one round trip judges the whole candidate set instead of one per
/// candidate.
async fn judge_similarity_batch(
    llm: &dyn LlmProvider,
    model: &str,
    strategy: ResponseFormatStrategy,
    new_text: &str,
    candidates: &[(NodeId, String)],
) -> Result<Vec<LlmSimilarityVerdict>, crate::errors::LlmError> {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, (_, text))| format!("{i}. {text}"))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "New statement: \"{new_text}\"\n\nExisting candidates:\n{listing}\n\n\
         For each candidate, judge whether it means the same thing as the new statement. \
         Respond as JSON: {{\"verdicts\": [{{\"candidate_index\": <int>, \"should_merge\": <bool>, \
         \"confidence\": <0-100 int>, \"explanation\": \"<short reason>\"}}]}}"
    );
    let request = ChatRequest {
        messages: vec![
            ChatMessage::system(
                "You judge whether two interview statements express the same underlying idea.",
            ),
            ChatMessage::user(prompt),
        ],
        model: model.to_string(),
        temperature: 0.0,
        schema_hint: Some("{\"verdicts\": [...]}".to_string()),
        strategy,
    };
    let value = chat_json(llm, request).await?;
    let raw: RawVerdicts = serde_json::from_value(value)
        .map_err(|e| crate::errors::LlmError::SchemaMismatch(e.to_string()))?;

    Ok(raw
        .verdicts
        .into_iter()
        .filter_map(|v| {
            candidates.get(v.candidate_index).map(|(id, _)| LlmSimilarityVerdict {
                candidate: *id,
                should_merge: v.should_merge,
                confidence: v.confidence,
                explanation: v.explanation,
            })
        })
        .collect())
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn tokenize(s: &str) -> FxHashSet<String> {
    s.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() >= 3)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &FxHashSet<String>, b: &FxHashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        let oracle = SimilarityOracle::new(SimilarityThresholds::default(), None);
        assert_eq!(
            oracle.lexically_similar(NodeLabel::Attribute, "Offline Playback", "offline playback"),
            LexicalVerdict::Exact
        );
    }

    #[test]
    fn jaccard_threshold_is_label_dependent() {
        let oracle = SimilarityOracle::new(SimilarityThresholds::default(), None);
        // Shares "automatic playlist downloads" tokens heavily.
        let verdict = oracle.lexically_similar(
            NodeLabel::Attribute,
            "automatic playlist downloads before trips",
            "automatic playlist downloads for commutes",
        );
        assert_eq!(verdict, LexicalVerdict::Similar);
    }

    #[tokio::test]
    async fn no_candidates_is_no_match() {
        let g = Graph::new_for_stimulus("s");
        let oracle = SimilarityOracle::new(SimilarityThresholds::default(), None);
        let decision = oracle
            .decide_graft(&g, g.root_id(), NodeLabel::Attribute, "anything")
            .await;
        assert_eq!(decision, GraftDecision::NoMatch);
    }
}
