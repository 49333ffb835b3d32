//! End-to-end session turns through the Session Manager, driven by a
//! scripted LLM provider so no network I/O occurs.

use ladder_engine::config::ProjectConfig;
use ladder_engine::graph::NodeLabel;
use ladder_engine::llm::ScriptedProvider;
use ladder_engine::session::{SessionCache, SessionManager};
use ladder_engine::store::InMemorySessionStore;

fn config() -> ProjectConfig {
    ProjectConfig {
        topic: "music apps".to_string(),
        stimuli: vec!["offline playback".to_string()],
        n_values_max: -1,
        min_nodes: 1,
        max_retries: 3,
        language_hint: None,
        model_id: "test-model".to_string(),
        base_url: "http://localhost:1234".to_string(),
    }
}

fn manager() -> SessionManager<InMemorySessionStore> {
    SessionManager::new(
        InMemorySessionStore::new(),
        SessionCache::new(16, std::time::Duration::from_secs(60)),
    )
}

#[tokio::test]
async fn relevant_first_message_creates_idea_node() {
    let provider = ScriptedProvider::new([
        r#"{"is_idea": true, "is_relevant": true, "summary": "save playlists offline"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "What feature matters most?", "AskingIntervieweeFor": "an attribute", "ThoughtProcess": "probing for attributes", "EndOfInterview": false}}"#.to_string(),
    ]);
    let manager = manager();
    let config = config();

    let turn = manager
        .handle_turn("s1", "offline playback", "I want to save playlists for offline listening.", &config, &provider)
        .await
        .unwrap();

    assert!(!turn.next.next_question.is_empty());
    assert_eq!(turn.touched_nodes.len(), 1);

    let loaded = manager.load_full("s1").await.unwrap().unwrap();
    let idea_present = loaded
        .merged_tree
        .nodes
        .iter()
        .any(|n| n.label == NodeLabel::Idea && n.conclusion == "save playlists offline");
    assert!(idea_present);
}

#[tokio::test]
async fn irrelevant_first_message_still_produces_a_next_question() {
    let provider = ScriptedProvider::new([
        r#"{"is_idea": false, "is_relevant": false, "summary": "greeting"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "Could you tell me about an idea for this stimulus?", "AskingIntervieweeFor": "an idea", "ThoughtProcess": "restating the prompt", "EndOfInterview": false}}"#.to_string(),
    ]);
    let manager = manager();
    let config = config();

    let turn = manager.handle_turn("s2", "offline playback", "Hello", &config, &provider).await.unwrap();

    assert!(!turn.next.next_question.is_empty());
    assert_eq!(turn.touched_nodes.len(), 1);

    let loaded = manager.load_full("s2").await.unwrap().unwrap();
    let dummy_present = loaded.merged_tree.nodes.iter().any(|n| n.label == NodeLabel::Irrelevant);
    assert!(dummy_present);
}

#[tokio::test]
async fn irrelevant_then_relevant_message_creates_idea_without_premature_completion() {
    // Reproduces spec scenario S1's opening moves: an irrelevant first
    // message ("Hello") must not force the stage past ASKING_FOR_IDEA, so
    // the next genuine idea is still accepted and the interview keeps
    // going into attribute-seeking afterward.
    let provider = ScriptedProvider::new([
        r#"{"is_idea": false, "is_relevant": false, "summary": "greeting"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "Could you tell me about an idea for this stimulus?", "AskingIntervieweeFor": "an idea", "ThoughtProcess": "restating the prompt", "EndOfInterview": false}}"#.to_string(),
        r#"{"is_idea": true, "is_relevant": true, "summary": "save playlists offline"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "What feature matters most?", "AskingIntervieweeFor": "an attribute", "ThoughtProcess": "probing for attributes", "EndOfInterview": false}}"#.to_string(),
        r#"{"elements": [{"category": "A", "summary": "automatic playlist downloads", "text_segment": "automatic playlist downloads", "is_new_element": true}], "relations": []}"#.to_string(),
        r#"{"Next": {"NextQuestion": "What happens when that feature kicks in?", "AskingIntervieweeFor": "a consequence", "ThoughtProcess": "probing for consequences", "EndOfInterview": false}}"#.to_string(),
    ]);
    let manager = manager();
    let config = config();

    manager.handle_turn("s4", "offline playback", "Hello", &config, &provider).await.unwrap();

    let second = manager
        .handle_turn(
            "s4",
            "offline playback",
            "I think offline playback should let me save playlists on-device.",
            &config,
            &provider,
        )
        .await
        .unwrap();
    assert_eq!(second.touched_nodes.len(), 1);

    let loaded = manager.load_full("s4").await.unwrap().unwrap();
    let ideas: Vec<_> = loaded.merged_tree.nodes.iter().filter(|n| n.label == NodeLabel::Idea).collect();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].conclusion, "save playlists offline");
    let irrelevants: Vec<_> = loaded.merged_tree.nodes.iter().filter(|n| n.label == NodeLabel::Irrelevant).collect();
    assert_eq!(irrelevants.len(), 1, "the irrelevant greeting must still be a single stacked node");

    // The idea must have been genuinely accepted (not silently stuck):
    // the interview keeps progressing and an attribute gets grafted under it.
    manager
        .handle_turn(
            "s4",
            "offline playback",
            "The key feature is automatic playlist downloads before trips.",
            &config,
            &provider,
        )
        .await
        .unwrap();

    let loaded = manager.load_full("s4").await.unwrap().unwrap();
    let attribute = loaded
        .merged_tree
        .nodes
        .iter()
        .find(|n| n.label == NodeLabel::Attribute && n.conclusion == "automatic playlist downloads")
        .expect("attribute must be grafted once the idea is accepted");
    assert!(attribute.parents.iter().any(|p| ideas[0].id == *p));
}

#[tokio::test]
async fn three_consecutive_irrelevant_messages_stack_onto_one_node() {
    // Spec scenario S3: repeated irrelevant answers before any idea is
    // accepted must stack onto the same IRRELEVANT node rather than
    // spawning a new DUMMY sibling each time.
    let provider = ScriptedProvider::new([
        r#"{"is_idea": false, "is_relevant": false, "summary": "hmm"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "Could you share an idea about this stimulus?", "AskingIntervieweeFor": "an idea", "ThoughtProcess": "rephrasing", "EndOfInterview": false}}"#.to_string(),
        r#"{"is_idea": false, "is_relevant": false, "summary": "ok"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "What do you think about offline playback specifically?", "AskingIntervieweeFor": "an idea", "ThoughtProcess": "rephrasing again", "EndOfInterview": false}}"#.to_string(),
        r#"{"is_idea": false, "is_relevant": false, "summary": "question marks"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "Is there a feature of offline playback you'd change?", "AskingIntervieweeFor": "an idea", "ThoughtProcess": "rephrasing once more", "EndOfInterview": false}}"#.to_string(),
    ]);
    let manager = manager();
    let config = config();

    for message in ["hmm", "ok", "???"] {
        manager.handle_turn("s5", "offline playback", message, &config, &provider).await.unwrap();
    }

    let loaded = manager.load_full("s5").await.unwrap().unwrap();
    let irrelevants: Vec<_> = loaded.merged_tree.nodes.iter().filter(|n| n.label == NodeLabel::Irrelevant).collect();
    assert_eq!(irrelevants.len(), 1, "exactly one IRRELEVANT node must exist after stacking");
}

#[tokio::test]
async fn save_order_reorders_stimuli_and_unknown_session_is_a_no_op() {
    let provider = ScriptedProvider::new([
        r#"{"is_idea": true, "is_relevant": true, "summary": "save playlists offline"}"#.to_string(),
        r#"{"Next": {"NextQuestion": "q", "AskingIntervieweeFor": "a", "ThoughtProcess": "t", "EndOfInterview": false}}"#.to_string(),
    ]);
    let manager = manager();
    let mut config = config();
    config.stimuli = vec!["a".to_string(), "b".to_string()];

    manager.handle_turn("s3", "a", "I want to save playlists.", &config, &provider).await.unwrap();

    manager.save_order("s3", &["b".to_string(), "a".to_string()]).await.unwrap();
    let loaded = manager.load_full("s3").await.unwrap().unwrap();
    let mut order: Vec<u32> = loaded.merged_tree.nodes.iter().filter_map(|n| n.order_index).collect();
    order.sort_unstable();
    assert_eq!(order, vec![0, 1]);

    manager.save_order("no-such-session", &["x".to_string()]).await.unwrap();
    assert!(manager.load_full("no-such-session").await.unwrap().is_none());
}
