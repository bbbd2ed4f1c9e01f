//! Conversation history through the assistant

use voxgen::assistant::{AssistantEvent, AssistantStatus};

use crate::common::{AssistantHarness, COMPONENT};

async fn turn(h: &mut AssistantHarness, text: &str, code: &str) {
    h.completion
        .set_chunks([format!("```jsx\n{}\n```", code)]);
    h.assistant.submit_text(text).unwrap();
    h.drive_until(|s| s.status == AssistantStatus::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_turn_after_going_back_discards_future() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "one", "function Component() { return 1; }").await;
    turn(&mut h, "two", "function Component() { return 2; }").await;
    turn(&mut h, "three", "function Component() { return 3; }").await;
    assert_eq!(h.assistant.history().len(), 3);

    let entry = h.assistant.navigate_to(0).unwrap().unwrap();
    assert_eq!(entry.transcript, "one");
    assert!(
        h.assistant
            .snapshot()
            .current_component
            .as_ref()
            .unwrap()
            .code
            .contains("return 1;")
    );

    turn(&mut h, "four", "function Component() { return 4; }").await;
    let history = h.assistant.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.current_index, Some(1));
    let transcripts: Vec<&str> = history
        .entries
        .iter()
        .map(|e| e.transcript.as_str())
        .collect();
    assert_eq!(transcripts, vec!["one", "four"]);
}

#[tokio::test(start_paused = true)]
async fn test_back_and_forward_update_component() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "one", "function Component() { return 1; }").await;
    turn(&mut h, "two", "function Component() { return 2; }").await;
    h.recorder.clear();

    let back = h.assistant.go_back().unwrap().unwrap();
    assert_eq!(back.transcript, "one");
    assert!(h.assistant.go_back().unwrap().is_none());
    assert!(h.recorder.all().contains(&AssistantEvent::HistoryChanged));

    let forward = h.assistant.go_forward().unwrap().unwrap();
    assert_eq!(forward.transcript, "two");
    assert!(h.assistant.go_forward().unwrap().is_none());
    assert!(
        h.assistant
            .snapshot()
            .current_component
            .as_ref()
            .unwrap()
            .code
            .contains("return 2;")
    );
}

#[tokio::test(start_paused = true)]
async fn test_history_is_locked_while_generating() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "one", COMPONENT).await;

    h.completion.hang();
    h.assistant.submit_text("two").unwrap();
    assert_eq!(h.assistant.status(), AssistantStatus::Processing);

    assert!(h.assistant.new_conversation().is_err());
    assert!(h.assistant.navigate_to(0).is_err());
    assert!(h.assistant.go_back().is_err());
    let id = h.assistant.active_conversation().unwrap().id.clone();
    assert!(h.assistant.delete_conversation(&id).is_err());
    assert_eq!(h.assistant.list_conversations().len(), 1);

    h.assistant.abort().await;
    assert!(h.assistant.new_conversation().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_new_and_switch_conversation() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "a counter", COMPONENT).await;
    let first = h.assistant.active_conversation().unwrap().id.clone();

    let second = h.assistant.new_conversation().unwrap();
    assert_eq!(h.assistant.active_conversation().unwrap().id, second.id);
    assert!(h.assistant.history().is_empty());
    assert!(h.assistant.snapshot().current_component.is_none());

    h.assistant.switch_conversation(&first).unwrap();
    assert_eq!(h.assistant.history().len(), 1);
    assert_eq!(
        h.assistant.snapshot().current_component.as_ref().unwrap().code,
        COMPONENT
    );
    assert!(h.assistant.switch_conversation("nope").is_err());

    h.assistant.rename_conversation(&second.id, "Scratch").unwrap();
    let titles: Vec<String> = h
        .assistant
        .list_conversations()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert!(titles.contains(&"Scratch".to_string()));
    assert!(titles.contains(&"a counter".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_deleting_active_conversation_falls_back() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "a counter", COMPONENT).await;
    let first = h.assistant.active_conversation().unwrap().id.clone();
    let second = h.assistant.new_conversation().unwrap();

    h.assistant.delete_conversation(&second.id).unwrap();
    assert_eq!(h.assistant.active_conversation().unwrap().id, first);
    assert_eq!(h.assistant.history().len(), 1);
    assert!(h.stored(&format!("conversation:{}:history", second.id)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_restart_restores_current_component() {
    let mut h = AssistantHarness::new();
    turn(&mut h, "one", "function Component() { return 1; }").await;
    turn(&mut h, "two", "function Component() { return 2; }").await;
    h.assistant.go_back().unwrap();
    let store = h.store.clone();
    drop(h);

    let h = AssistantHarness::with_store(store);
    assert_eq!(h.assistant.history().len(), 2);
    assert_eq!(h.assistant.history().current_index, Some(0));
    assert!(
        h.assistant
            .snapshot()
            .current_component
            .as_ref()
            .unwrap()
            .code
            .contains("return 1;")
    );
}
