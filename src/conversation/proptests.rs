//! Property-based tests for the conversation store

use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum StoreOp {
    Add(Message),
    Readd(usize),
    TextDelta(String),
    ToolCallDelta(String),
    Clear,
    Read,
}

fn arb_message() -> impl Strategy<Value = Message> {
    (
        prop_oneof![Just(Role::Human), Just(Role::Ai), Just(Role::Tool)],
        "[a-zA-Z ]{0,20}",
    )
        .prop_map(|(role, text)| match role {
            Role::Human => Message::human(text),
            Role::Ai => Message::ai(text),
            Role::Tool => Message::tool_result("call", text, false),
        })
}

fn arb_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => arb_message().prop_map(StoreOp::Add),
        2 => (0usize..16).prop_map(StoreOp::Readd),
        2 => "[a-z \n]{0,8}".prop_map(StoreOp::TextDelta),
        2 => "[a-z{}\":]{0,8}".prop_map(StoreOp::ToolCallDelta),
        1 => Just(StoreOp::Clear),
        2 => Just(StoreOp::Read),
    ]
}

proptest! {
    #[test]
    fn prop_add_twice_equals_add_once(
        prefix in proptest::collection::vec(arb_message(), 0..5),
        message in arb_message(),
    ) {
        let mut once = ConversationStore::new();
        once.add_messages(prefix.clone());
        once.add_message(message.clone());

        let mut twice = ConversationStore::new();
        twice.add_messages(prefix);
        twice.add_message(message.clone());
        twice.add_message(message);

        prop_assert_eq!(once.get_messages(), twice.get_messages());
    }

    #[test]
    fn prop_buffers_empty_after_read(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut store = ConversationStore::new();
        let mut added: Vec<Message> = Vec::new();

        for op in ops {
            match op {
                StoreOp::Add(message) => {
                    added.push(message.clone());
                    store.add_message(message);
                }
                StoreOp::Readd(index) => {
                    if let Some(message) = added.get(index) {
                        store.add_message(message.clone());
                    }
                }
                StoreOp::TextDelta(delta) => store.add_text_delta(&delta),
                StoreOp::ToolCallDelta(delta) => store.add_tool_call_delta(&delta),
                StoreOp::Clear => store.clear_buffers(),
                StoreOp::Read => {
                    let _ = store.get_messages();
                    prop_assert_eq!(store.response_buffer(), "");
                    prop_assert_eq!(store.tool_call_buffer(), "");
                }
            }
        }

        let messages = store.get_messages();
        prop_assert_eq!(store.response_buffer(), "");
        prop_assert_eq!(store.tool_call_buffer(), "");

        // Ids stay unique no matter how often messages are re-added
        let mut ids = std::collections::HashSet::new();
        for message in &messages {
            prop_assert!(ids.insert(message.id.clone()));
        }
    }

    #[test]
    fn prop_insertion_order_then_buffers(
        messages in proptest::collection::vec(arb_message(), 0..8),
        response in "[a-z]{1,10}",
        tool_call in "[a-z]{1,10}",
    ) {
        let mut store = ConversationStore::new();
        store.add_messages(messages.clone());
        store.add_text_delta(&response);
        store.add_tool_call_delta(&tool_call);

        let history = store.get_messages();
        prop_assert_eq!(history.len(), messages.len() + 2);
        for (stored, original) in history.iter().zip(&messages) {
            prop_assert_eq!(&stored.id, &original.id);
        }
        prop_assert_eq!(history[messages.len()].text(), response);
        prop_assert_eq!(
            history[messages.len() + 1].text(),
            format!("{INTERRUPTED_TOOL_CALL_TAG} {tool_call}")
        );
    }

    #[test]
    fn prop_repair_clears_trailing_calls(
        text in "[a-z ]{0,12}",
        ids in proptest::collection::vec("[a-z]{4}", 1..4),
    ) {
        let calls = ids
            .iter()
            .map(|id| ToolCall::new(id.clone(), "bash", serde_json::Map::new()))
            .collect();
        let mut parts = vec![ContentPart::text(text)];
        for id in &ids {
            parts.push(ContentPart::ToolUse {
                id: id.clone(),
                name: "bash".to_string(),
                input: serde_json::json!({}),
            });
        }

        let mut store = ConversationStore::new();
        store.add_message(Message::human("go"));
        store.add_message(Message::ai_with_tool_calls(MessageContent::Parts(parts), calls));
        store.repair_dangling_tool_calls();

        let last = store.messages().last().unwrap();
        prop_assert!(last.tool_calls.is_empty());
        prop_assert!(!last.content.has_non_text_parts());
    }
}
