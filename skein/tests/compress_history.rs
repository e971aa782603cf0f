//! History compression: an LLM-generated summary replaces the prefix, the
//! tail survives, and indexes are re-stamped from zero.

mod init_logging;

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use skein::{
    CompressHistoryNode, Environment, FeaturePipeline, LlModel, Message, MessageBody,
    MockExecutor, Node, Prompt, RetryPolicy, ToolRegistry,
};

fn environment(executor: Arc<MockExecutor>) -> Environment {
    Environment::new(
        executor,
        LlModel::full("mock", "scripted"),
        ToolRegistry::new(),
        Arc::new(FeaturePipeline::new()),
        Arc::new(Mutex::new(Prompt::default())),
        CancellationToken::new(),
        "test-strategy",
        "test-run",
        RetryPolicy::none(),
    )
}

#[tokio::test]
async fn compresses_prefix_into_summary_and_restamps_indexes() {
    let executor = Arc::new(MockExecutor::new());
    executor.push_text("Earlier: the user asked about trains and got schedules.");
    let env = environment(Arc::clone(&executor));

    for i in 0..6 {
        env.append(Message::user(format!("question {}", i)));
        env.append(Message::assistant(format!("answer {}", i)));
    }
    assert_eq!(env.history().len(), 12);

    let node = CompressHistoryNode::with_llm("compress", 2);
    node.run(Value::Null, &env).await.unwrap();

    let history = env.history();
    assert_eq!(history.len(), 3, "summary plus the kept tail");
    match &history[0].body {
        MessageBody::System { content } => assert!(content.contains("trains")),
        other => panic!("expected summary system message, got {:?}", other),
    }
    assert_eq!(history[1].text(), Some("question 5"));
    assert_eq!(history[2].text(), Some("answer 5"));
    for (i, m) in history.iter().enumerate() {
        assert_eq!(m.index, i, "indexes re-stamped after compression");
    }
    assert_eq!(executor.execute_calls(), 1, "one summarization call");
}

#[tokio::test]
async fn short_history_is_left_alone() {
    let executor = Arc::new(MockExecutor::new());
    let env = environment(Arc::clone(&executor));
    env.append(Message::user("only message"));

    let node = CompressHistoryNode::with_llm("compress", 2);
    node.run(Value::Null, &env).await.unwrap();

    assert_eq!(env.history().len(), 1);
    assert_eq!(executor.execute_calls(), 0, "no summarization needed");
}
