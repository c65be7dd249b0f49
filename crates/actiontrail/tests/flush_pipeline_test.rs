use actiontrail::{
    pipeline, FlushOutcome, Identity, InMemorySink, JsonLinesSink, RequestContext,
    ResponseContext, Result, TraceError, TraceRecord, TraceSink,
};
use async_trait::async_trait;
use http::{Method, StatusCode, Uri};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn request(method: Method, uri: &str, body: &'static str, user_id: i64) -> RequestContext {
    let uri: Uri = uri.parse().unwrap();
    RequestContext::new(method, &uri)
        .body(body)
        .identity(Identity::new(user_id))
}

#[derive(Clone, Default)]
struct FlakySink {
    // Fails while set, records every call's batch size.
    failing: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl TraceSink for FlakySink {
    async fn insert_batch(&self, records: &[TraceRecord]) -> Result<()> {
        self.calls.lock().unwrap().push(records.len());
        if *self.failing.lock().unwrap() {
            return Err(TraceError::Sink("database unavailable".to_string()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_capture_then_flush_in_memory() {
    let sink = InMemorySink::new();
    let (collector, flusher) = pipeline(sink.clone());
    let ok = ResponseContext::new(StatusCode::OK);

    collector
        .capture(
            "update_settings",
            "/projects/{id}/settings",
            &request(Method::PUT, "/projects/42/settings", r#"{"apiKey": "secret", "name": "x"}"#, 7),
            &ok,
        )
        .unwrap();
    collector
        .capture(
            "search_sessions",
            "/{projectId}/sessions/search2",
            &request(Method::POST, "/1/sessions/search2", "{}", 7),
            &ok,
        )
        .unwrap();
    collector
        .capture(
            "create_project",
            "/projects",
            &request(Method::POST, "/projects", "", 8),
            &ResponseContext::new(StatusCode::CREATED),
        )
        .unwrap();

    // The search route is filtered out.
    assert_eq!(flusher.flush().await, FlushOutcome::Written(2));

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let records = &batches[0];
    assert_eq!(records[0].payload, Some(json!({"apiKey": "HIDDEN", "name": "x"})));
    assert_eq!(records[1].user_id, 8);
    assert_eq!(records[1].status, Some(201));
    assert_eq!(records[1].payload, None);
    assert_eq!(records[1].parameters, None);

    assert_eq!(flusher.flush().await, FlushOutcome::Empty);
    assert_eq!(sink.batch_count(), 1);
}

#[tokio::test]
async fn test_failed_flush_is_not_retried() {
    let sink = FlakySink::default();
    *sink.failing.lock().unwrap() = true;
    let (collector, flusher) = pipeline(sink.clone());
    let ok = ResponseContext::new(StatusCode::OK);

    for i in 0..3 {
        collector
            .capture("create_item", "/items", &request(Method::POST, "/items", r#"{"n": 1}"#, i), &ok)
            .unwrap();
    }
    assert_eq!(flusher.flush().await, FlushOutcome::Dropped(3));
    assert!(flusher.queue().is_empty());

    // Recovery: only records captured after the failure are written.
    *sink.failing.lock().unwrap() = false;
    collector
        .capture("create_item", "/items", &request(Method::POST, "/items", "", 9), &ok)
        .unwrap();
    assert_eq!(flusher.flush().await, FlushOutcome::Written(1));

    assert_eq!(*sink.calls.lock().unwrap(), vec![3, 1]);
}

#[tokio::test]
async fn test_scheduler_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traces.jsonl");
    let (collector, flusher) = pipeline(JsonLinesSink::new(&path));
    let scheduler = flusher.spawn(Duration::from_millis(20));

    collector
        .capture(
            "delete_project",
            "/projects/{id}",
            &request(Method::DELETE, "/projects/3?force=true", "", 4),
            &ResponseContext::new(StatusCode::NO_CONTENT),
        )
        .unwrap();

    let mut content = String::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        if !content.is_empty() {
            break;
        }
    }
    assert_eq!(scheduler.shutdown().await, FlushOutcome::Empty);

    let record: TraceRecord = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(record.method, "DELETE");
    assert_eq!(record.status, Some(204));
    assert_eq!(
        record.parameters.unwrap().get("force"),
        Some(&"true".to_string())
    );
}
