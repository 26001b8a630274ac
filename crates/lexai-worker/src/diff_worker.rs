//! The diff variant of the analysis job (§4.11): one LLM call for a
//! structured explanation, one `diff:complete` event, no caching and no
//! contract mutation.

use lexai_core::domain::events::{event_names, DiffCompletePayload, DiffJob, SocketEvent, SOCKET_EVENTS_CHANNEL};
use lexai_core::error::LexResult;
use lexai_core::ports::KeyValueStore;
use lexai_integrations::ModelClient;
use tracing::warn;

pub async fn handle_diff_job(
    model: &dyn ModelClient,
    kv: &dyn KeyValueStore,
    job: &DiffJob,
) -> LexResult<()> {
    let (explanation, _model_name, _tokens) = model.explain_diff(&job.diff_text).await?;

    let payload = DiffCompletePayload {
        contract_id: job.contract_id.clone(),
        version_a: job.version_a,
        version_b: job.version_b,
        summary: explanation.summary,
        changes_analysis: explanation.changes_analysis,
        new_risks: explanation.new_risks,
        recommendation: explanation.recommendation,
    };
    let Ok(payload_value) = serde_json::to_value(&payload) else {
        warn!("failed to serialize diff:complete payload");
        return Ok(());
    };
    let event = SocketEvent::new(
        event_names::DIFF_COMPLETE,
        SocketEvent::org_room(&job.tenant_id),
        payload_value,
    );
    if let Ok(raw) = serde_json::to_string(&event) {
        kv.publish(SOCKET_EVENTS_CHANNEL, &raw).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexai_core::ports::EventSubscriber;
    use lexai_core::store::memory::InMemoryKeyValueStore;
    use lexai_integrations::model::FakeModelClient;

    #[tokio::test]
    async fn publishes_a_diff_complete_event_on_the_socket_channel() {
        let model = FakeModelClient::new("gpt-test");
        let kv = InMemoryKeyValueStore::new();
        let mut subscriber = kv.subscribe(&[SOCKET_EVENTS_CHANNEL]).await.unwrap();

        let job = DiffJob::new("contract-1", "tenant-1", "user-1", "MSA", "- old\n+ new", 1, 2);
        handle_diff_job(&model, &kv, &job).await.unwrap();

        let (channel, raw) = subscriber.next_message().await.unwrap().unwrap();
        assert_eq!(channel, SOCKET_EVENTS_CHANNEL);
        let event: SocketEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.event, event_names::DIFF_COMPLETE);
        assert_eq!(event.room, SocketEvent::org_room("tenant-1"));
    }
}
