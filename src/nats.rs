use crate::models::RewardEvent;
use async_nats::Client;
use tracing::info;

/// Producer for post-commit reward events.
pub struct NatsProducer {
    client: Client,
    topic_prefix: String,
}

impl NatsProducer {
    pub async fn new(url: &str, topic_prefix: &str) -> Result<Self, String> {
        let client = async_nats::connect(url).await.map_err(|e| e.to_string())?;

        info!("Connected to NATS at {}", url);
        Ok(Self {
            client,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    /// Publish a reward event on "<prefix>.reward.events". Callers treat
    /// failures as log-only; events are emitted after the settlement has
    /// already committed.
    pub async fn publish_reward_event(&self, event: &RewardEvent) -> Result<(), String> {
        let payload =
            serde_json::to_vec(event).map_err(|e| format!("Serialization error: {}", e))?;
        let subject = format!("{}.reward.events", self.topic_prefix);
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| e.to_string())
    }
}
