//! Event intake endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use montage_core::dto::event::TriggerEvent;
use montage_core::dto::instance::DispatchReceipt;

impl OrchestratorClient {
    /// Send a trigger event
    ///
    /// # Returns
    /// The dispatch receipt: the started instance, or the instances reached
    /// by a cancellation. A start for a key already in flight fails with a
    /// 409 [`ClientError::ApiError`](crate::ClientError::ApiError).
    pub async fn send_event(&self, event: &TriggerEvent) -> Result<DispatchReceipt> {
        let url = format!("{}/events", self.base_url);
        tracing::debug!("Sending {} for '{}'", event.name(), event.correlation_key());
        let response = self.client.post(&url).json(event).send().await?;

        self.handle_response(response).await
    }
}
