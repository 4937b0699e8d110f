//! Instance inspection endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use montage_core::domain::instance::{InstanceStatus, JobInstance};
use montage_core::domain::step::StepRecord;
use montage_core::dto::instance::InstanceSummary;
use uuid::Uuid;

impl OrchestratorClient {
    /// List instances, optionally filtered by status
    pub async fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<InstanceSummary>> {
        let url = format!("{}/instances", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Get an instance by ID
    pub async fn get_instance(&self, instance_id: Uuid) -> Result<JobInstance> {
        let url = format!("{}/instances/{}", self.base_url, instance_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the step ledger of an instance in execution order
    pub async fn get_instance_steps(&self, instance_id: Uuid) -> Result<Vec<StepRecord>> {
        let url = format!("{}/instances/{}/steps", self.base_url, instance_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
