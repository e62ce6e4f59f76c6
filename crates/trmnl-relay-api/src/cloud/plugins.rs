// Cloud private-plugin endpoints
//
// A private plugin with the "webhook" strategy is the only way to push
// content to a cloud-managed device: the plugin's uuid is the webhook
// address, and its template renders whatever merge variables we post.

use tracing::{debug, trace};

use crate::cloud::client::CloudClient;
use crate::cloud::models::{
    CreatePluginRequest, MergeVariablesPayload, PluginRegistration, PluginRegistrationResponse,
    WebhookAck,
};
use crate::error::Error;

impl CloudClient {
    /// Create a webhook-strategy private plugin bound to this account.
    ///
    /// `POST /api/custom_plugins` with `{"name": "...", "strategy": "webhook"}`
    pub async fn create_plugin(&self, name: &str) -> Result<PluginRegistration, Error> {
        debug!(name, "creating private plugin");
        let resp: PluginRegistrationResponse = self
            .post(
                "api/custom_plugins",
                &CreatePluginRequest {
                    name,
                    strategy: "webhook",
                },
            )
            .await?;

        resp.into_registration()
            .ok_or_else(|| Error::Deserialization {
                message: "plugin registration response carried no uuid".into(),
                body: String::new(),
            })
    }

    /// Post merge variables to a private plugin's webhook.
    ///
    /// `POST /api/custom_plugins/{uuid}`
    pub async fn post_merge_variables(
        &self,
        plugin_uuid: &str,
        payload: &MergeVariablesPayload,
    ) -> Result<WebhookAck, Error> {
        debug!(plugin_uuid, "posting merge variables");
        trace!(?payload, "webhook payload");
        self.post(&format!("api/custom_plugins/{plugin_uuid}"), payload)
            .await
    }
}
