//! Index management strategies
//!
//! Runs once before the first flush; any failure aborts sink
//! initialization. Alias-managed indices get an idempotent lifecycle-policy
//! install and an initial write index; custom types install a template;
//! plain types just ensure the index exists.

use std::sync::Arc;

use sluice_config::{BulkSinkConfig, IndexType};

use crate::bulk::client::{BulkClient, ClusterError};
use crate::{BulkSinkError, Result};

/// Suffix of the initial write index behind an alias
pub const INITIAL_INDEX_SUFFIX: &str = "-000001";

const ISM_TEMPLATE_KEY: &str = "ism_template";

/// Fallback lifecycle policy when no policy file is configured
const DEFAULT_ISM_POLICY: &str = r#"{
  "policy": {
    "description": "managed index policy",
    "default_state": "current_write_index",
    "states": [
      {
        "name": "current_write_index",
        "actions": [{"rollover": {"min_size": "50gb"}}],
        "transitions": []
      }
    ],
    "ism_template": {"index_patterns": [], "priority": 100}
  }
}"#;

/// Ensures the sink's target resource exists
pub struct IndexManager {
    client: Arc<dyn BulkClient>,
    index_alias: String,
    index_type: IndexType,
    ism_policy_file: Option<String>,
    template_file: Option<String>,
}

impl IndexManager {
    pub fn new(client: Arc<dyn BulkClient>, config: &BulkSinkConfig) -> Self {
        Self {
            client,
            index_alias: config.index.clone(),
            index_type: config.index_type,
            ism_policy_file: config.ism_policy_file.clone(),
            template_file: config.template_file.clone(),
        }
    }

    /// Run the configured strategy
    pub async fn setup(&self) -> Result<()> {
        match self.index_type {
            IndexType::TraceAnalyticsRaw | IndexType::TraceAnalyticsServiceMap => {
                self.ensure_policy().await?;
                self.ensure_alias().await
            }
            IndexType::Custom => self.ensure_template().await,
            IndexType::ManagementDisabled => self.ensure_plain_index().await,
        }
    }

    /// Idempotent PUT of the lifecycle policy
    ///
    /// An existing policy is accepted with a mismatch warning; a server that
    /// rejects the `ism_template` field gets one retry without it.
    async fn ensure_policy(&self) -> Result<()> {
        let policy_name = format!("{}-policy", self.index_alias);
        let mut policy = match &self.ism_policy_file {
            Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                BulkSinkError::init(format!("cannot read ism policy file {path}: {e}"))
            })?,
            None => DEFAULT_ISM_POLICY.to_string(),
        };

        match self.client.put_lifecycle_policy(&policy_name, &policy).await {
            Ok(()) => return Ok(()),
            Err(e) if rejects_ism_template(&e) => {
                policy = drop_ism_template(&policy)?;
                match self.client.put_lifecycle_policy(&policy_name, &policy).await {
                    Ok(()) => return Ok(()),
                    Err(e) if policy_already_exists(&e) => {
                        tracing::warn!(
                            policy = %policy_name,
                            "lifecycle policy already exists; the existing policy may differ"
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if policy_already_exists(&e) => {
                tracing::warn!(
                    policy = %policy_name,
                    "lifecycle policy already exists; the existing policy may differ"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }

    /// Point the alias at `<alias>-000001` unless it already resolves
    async fn ensure_alias(&self) -> Result<()> {
        if self.client.alias_exists(&self.index_alias).await? {
            return Ok(());
        }
        let initial = format!("{}{INITIAL_INDEX_SUFFIX}", self.index_alias);
        tracing::info!(index = %initial, alias = %self.index_alias, "creating initial write index");
        self.client
            .create_index(&initial, Some(&self.index_alias))
            .await?;
        Ok(())
    }

    /// Install the template if absent; never creates the index
    async fn ensure_template(&self) -> Result<()> {
        let template_name = format!("{}-template", self.index_alias);
        if self.client.template_exists(&template_name).await? {
            return Ok(());
        }
        let path = self
            .template_file
            .as_ref()
            .ok_or_else(|| BulkSinkError::init("custom index type requires template_file"))?;
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BulkSinkError::init(format!("cannot read template file {path}: {e}")))?;
        tracing::info!(template = %template_name, "installing index template");
        self.client.put_template(&template_name, &body).await?;
        Ok(())
    }

    async fn ensure_plain_index(&self) -> Result<()> {
        if self.client.index_exists(&self.index_alias).await? {
            return Ok(());
        }
        tracing::info!(index = %self.index_alias, "creating index");
        self.client.create_index(&self.index_alias, None).await?;
        Ok(())
    }
}

fn rejects_ism_template(error: &ClusterError) -> bool {
    matches!(error, ClusterError::Api { message, .. }
        if message.contains("Invalid field: [ism_template]"))
}

fn policy_already_exists(error: &ClusterError) -> bool {
    matches!(error, ClusterError::Api { message, .. }
        if message.contains("version_conflict_engine_exception")
            || message.contains("resource_already_exists_exception"))
}

/// Remove the `ism_template` field from the policy body
fn drop_ism_template(policy: &str) -> Result<String> {
    let mut value: serde_json::Value = serde_json::from_str(policy)
        .map_err(|e| BulkSinkError::init(format!("malformed ism policy: {e}")))?;
    if let Some(body) = value.get_mut("policy").and_then(|p| p.as_object_mut()) {
        body.remove(ISM_TEMPLATE_KEY);
    }
    Ok(value.to_string())
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
