//! Bulk sink options

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Bulk operation action applied to every document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    #[default]
    Index,
    Create,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
        }
    }
}

/// Index management strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum IndexType {
    /// Alias-managed time-series index with a lifecycle policy
    #[default]
    #[serde(rename = "trace-analytics-raw")]
    TraceAnalyticsRaw,

    /// Alias-managed service-map index
    #[serde(rename = "trace-analytics-service-map")]
    TraceAnalyticsServiceMap,

    /// User-supplied index template
    #[serde(rename = "custom")]
    Custom,

    /// Plain index, no management
    #[serde(rename = "management-disabled")]
    ManagementDisabled,
}

/// Options for the bulk sink
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkSinkConfig {
    /// Cluster endpoints, e.g. `https://node-1:9200`
    pub hosts: Vec<String>,

    /// Basic-auth user
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Sign requests with AWS SigV4 instead of basic auth
    pub aws_sigv4: bool,

    /// Path to a CA certificate bundle
    pub cert: Option<String>,

    /// Socket read timeout, in milliseconds
    pub socket_timeout_ms: Option<u64>,

    /// Connect timeout, in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Target index alias
    pub index: String,

    /// Index management strategy
    pub index_type: IndexType,

    /// Index template file for `custom` index types
    pub template_file: Option<String>,

    /// Document field supplying the bulk `_id`
    pub document_id_field: Option<String>,

    /// Bulk action for every operation
    pub action: BulkAction,

    /// Flush threshold for accumulated requests, in mebibytes
    pub bulk_size_mb: u64,

    /// Dead-letter file path; unset logs failures instead
    pub dlq_file: Option<String>,

    /// Retry attempts before dead-lettering; unset retries forever
    pub max_retries: Option<usize>,

    /// Lifecycle policy file for alias-managed indices
    pub ism_policy_file: Option<String>,
}

impl Default for BulkSinkConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            username: None,
            password: None,
            aws_sigv4: false,
            cert: None,
            socket_timeout_ms: None,
            connect_timeout_ms: None,
            index: String::new(),
            index_type: IndexType::default(),
            template_file: None,
            document_id_field: None,
            action: BulkAction::default(),
            bulk_size_mb: 5,
            dlq_file: None,
            max_retries: None,
            ism_policy_file: None,
        }
    }
}

impl BulkSinkConfig {
    /// Flush threshold in bytes
    pub fn bulk_size_bytes(&self) -> u64 {
        self.bulk_size_mb * 1024 * 1024
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(ConfigError::new("hosts", "at least one host is required"));
        }
        if self.index.is_empty() {
            return Err(ConfigError::new("index", "index alias is required"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::new(
                "username",
                "username and password must be set together",
            ));
        }
        if self.aws_sigv4 && self.username.is_some() {
            return Err(ConfigError::new(
                "aws_sigv4",
                "cannot combine sigv4 with basic auth",
            ));
        }
        if self.index_type == IndexType::Custom && self.template_file.is_none() {
            return Err(ConfigError::new(
                "template_file",
                "custom index type requires a template file",
            ));
        }
        Ok(())
    }
}
