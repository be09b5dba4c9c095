//! Span window state and emitted relationships

use serde::{Deserialize, Serialize};

/// Everything the join needs to remember about one span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanState {
    pub service_name: String,
    pub parent_span_id: Option<Vec<u8>>,
    pub trace_id: Vec<u8>,
    pub span_kind: String,
    pub span_name: String,
}

/// One side of a relationship edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipEndpoint {
    pub domain: String,
    pub resource: String,
}

/// A service-map edge
///
/// Emitted exactly once per distinct tuple over the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceMapRelationship {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<RelationshipEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RelationshipEndpoint>,
    #[serde(rename = "traceGroupName")]
    pub trace_group_name: String,
}

impl ServiceMapRelationship {
    /// Edge from the parent's service to the child's service
    pub fn destination(
        parent_service: &str,
        parent_kind: &str,
        child_service: &str,
        child_name: &str,
        trace_group: &str,
    ) -> Self {
        Self {
            service_name: parent_service.to_string(),
            kind: parent_kind.to_string(),
            destination: Some(RelationshipEndpoint {
                domain: child_service.to_string(),
                resource: child_name.to_string(),
            }),
            target: None,
            trace_group_name: trace_group.to_string(),
        }
    }

    /// The child service's own operation entry
    pub fn target(
        child_service: &str,
        child_kind: &str,
        child_name: &str,
        trace_group: &str,
    ) -> Self {
        Self {
            service_name: child_service.to_string(),
            kind: child_kind.to_string(),
            destination: None,
            target: Some(RelationshipEndpoint {
                domain: child_service.to_string(),
                resource: child_name.to_string(),
            }),
            trace_group_name: trace_group.to_string(),
        }
    }
}
