//! Bulk operations and the accumulating request
//!
//! The wire payload is newline-delimited `{action-metadata}\n{document}\n`
//! pairs. The running size estimate is exactly the byte length of the final
//! payload, which keeps the flush threshold observable.

use sluice_config::BulkAction;

/// One index/create operation
#[derive(Debug, Clone)]
pub struct BulkOperation {
    action: BulkAction,
    index: String,
    document_id: Option<String>,
    document: String,
    size_bytes: usize,
}

impl BulkOperation {
    pub fn new(
        action: BulkAction,
        index: String,
        document_id: Option<String>,
        document: String,
    ) -> Self {
        let mut operation = Self {
            action,
            index,
            document_id,
            document,
            size_bytes: 0,
        };
        operation.size_bytes = operation.metadata_line().len() + operation.document.len() + 2;
        operation
    }

    pub fn action(&self) -> BulkAction {
        self.action
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Wire size: metadata line, document line, two newlines
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Action metadata, `_id` omitted when absent
    pub fn metadata_line(&self) -> String {
        let action = self.action.as_str();
        let index = serde_json::Value::String(self.index.clone());
        match &self.document_id {
            Some(id) => {
                let id = serde_json::Value::String(id.clone());
                format!(r#"{{"{action}":{{"_index":{index},"_id":{id}}}}}"#)
            }
            None => format!(r#"{{"{action}":{{"_index":{index}}}}}"#),
        }
    }
}

/// An in-progress bulk request with a monotonic size estimate
#[derive(Debug, Default)]
pub struct AccumulatingBulkRequest {
    operations: Vec<BulkOperation>,
    estimated_size_bytes: usize,
}

impl AccumulatingBulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a request from a retryable subset
    pub fn from_operations(operations: Vec<BulkOperation>) -> Self {
        let estimated_size_bytes = operations.iter().map(BulkOperation::size_bytes).sum();
        Self {
            operations,
            estimated_size_bytes,
        }
    }

    /// What the estimate would become if `operation` were appended
    pub fn estimated_size_with(&self, operation: &BulkOperation) -> usize {
        self.estimated_size_bytes + operation.size_bytes()
    }

    pub fn push(&mut self, operation: BulkOperation) {
        self.estimated_size_bytes += operation.size_bytes();
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<BulkOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.estimated_size_bytes
    }

    /// Serialize to the newline-delimited wire payload
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.estimated_size_bytes);
        for operation in &self.operations {
            payload.extend_from_slice(operation.metadata_line().as_bytes());
            payload.push(b'\n');
            payload.extend_from_slice(operation.document().as_bytes());
            payload.push(b'\n');
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(doc: &str, id: Option<&str>) -> BulkOperation {
        BulkOperation::new(
            BulkAction::Index,
            "traces".to_string(),
            id.map(str::to_string),
            doc.to_string(),
        )
    }

    #[test]
    fn metadata_line_shapes() {
        let op = operation("{}", None);
        assert_eq!(op.metadata_line(), r#"{"index":{"_index":"traces"}}"#);

        let op = operation("{}", Some("abc"));
        assert_eq!(
            op.metadata_line(),
            r#"{"index":{"_index":"traces","_id":"abc"}}"#
        );

        let op = BulkOperation::new(BulkAction::Create, "traces".into(), None, "{}".into());
        assert_eq!(op.metadata_line(), r#"{"create":{"_index":"traces"}}"#);
    }

    #[test]
    fn estimate_equals_wire_length() {
        let mut request = AccumulatingBulkRequest::new();
        request.push(operation(r#"{"a":1}"#, None));
        request.push(operation(r#"{"b":"two"}"#, Some("id-2")));
        request.push(operation(r#"{"c":[1,2,3]}"#, None));

        assert_eq!(request.estimated_size_bytes(), request.to_wire_bytes().len());
    }

    #[test]
    fn estimate_is_monotonic_and_previewable() {
        let mut request = AccumulatingBulkRequest::new();
        let op = operation(r#"{"a":1}"#, None);
        let preview = request.estimated_size_with(&op);
        request.push(op);
        assert_eq!(request.estimated_size_bytes(), preview);

        let op2 = operation(r#"{"b":2}"#, None);
        assert!(request.estimated_size_with(&op2) > request.estimated_size_bytes());
    }

    #[test]
    fn from_operations_recomputes_size() {
        let ops = vec![operation("{}", None), operation(r#"{"x":9}"#, None)];
        let expected: usize = ops.iter().map(BulkOperation::size_bytes).sum();
        let request = AccumulatingBulkRequest::from_operations(ops);
        assert_eq!(request.estimated_size_bytes(), expected);
        assert_eq!(request.len(), 2);
    }
}
