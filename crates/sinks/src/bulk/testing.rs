//! Scripted in-process cluster for sink tests

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::bulk::accumulator::{AccumulatingBulkRequest, BulkOperation};
use crate::bulk::client::{BulkClient, BulkResponse, BulkResponseEntry, ClusterError, ErrorKind};

/// One scripted bulk call: either per-op kinds or a whole-request error
pub(crate) enum ScriptedBulk {
    Entries(Vec<ErrorKind>),
    Fail(String),
}

/// Scripted [`BulkClient`] recording every interaction
///
/// Bulk calls pop the next scripted outcome; an empty script means every
/// operation succeeds.
#[derive(Default)]
pub(crate) struct MockBulkClient {
    pub script: Mutex<VecDeque<ScriptedBulk>>,
    pub bulk_calls: Mutex<Vec<Vec<BulkOperation>>>,
    pub ping_ok: AtomicBool,
    pub ping_calls: Mutex<Vec<()>>,

    pub policy_script: Mutex<VecDeque<Result<(), ClusterError>>>,
    pub policy_puts: Mutex<Vec<(String, String)>>,
    pub aliases: Mutex<HashSet<String>>,
    pub indices: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<(String, Option<String>)>>,
    pub templates: Mutex<HashSet<String>>,
    pub template_puts: Mutex<Vec<(String, String)>>,
}

impl MockBulkClient {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.ping_ok.store(true, Ordering::SeqCst);
        mock
    }

    pub fn push_bulk(&self, outcome: ScriptedBulk) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.lock().unwrap().len()
    }

    /// Operation documents of the n-th bulk call
    pub fn call_documents(&self, call: usize) -> Vec<String> {
        self.bulk_calls.lock().unwrap()[call]
            .iter()
            .map(|op| op.document().to_string())
            .collect()
    }

    fn status_for(kind: ErrorKind) -> u16 {
        match kind {
            ErrorKind::None => 201,
            ErrorKind::DocumentLevel => 400,
            ErrorKind::VersionConflict => 409,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::Rejected | ErrorKind::ServerError => 503,
            ErrorKind::Network | ErrorKind::Unknown => 0,
        }
    }

    fn message_for(kind: ErrorKind) -> Option<String> {
        match kind {
            ErrorKind::None => None,
            ErrorKind::DocumentLevel => Some("mapper_parsing_exception: failed to parse".into()),
            ErrorKind::VersionConflict => Some("version conflict, document already exists".into()),
            other => Some(format!("{other:?}")),
        }
    }
}

#[async_trait]
impl BulkClient for MockBulkClient {
    async fn bulk(&self, request: &AccumulatingBulkRequest) -> Result<BulkResponse, ClusterError> {
        self.bulk_calls
            .lock()
            .unwrap()
            .push(request.operations().to_vec());

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            None => Ok(BulkResponse {
                entries: (0..request.len())
                    .map(|operation_index| BulkResponseEntry {
                        operation_index,
                        status_code: 201,
                        error_kind: ErrorKind::None,
                        message: None,
                    })
                    .collect(),
            }),
            Some(ScriptedBulk::Fail(message)) => Err(ClusterError::Network(message)),
            Some(ScriptedBulk::Entries(kinds)) => {
                assert_eq!(
                    kinds.len(),
                    request.len(),
                    "scripted entry count must match the request"
                );
                Ok(BulkResponse {
                    entries: kinds
                        .into_iter()
                        .enumerate()
                        .map(|(operation_index, kind)| BulkResponseEntry {
                            operation_index,
                            status_code: Self::status_for(kind),
                            error_kind: kind,
                            message: Self::message_for(kind),
                        })
                        .collect(),
                })
            }
        }
    }

    async fn ping(&self) -> Result<(), ClusterError> {
        self.ping_calls.lock().unwrap().push(());
        if self.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClusterError::Network("no route to cluster".into()))
        }
    }

    async fn put_lifecycle_policy(&self, name: &str, body: &str) -> Result<(), ClusterError> {
        self.policy_puts
            .lock()
            .unwrap()
            .push((name.to_string(), body.to_string()));
        self.policy_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, ClusterError> {
        Ok(self.aliases.lock().unwrap().contains(alias))
    }

    async fn create_index(&self, name: &str, write_alias: Option<&str>) -> Result<(), ClusterError> {
        self.indices.lock().unwrap().insert(name.to_string());
        if let Some(alias) = write_alias {
            self.aliases.lock().unwrap().insert(alias.to_string());
        }
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), write_alias.map(str::to_string)));
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.indices.lock().unwrap().contains(name))
    }

    async fn template_exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.templates.lock().unwrap().contains(name))
    }

    async fn put_template(&self, name: &str, body: &str) -> Result<(), ClusterError> {
        self.templates.lock().unwrap().insert(name.to_string());
        self.template_puts
            .lock()
            .unwrap()
            .push((name.to_string(), body.to_string()));
        Ok(())
    }
}
