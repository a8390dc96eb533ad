//! Pool members and their outstanding-request slot

use sensemaker_llm::SharedTransport;
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Member lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Registered, model probe still running
    Initializing,
    /// Model probe succeeded
    Ready,
    /// Model probe failed or timed out
    Failed,
}

/// The single request a member is serving
#[derive(Debug, Clone)]
pub(crate) struct OutstandingRequest {
    pub(crate) request_id: Uuid,
    pub(crate) started: Instant,
    pub(crate) timeout: Duration,
}

/// Point-in-time view of a member, handed to selection strategies and the API
#[derive(Debug, Clone, Serialize)]
pub struct MemberSnapshot {
    /// Member id (agent name)
    pub id: String,
    /// Lifecycle status
    pub status: MemberStatus,
    /// Models this member serves
    pub models: Vec<String>,
    /// Whether a request is outstanding
    pub busy: bool,
    /// Age of the outstanding request in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_for_ms: Option<u64>,
}

pub(crate) struct AgentMember {
    id: String,
    transport: SharedTransport,
    affinity: Vec<String>,
    models: RwLock<Vec<String>>,
    status: RwLock<MemberStatus>,
    outstanding: Mutex<Option<OutstandingRequest>>,
}

impl AgentMember {
    pub(crate) fn new(transport: SharedTransport, affinity: Vec<String>) -> Self {
        Self {
            id: transport.name().to_string(),
            transport,
            affinity,
            models: RwLock::new(Vec::new()),
            status: RwLock::new(MemberStatus::Initializing),
            outstanding: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub(crate) fn status(&self) -> MemberStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn serves(&self, model: &str) -> bool {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m == model)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub(crate) fn snapshot(&self) -> MemberSnapshot {
        let outstanding = self
            .outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        MemberSnapshot {
            id: self.id.clone(),
            status: self.status(),
            models: self.models.read().unwrap_or_else(|e| e.into_inner()).clone(),
            busy: outstanding.is_some(),
            busy_for_ms: outstanding.map(|o| o.started.elapsed().as_millis() as u64),
        }
    }

    /// Probe the served-model list. Never fails: an unreachable backend falls
    /// back to the static affinity list and is marked failed.
    pub(crate) async fn probe(&self, init_timeout: Duration) {
        let probed = tokio::time::timeout(init_timeout, self.transport.list_models()).await;

        let (models, status) = match probed {
            Ok(Ok(models)) => {
                debug!(member = %self.id, count = models.len(), "model probe succeeded");
                (models, MemberStatus::Ready)
            }
            Ok(Err(e)) => {
                warn!(member = %self.id, error = %e, "model probe failed");
                (self.affinity.clone(), MemberStatus::Failed)
            }
            Err(_) => {
                warn!(
                    member = %self.id,
                    timeout_ms = init_timeout.as_millis() as u64,
                    "model probe timed out"
                );
                (self.affinity.clone(), MemberStatus::Failed)
            }
        };

        *self.models.write().unwrap_or_else(|e| e.into_inner()) = models;
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Claim the outstanding slot. Returns `None` when the member is busy.
    pub(crate) fn try_claim(self: &Arc<Self>, timeout: Duration) -> Option<OutstandingGuard> {
        let mut slot = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return None;
        }

        let request_id = Uuid::new_v4();
        *slot = Some(OutstandingRequest {
            request_id,
            started: Instant::now(),
            timeout,
        });

        Some(OutstandingGuard {
            member: Arc::clone(self),
            request_id,
        })
    }

    /// Clear the slot if it still belongs to `request_id`. Idempotent.
    fn release(&self, request_id: Uuid) {
        let mut slot = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = slot.as_ref() {
            if current.request_id == request_id {
                let elapsed = current.started.elapsed();
                if elapsed > current.timeout {
                    debug!(member = %self.id, %request_id, "released after timeout");
                }
                *slot = None;
            }
        }
    }
}

/// Owns a member's outstanding slot; dropping it releases the slot on every path.
pub(crate) struct OutstandingGuard {
    member: Arc<AgentMember>,
    request_id: Uuid,
}

impl OutstandingGuard {
    pub(crate) fn member(&self) -> &Arc<AgentMember> {
        &self.member
    }

    pub(crate) fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.member.release(self.request_id);
    }
}
