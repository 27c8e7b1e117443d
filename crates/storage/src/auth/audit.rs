//! Audit logging for signature-set management.
//!
//! Deleting a signature set is the lever administrators use to revoke a
//! compromised key, so every lifecycle operation leaves a structured trail:
//! who acted, on which set, when, and with what outcome.
//!
//! # Architecture
//!
//! The [`AuditLogger`] trait enables different audit backends:
//!
//! - [`TracingAuditLogger`]: Emits structured `tracing` events at INFO,
//!   suitable for log aggregation.
//! - [`NoopAuditLogger`]: Discards events.
//!
//! # Usage
//!
//! ```no_run
//! use tessera_storage::auth::audit::{
//!     AuditAction, AuditEvent, AuditLogger, AuditResult, TracingAuditLogger,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let logger = TracingAuditLogger;
//! let event = AuditEvent::builder()
//!     .actor("system")
//!     .action(AuditAction::CreateSignatureSet)
//!     .resource("app:office/ts:2024-01-15T10_30_00")
//!     .result(AuditResult::Success)
//!     .build();
//! logger.log(&event).await;
//! # });
//! ```

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ApplicationId, KeyTimestamp};

/// Action performed on a signature-set resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A signature set was created.
    CreateSignatureSet,
    /// A signature set was read.
    AccessSignatureSet,
    /// An application declared its signature for a set.
    DeclareApplicationSignature,
    /// A signature set was deleted.
    DeleteSignatureSet,
    /// All signature sets of an application were deleted.
    PurgeApplication,
    /// A purged application was opened for new sets again.
    ReopenApplication,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSignatureSet => write!(f, "create_signature_set"),
            Self::AccessSignatureSet => write!(f, "access_signature_set"),
            Self::DeclareApplicationSignature => write!(f, "declare_application_signature"),
            Self::DeleteSignatureSet => write!(f, "delete_signature_set"),
            Self::PurgeApplication => write!(f, "purge_application"),
            Self::ReopenApplication => write!(f, "reopen_application"),
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Operation completed successfully.
    Success,
    /// Operation failed with the given reason.
    Failure(String),
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// Structured audit event for signature-set operations.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditEvent {
    /// When the event occurred (defaults to now).
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    /// Identity of the actor performing the operation.
    #[builder(into)]
    pub actor: String,
    /// The action that was performed.
    pub action: AuditAction,
    /// Resource identifier (e.g., "app:office/ts:2024-01-15T10_30_00").
    #[builder(into)]
    pub resource: String,
    /// Outcome of the operation.
    pub result: AuditResult,
    /// Additional context (e.g., whether a deleted set existed).
    #[builder(default)]
    pub metadata: HashMap<String, String>,
}

/// Trait for audit log backends.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Records an audit event.
    async fn log(&self, event: &AuditEvent);
}

#[async_trait]
impl<L: AuditLogger + ?Sized> AuditLogger for std::sync::Arc<L> {
    async fn log(&self, event: &AuditEvent) {
        (**self).log(event).await;
    }
}

/// Audit logger that emits structured `tracing` events.
///
/// Field mapping:
/// - `audit.timestamp`: ISO 8601 timestamp
/// - `audit.actor`: who performed the action
/// - `audit.action`: the operation (e.g., "delete_signature_set")
/// - `audit.resource`: what was affected
/// - `audit.result`: "success" or "failure: ..."
/// - `audit.metadata`: additional context as `k=v` pairs
#[derive(Debug, Clone, Copy)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: &AuditEvent) {
        let mut pairs: Vec<String> =
            event.metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();

        tracing::info!(
            audit.timestamp = %event.timestamp.to_rfc3339(),
            audit.actor = %event.actor,
            audit.action = %event.action,
            audit.resource = %event.resource,
            audit.result = %event.result,
            audit.metadata = %pairs.join(", "),
            "audit_event"
        );
    }
}

/// No-op audit logger for tests and embedded use.
#[derive(Debug, Clone, Copy)]
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _event: &AuditEvent) {}
}

/// Resource identifier for an application.
pub fn application_resource(application: &ApplicationId) -> String {
    format!("app:{application}")
}

/// Resource identifier for one signature set of an application.
pub fn signature_set_resource(application: &ApplicationId, timestamp: KeyTimestamp) -> String {
    format!("app:{application}/ts:{timestamp}")
}
