// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! One service per governance engine. Every service takes the acting
//! [`Actor`](crate::domain::actor::Actor) explicitly and resolves access
//! through the [`AuthorizationResolver`] before touching storage.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates domain objects, repositories and outbound sinks

pub mod acl_service;
pub mod authorization;
pub mod disposition;
pub mod document_service;
pub mod hierarchy_service;
pub mod repository_factory;
pub mod settings_cache;
pub mod workflow_engine;

pub use acl_service::AclService;
pub use authorization::AuthorizationResolver;
pub use disposition::{DispositionService, SweepReport};
pub use document_service::{CheckinRequest, DocumentService};
pub use hierarchy_service::HierarchyService;
pub use repository_factory::{GovernanceCore, GovernanceRepositories};
pub use settings_cache::CachedSettings;
pub use workflow_engine::{TaskAssignment, WorkflowEngine};

use tracing::{error, warn};

use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditEntry, AuditSink};

/// Hand an entry to the audit sink. A failing sink is logged and otherwise
/// ignored; the governance change it describes has already committed.
pub(crate) async fn record_audit(sink: &dyn AuditSink, entry: AuditEntry) {
    let action = entry.action();
    let subject = entry.subject();
    if let Err(e) = sink.record(entry).await {
        warn!(
            action = action.as_str(),
            subject_kind = subject.kind(),
            subject_id = %subject.id(),
            "Failed to record audit entry: {}",
            e
        );
    }
}

/// Convert into a governance error, logging integrity faults loudly on the way.
pub(crate) fn surface<E: Into<GovernanceError>>(err: E) -> GovernanceError {
    let err = err.into();
    if let GovernanceError::Integrity(detail) = &err {
        error!(fault = %detail, "Integrity fault detected");
    }
    err
}
