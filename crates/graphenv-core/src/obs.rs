//! Structured observability hooks for graphenv lifecycle events.
//!
//! This module provides:
//! - Workflow-scoped tracing spans via the `WorkflowSpan` RAII guard
//! - Emission functions for analysis, resolution, sync, commit and rollback
//!
//! Events are emitted at `info!` level unless noted. Filtering follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{error, info, warn};

/// RAII guard that enters a workflow-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = WorkflowSpan::enter("portrait");
/// // every event below is tagged with workflow = "portrait"
/// ```
pub struct WorkflowSpan {
    _span: tracing::span::EnteredSpan,
}

impl WorkflowSpan {
    pub fn enter(workflow: &str) -> Self {
        let span = tracing::info_span!("graphenv.workflow", workflow = %workflow);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: dependencies extracted from a workflow.
pub fn emit_workflow_analyzed(workflow: &str, nodes: usize, builtin: usize, models: usize) {
    info!(
        event = "workflow.analyzed",
        workflow = %workflow,
        nodes = nodes,
        builtin = builtin,
        models = models,
    );
}

/// Emit event: resolution pass finished.
pub fn emit_resolution_finished(workflow: &str, resolved: usize, issues: usize) {
    info!(
        event = "resolution.finished",
        workflow = %workflow,
        resolved = resolved,
        issues = issues,
        has_issues = issues > 0,
    );
}

/// Emit event: a single lookup failed and its reference degraded to
/// unresolved (warning level).
pub fn emit_lookup_degraded(error: &dyn std::fmt::Display) {
    warn!(event = "resolution.lookup_degraded", error = %error);
}

/// Emit event: workflows synced between live and tracked directories.
pub fn emit_workflows_synced(direction: &str, copied: usize, unchanged: usize, removed: usize) {
    info!(
        event = "workflows.synced",
        direction = %direction,
        copied = copied,
        unchanged = unchanged,
        removed = removed,
    );
}

/// Emit event: a version was recorded in the tracked directory.
pub fn emit_commit_recorded(version: &str, message: &str) {
    info!(event = "commit.recorded", version = %version, message = %message);
}

/// Emit event: rollback controller changed state.
pub fn emit_rollback_transition(from: &str, to: &str, target: &str) {
    info!(event = "rollback.transition", from = %from, to = %to, target = %target);
}

/// Emit event: rollback refused because work would be lost (warning level).
pub fn emit_rollback_rejected(target: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "rollback.rejected", target = %target, reason = %reason);
}

/// Emit event: restore failed part way; the environment may be partially
/// restored (error level).
pub fn emit_restore_failed(target: &str, side: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "rollback.restore_failed",
        target = %target,
        side = %side,
        error = %error,
        "environment may be partially restored"
    );
}
