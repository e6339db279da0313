// crates/metric-pilot-core/src/core/analysis.rs
// ============================================================================
// Module: Metric Pilot Analysis Runs
// Description: Analysis run aggregate with step statuses and timeline.
// Purpose: Model the source→model→skill→report→delivery pipeline state.
// Dependencies: crate::core::{identifiers, report, time}, serde
// ============================================================================

//! ## Overview
//! An analysis run composes the pipeline end to end. Its five declared steps
//! progress `pending → running → done` in order; at most one step is running
//! at a time, and a failing step leaves exactly one step in `error` with the
//! run marked failed. The timeline is an append-only, totally ordered log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AnalysisRunId;
use crate::core::identifiers::ChannelEventId;
use crate::core::identifiers::ConnectionId;
use crate::core::identifiers::InsightId;
use crate::core::identifiers::ModelProfileId;
use crate::core::identifiers::ReportId;
use crate::core::identifiers::ReportTypeId;
use crate::core::identifiers::TenantId;
use crate::core::report::Channel;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Declared pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Source sync and quality gate.
    Source,
    /// Model run producing an insight.
    Model,
    /// Optional skill pack execution.
    Skill,
    /// Report generation.
    Report,
    /// Channel delivery.
    Delivery,
}

impl StepName {
    /// All steps in declared order.
    pub const ORDER: [Self; 5] =
        [Self::Source, Self::Model, Self::Skill, Self::Report, Self::Delivery];
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Currently executing.
    Running,
    /// Completed.
    Done,
    /// Failed; the run is failed.
    Error,
}

/// A step entry within an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStep {
    /// Step name.
    pub name: StepName,
    /// Step status.
    pub status: StepStatus,
    /// Human-readable detail (progress or error message).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ============================================================================
// SECTION: Run Aggregate
// ============================================================================

/// Analysis run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisRunStatus {
    /// Created but not executed.
    Draft,
    /// Currently executing.
    Running,
    /// All steps done.
    Completed,
    /// A step errored.
    Failed,
}

/// Artifact references produced by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisArtifacts {
    /// Insight produced by the model step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_id: Option<InsightId>,
    /// Report produced by the report step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
    /// Channel events appended by delivery.
    #[serde(default)]
    pub channel_event_ids: Vec<ChannelEventId>,
}

/// Timeline entry recorded as the run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Entry timestamp.
    pub at: Timestamp,
    /// Event message.
    pub message: String,
}

/// Analysis run aggregate.
///
/// # Invariants
/// - At most one step has status `Running` at any time.
/// - A `Failed` run has exactly one step in `Error`, carrying the message.
/// - `timeline` is append-only and totally ordered by insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    /// Run identifier.
    pub id: AnalysisRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Lifecycle status.
    pub status: AnalysisRunStatus,
    /// Source connection the run reads from.
    pub source_connection_id: ConnectionId,
    /// Model profile selecting objective and target metric.
    pub model_profile_id: ModelProfileId,
    /// Report type selecting sections and delivery defaults.
    pub report_type_id: ReportTypeId,
    /// Optional skill to run between model and report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    /// Delivery channels.
    pub channels: Vec<Channel>,
    /// Step entries in declared order.
    pub steps: Vec<AnalysisStep>,
    /// Artifact references.
    pub artifacts: AnalysisArtifacts,
    /// Append-only progress log.
    pub timeline: Vec<TimelineEntry>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}

impl AnalysisRun {
    /// Returns the initial step list, all pending.
    #[must_use]
    pub fn initial_steps() -> Vec<AnalysisStep> {
        StepName::ORDER
            .iter()
            .map(|name| AnalysisStep {
                name: *name,
                status: StepStatus::Pending,
                detail: None,
            })
            .collect()
    }

    /// Returns a mutable reference to the named step.
    pub fn step_mut(&mut self, name: StepName) -> Option<&mut AnalysisStep> {
        self.steps.iter_mut().find(|step| step.name == name)
    }
}
