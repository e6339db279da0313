// crates/metric-pilot-core/src/core/model.rs
// ============================================================================
// Module: Metric Pilot Model Records
// Description: Model runs, provider health, insights, and recommended actions.
// Purpose: Capture model execution traces and their policy-evaluated outputs.
// Dependencies: crate::core::{identifiers, policy, time}, serde
// ============================================================================

//! ## Overview
//! A model run records which provider actually served a task and the failover
//! trace that led there. Its output is an insight: a severity-ranked summary
//! with forecast points or anomalies and a list of recommended actions, each
//! already evaluated against the tenant's autonomy policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::ApprovalId;
use crate::core::identifiers::InsightId;
use crate::core::identifiers::ModelRunId;
use crate::core::identifiers::TenantId;
use crate::core::policy::PolicyDecision;
use crate::core::time::IsoDate;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Objectives
// ============================================================================

/// Model task objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelObjective {
    /// Linear extrapolation over a metric history.
    Forecast,
    /// Z-score scan over a metric history.
    Anomaly,
}

// ============================================================================
// SECTION: Task Requests
// ============================================================================

/// A model task submitted to the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTaskRequest {
    /// Task objective; defaults to forecast.
    #[serde(default)]
    pub objective: Option<ModelObjective>,
    /// Input context labels (informational).
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Metrics to model; the first is the target.
    #[serde(default)]
    pub output_metric_ids: Vec<String>,
    /// Forecast horizon in days.
    #[serde(default)]
    pub horizon_days: Option<u32>,
    /// Provider pin consulted first.
    #[serde(default)]
    pub provider: Option<String>,
    /// Whether tenant-supplied providers are preferred.
    #[serde(default)]
    pub prefer_byo: bool,
    /// Providers forced to fail, for failover exercises.
    #[serde(default)]
    pub simulate_provider_failures: Vec<String>,
}

/// The pair of records a model task produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTaskOutcome {
    /// The recorded model run.
    pub run: ModelRun,
    /// The synthesized insight.
    pub insight: Insight,
}

// ============================================================================
// SECTION: Provider Health
// ============================================================================

/// Health record for a (tenant, provider) pair.
///
/// # Invariants
/// - A provider is cooling down iff `cooldown_until > now`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Consecutive and historical failure count.
    pub fail_count: u32,
    /// Historical success count.
    pub success_count: u32,
    /// Last recorded error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Cooldown expiry; the provider is skipped until this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<Timestamp>,
}

impl ProviderHealth {
    /// Returns true when the provider is cooling down at `now`.
    #[must_use]
    pub fn is_cooling_down(&self, now: Timestamp) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// One step of the provider failover trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverStep {
    /// Provider consulted.
    pub provider: String,
    /// Stable outcome label (`skipped_cooldown`, `failed`, `selected`).
    pub outcome: String,
}

/// Provider chain and failover trace recorded on a model run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTrace {
    /// Ordered, deduplicated chain that was consulted.
    pub chain: Vec<String>,
    /// Per-provider outcomes in consultation order.
    pub failover_trace: Vec<FailoverStep>,
}

// ============================================================================
// SECTION: Model Runs
// ============================================================================

/// Model run completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRunStatus {
    /// Run completed without warnings.
    Completed,
    /// Run completed but produced quality warnings.
    CompletedWithWarnings,
}

/// A completed model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRun {
    /// Run identifier.
    pub id: ModelRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Task objective.
    pub objective: ModelObjective,
    /// Provider that actually served the task.
    pub provider: String,
    /// Chain and failover trace.
    pub provider_trace: ProviderTrace,
    /// Target metric.
    pub metric_id: String,
    /// Completion status.
    pub status: ModelRunStatus,
    /// Quality warnings raised during the run.
    pub quality_warnings: Vec<String>,
    /// Run timestamp.
    pub started_at: Timestamp,
}

// ============================================================================
// SECTION: Forecast and Anomaly Points
// ============================================================================

/// A single forecast point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Horizon step, starting at 1.
    pub step: u32,
    /// Extrapolated value.
    pub value: f64,
}

/// A detected anomaly within a metric history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    /// Bucket the anomaly falls in.
    pub bucket: String,
    /// Observed value.
    pub value: f64,
    /// Z-score hint for triage.
    pub z_hint: f64,
}

// ============================================================================
// SECTION: Recommended Actions
// ============================================================================

/// Execution state of a recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionExecutionState {
    /// Autopilot executed the action.
    Executed,
    /// Action awaits a human decision.
    Pending,
    /// A human rejected the action.
    Rejected,
}

/// A policy-evaluated recommended action attached to an insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    /// Action identifier.
    pub id: ActionId,
    /// Action type evaluated against the allowlist.
    pub action_type: String,
    /// System the action would touch.
    pub target_system: String,
    /// Whether the proposal itself demands approval.
    pub requires_approval: bool,
    /// Policy decision for the action.
    pub policy_decision: PolicyDecision,
    /// Stable reason label for the decision.
    pub policy_reason: String,
    /// Confidence inherited from the insight.
    pub confidence: f64,
    /// Estimated budget impact in USD.
    pub estimated_budget_impact_usd: f64,
    /// Execution state after autopilot gating.
    pub execution_state: ActionExecutionState,
}

/// A recorded human decision over a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionApproval {
    /// Approval identifier.
    pub id: ApprovalId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Action decided on.
    pub action_id: ActionId,
    /// Decision taken.
    pub decision: ApprovalDecision,
    /// Optional reviewer note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Decision timestamp.
    pub decided_at: Timestamp,
}

/// Approval decision over a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Execute the action.
    Approve,
    /// Reject the action.
    Reject,
}

// ============================================================================
// SECTION: Insights
// ============================================================================

/// Severity ranking for an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    /// High-confidence, routine insight.
    Low,
    /// Mid-confidence insight worth a look.
    Medium,
    /// Low-confidence or alarming insight.
    High,
}

/// Forecast block attached to an insight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastBlock {
    /// Extrapolated points over the horizon.
    pub points: Vec<ForecastPoint>,
    /// History cursor: last observed bucket, when any history existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observed: Option<IsoDate>,
}

/// Synthesized insight produced by a model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Insight identifier.
    pub id: InsightId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Producing model run.
    pub model_run_id: ModelRunId,
    /// Severity ranking.
    pub severity: InsightSeverity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Task objective.
    pub objective: ModelObjective,
    /// Target metric.
    pub metric_id: String,
    /// Human-readable summary.
    pub summary: String,
    /// Forecast output.
    pub forecast: ForecastBlock,
    /// Detected anomalies.
    pub anomalies: Vec<AnomalyPoint>,
    /// Policy-evaluated recommended actions.
    pub recommended_actions: Vec<RecommendedAction>,
    /// Quality warnings inherited from the run.
    pub quality_warnings: Vec<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}
