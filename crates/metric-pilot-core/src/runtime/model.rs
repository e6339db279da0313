// crates/metric-pilot-core/src/runtime/model.rs
// ============================================================================
// Module: Metric Pilot Model Runner
// Description: Provider-chain failover, forecasting, anomaly scanning.
// Purpose: Run model tasks and synthesize policy-evaluated insights.
// Dependencies: crate::core, crate::runtime::metrics
// ============================================================================

//! ## Overview
//! The runner consults an ordered, deduplicated provider chain, skipping
//! providers in cooldown and marking failures with a cooldown window.
//! Modeling itself is deliberately simple: a linear extrapolation for
//! forecasts and a z-score scan for anomalies. Every proposed action is
//! evaluated through the autonomy policy, and autopilot decides whether it
//! executes or waits for a human.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::ActionExecutionState;
use crate::core::ActionId;
use crate::core::ActionProposal;
use crate::core::AnomalyPoint;
use crate::core::CoreError;
use crate::core::FailoverStep;
use crate::core::ForecastBlock;
use crate::core::ForecastPoint;
use crate::core::Insight;
use crate::core::InsightId;
use crate::core::InsightSeverity;
use crate::core::IsoDate;
use crate::core::MetricGrain;
use crate::core::ModelObjective;
use crate::core::ModelRun;
use crate::core::ModelRunId;
use crate::core::ModelRunStatus;
use crate::core::ModelTaskOutcome;
use crate::core::ModelTaskRequest;
use crate::core::PlatformState;
use crate::core::ProviderTrace;
use crate::core::RecommendedAction;
use crate::core::Tenant;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::can_autopilot;
use crate::core::evaluate_action_policy;
use crate::runtime::metrics::MetricPoint;
use crate::runtime::metrics::MetricQuery;
use crate::runtime::metrics::query_metric;
use crate::runtime::metrics::round3;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Warning raised when the metric history is too short for reliable modeling.
pub const WARNING_INSUFFICIENT_HISTORY: &str = "insufficient_history_for_reliable_modeling";

/// Warning raised when every provider in the chain failed.
pub const WARNING_FAILOVER_EXHAUSTED: &str = "provider_failover_exhausted_using_managed";

/// Warning raised when any provider was skipped or failed before success.
pub const WARNING_FAILOVER_USED: &str = "provider_failover_used";

/// Z-score multiplier for the anomaly scan.
const ANOMALY_Z_THRESHOLD: f64 = 1.8;

// ============================================================================
// SECTION: Provider Selection
// ============================================================================

/// Builds the deduplicated, order-preserving provider chain for a task.
fn build_chain(tenant: &Tenant, request: &ModelTaskRequest) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut push = |provider: &str| {
        if !provider.is_empty() && !chain.iter().any(|existing| existing == provider) {
            chain.push(provider.to_string());
        }
    };
    if let Some(provider) = &request.provider {
        push(provider);
    }
    if request.prefer_byo {
        for provider in &tenant.model_config.byo_providers {
            push(provider);
        }
    }
    if let Some(provider) = &tenant.model_config.default_provider {
        push(provider);
    }
    for provider in &tenant.model_config.failover_chain {
        push(provider);
    }
    push("managed");
    chain
}

/// Selects a provider from the chain, recording failover history.
///
/// Selection and health updates happen in one pass so the cooldown state the
/// loop observes is the state it mutates.
fn select_provider(
    state: &mut PlatformState,
    tenant: &Tenant,
    request: &ModelTaskRequest,
    now: Timestamp,
) -> (String, ProviderTrace, Vec<String>) {
    let chain = build_chain(tenant, request);
    let mut trace = ProviderTrace {
        chain: chain.clone(),
        failover_trace: Vec::new(),
    };
    let mut warnings = Vec::new();
    let mut degraded = false;
    for provider in &chain {
        if state.provider_health_mut(&tenant.id, provider).is_cooling_down(now) {
            trace.failover_trace.push(FailoverStep {
                provider: provider.clone(),
                outcome: "skipped_cooldown".to_string(),
            });
            degraded = true;
            continue;
        }
        let fails = request.simulate_provider_failures.contains(provider)
            || provider.contains("down");
        if fails {
            let cooldown = now.plus_minutes(tenant.model_config.provider_cooldown_minutes);
            let health = state.provider_health_mut(&tenant.id, provider);
            health.fail_count += 1;
            health.last_error = Some("provider unavailable".to_string());
            health.cooldown_until = Some(cooldown);
            trace.failover_trace.push(FailoverStep {
                provider: provider.clone(),
                outcome: "failed".to_string(),
            });
            degraded = true;
            continue;
        }
        let health = state.provider_health_mut(&tenant.id, provider);
        health.success_count += 1;
        trace.failover_trace.push(FailoverStep {
            provider: provider.clone(),
            outcome: "selected".to_string(),
        });
        if degraded {
            warnings.push(WARNING_FAILOVER_USED.to_string());
        }
        return (provider.clone(), trace, warnings);
    }
    // Every provider failed; degrade to managed with a warning.
    trace.failover_trace.push(FailoverStep {
        provider: "managed".to_string(),
        outcome: "forced".to_string(),
    });
    warnings.push(WARNING_FAILOVER_EXHAUSTED.to_string());
    warnings.push(WARNING_FAILOVER_USED.to_string());
    ("managed".to_string(), trace, warnings)
}

// ============================================================================
// SECTION: Modeling
// ============================================================================

/// Linear forecast over the history: slope from endpoints, extrapolated
/// `horizon_days` steps past the last observation.
fn forecast_points(history: &[MetricPoint], horizon_days: u32) -> Vec<ForecastPoint> {
    if history.len() < 2 {
        return Vec::new();
    }
    let first = history[0].value;
    let last = history[history.len() - 1].value;
    #[allow(clippy::cast_precision_loss, reason = "history lengths are small")]
    let slope = (last - first) / ((history.len() - 1).max(1)) as f64;
    (1..=horizon_days)
        .map(|step| ForecastPoint {
            step,
            value: round3(f64::from(step).mul_add(slope, last)),
        })
        .collect()
}

/// Z-score anomaly scan; requires at least ten observations.
fn anomaly_points(history: &[MetricPoint]) -> Vec<AnomalyPoint> {
    if history.len() < 10 {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss, reason = "history lengths are small")]
    let n = history.len() as f64;
    let mean = history.iter().map(|point| point.value).sum::<f64>() / n;
    let variance =
        history.iter().map(|point| (point.value - mean).powi(2)).sum::<f64>() / n;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return Vec::new();
    }
    history
        .iter()
        .filter(|point| (point.value - mean).abs() > ANOMALY_Z_THRESHOLD * stdev)
        .map(|point| AnomalyPoint {
            bucket: point.bucket.clone(),
            value: point.value,
            z_hint: round3((point.value - mean) / stdev),
        })
        .collect()
}

/// Confidence base by history length, minus one tenth per warning.
fn confidence_for(history_len: usize, warnings: &[String]) -> f64 {
    let base = if history_len >= 30 {
        0.84
    } else if history_len >= 14 {
        0.72
    } else {
        0.54
    };
    #[allow(clippy::cast_precision_loss, reason = "warning counts are small")]
    let adjusted = (base - 0.10 * warnings.len() as f64).max(0.0);
    (adjusted * 100.0).round() / 100.0
}

/// Severity band derived from confidence.
const fn severity_for(confidence: f64) -> InsightSeverity {
    if confidence >= 0.8 {
        InsightSeverity::Low
    } else if confidence >= 0.65 {
        InsightSeverity::Medium
    } else {
        InsightSeverity::High
    }
}

// ============================================================================
// SECTION: Action Proposal
// ============================================================================

/// Raw action proposals per objective, before policy evaluation.
fn propose_actions(objective: ModelObjective) -> Vec<(String, String, bool, f64)> {
    match objective {
        ModelObjective::Forecast => vec![
            ("adjust_budget".to_string(), "google_ads".to_string(), true, 2_500.0),
            ("create_report".to_string(), "reporting".to_string(), false, 0.0),
        ],
        ModelObjective::Anomaly => {
            vec![("notify_owner".to_string(), "slack".to_string(), false, 0.0)]
        }
    }
}

/// Evaluates proposals through the autonomy policy and autopilot gate.
fn evaluate_actions(
    tenant: &Tenant,
    objective: ModelObjective,
    confidence: f64,
) -> Vec<RecommendedAction> {
    propose_actions(objective)
        .into_iter()
        .map(|(action_type, target_system, requires_approval, impact)| {
            let proposal = ActionProposal {
                action_type: action_type.clone(),
                confidence,
                estimated_budget_impact_usd: impact,
            };
            let evaluation = evaluate_action_policy(&tenant.autonomy_policy, &proposal);
            let execution_state = if can_autopilot(&tenant.autonomy_policy, &evaluation) {
                ActionExecutionState::Executed
            } else {
                ActionExecutionState::Pending
            };
            RecommendedAction {
                id: ActionId::generate(),
                action_type,
                target_system,
                requires_approval,
                policy_decision: evaluation.decision,
                policy_reason: evaluation.reason,
                confidence,
                estimated_budget_impact_usd: impact,
                execution_state,
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Task Execution
// ============================================================================

/// Runs a model task end to end: provider selection, modeling, action
/// proposal, and insight synthesis.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown and `BadRequest` when no
/// target metric can be resolved.
pub fn run_model_task(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: ModelTaskRequest,
    now: Timestamp,
) -> Result<ModelTaskOutcome, CoreError> {
    let tenant = state
        .tenant(tenant_id)
        .ok_or_else(|| CoreError::not_found("tenant not found"))?
        .clone();
    let metric_id = request
        .output_metric_ids
        .first()
        .cloned()
        .ok_or_else(|| CoreError::bad_request("outputMetricIds must name a target metric"))?;
    let objective = request.objective.unwrap_or(ModelObjective::Forecast);
    let horizon_days = request.horizon_days.unwrap_or(7).clamp(1, 90);

    let (provider, provider_trace, mut warnings) =
        select_provider(state, &tenant, &request, now);

    let history = query_metric(
        state,
        tenant_id,
        &MetricQuery {
            metric_id: Some(metric_id.clone()),
            grain: Some(MetricGrain::Day),
            start_date: None,
            end_date: None,
        },
    )?
    .series;

    if history.len() < 14 {
        warnings.push(WARNING_INSUFFICIENT_HISTORY.to_string());
    }
    let forecast = match objective {
        ModelObjective::Forecast => ForecastBlock {
            points: forecast_points(&history, horizon_days),
            last_observed: history
                .last()
                .and_then(|point| IsoDate::parse(&point.bucket).ok()),
        },
        ModelObjective::Anomaly => ForecastBlock::default(),
    };
    let anomalies = match objective {
        ModelObjective::Anomaly => anomaly_points(&history),
        ModelObjective::Forecast => Vec::new(),
    };

    let confidence = confidence_for(history.len(), &warnings);
    let severity = severity_for(confidence);
    let status = if warnings.is_empty() {
        ModelRunStatus::Completed
    } else {
        ModelRunStatus::CompletedWithWarnings
    };
    let actions = evaluate_actions(&tenant, objective, confidence);

    let run = ModelRun {
        id: ModelRunId::generate(),
        tenant_id: tenant_id.clone(),
        objective,
        provider,
        provider_trace,
        metric_id: metric_id.clone(),
        status,
        quality_warnings: warnings.clone(),
        started_at: now,
    };
    let insight = Insight {
        id: InsightId::generate(),
        tenant_id: tenant_id.clone(),
        model_run_id: run.id.clone(),
        severity,
        confidence,
        objective,
        metric_id: metric_id.clone(),
        summary: summarize(objective, &metric_id, &history, &forecast, &anomalies),
        forecast,
        anomalies,
        recommended_actions: actions,
        quality_warnings: warnings,
        created_at: now,
    };
    state.model_runs.push(run.clone());
    state.insights.push(insight.clone());
    Ok(ModelTaskOutcome {
        run,
        insight,
    })
}

/// Builds the one-line insight summary.
fn summarize(
    objective: ModelObjective,
    metric_id: &str,
    history: &[MetricPoint],
    forecast: &ForecastBlock,
    anomalies: &[AnomalyPoint],
) -> String {
    match objective {
        ModelObjective::Forecast => match (history.last(), forecast.points.last()) {
            (Some(last), Some(end)) => format!(
                "{metric_id} projected to move from {:.2} to {:.2} over {} steps",
                last.value,
                end.value,
                forecast.points.len()
            ),
            _ => format!("{metric_id} has insufficient history for a forecast"),
        },
        ModelObjective::Anomaly => {
            format!("{metric_id} scan found {} anomalies", anomalies.len())
        }
    }
}
