// crates/metric-pilot-core/src/runtime/skills.rs
// ============================================================================
// Module: Metric Pilot Skill Runtime
// Description: Skill routing, signature verification, guardrails, dispatch.
// Purpose: Execute signed skill packs deterministic-first under guardrails.
// Dependencies: crate::core, crate::interfaces, crate::runtime::metrics
// ============================================================================

//! ## Overview
//! Running a skill pack proceeds in fixed order: route to an installed skill
//! (explicit id or trigger scoring), verify the stored manifest's signature,
//! evaluate the ordered guardrail list, then dispatch tools: deterministic
//! compute tools first, model and report tools through the injected adapter
//! surface. Post-checks can downgrade the run to `completed_with_warning`
//! but never fail it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::CheckStatus;
use crate::core::CoreError;
use crate::core::GuardrailCheck;
use crate::core::InstalledSkill;
use crate::core::ModelObjective;
use crate::core::ModelTaskRequest;
use crate::core::PlatformState;
use crate::core::ReportRequest;
use crate::core::SkillArtifacts;
use crate::core::SkillDraft;
use crate::core::SkillDraftId;
use crate::core::SkillInstallId;
use crate::core::SkillManifest;
use crate::core::SkillPrecedence;
use crate::core::SkillRun;
use crate::core::SkillRunId;
use crate::core::SkillRunStatus;
use crate::core::SkillRunTrace;
use crate::core::SkillToolTrace;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::bundled_skill_catalog;
use crate::core::ensure_valid_manifest;
use crate::core::sign_manifest;
use crate::interfaces::RunAdapters;
use crate::runtime::metrics::MetricQuery;
use crate::runtime::metrics::query_metric;
use crate::runtime::metrics::round3;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A skill run request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRunRequest {
    /// Explicit skill to run (versioned id or base id).
    #[serde(default)]
    pub skill_id: Option<String>,
    /// Intent text used for routing and objective selection.
    #[serde(default)]
    pub intent: String,
    /// Free-form input text scored during routing.
    #[serde(default)]
    pub input: String,
    /// Originating channel.
    #[serde(default)]
    pub channel: Option<String>,
    /// Tools the caller wants; empty means every allowed tool.
    #[serde(default)]
    pub requested_tools: Vec<String>,
    /// Whether `reports.generate` should produce a report.
    #[serde(default)]
    pub generate_report: bool,
    /// Caller-estimated model tokens.
    #[serde(default)]
    pub estimated_tokens: Option<u64>,
    /// Caller-estimated context tokens.
    #[serde(default)]
    pub context_tokens_estimate: Option<u64>,
    /// Caller-declared timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ============================================================================
// SECTION: Install and Activation
// ============================================================================

/// Installs a manifest for a tenant and activates it.
///
/// Activation deactivates every other install sharing the base id.
///
/// # Errors
///
/// Returns `BadRequest` when the manifest fails validation.
pub fn install_skill(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    manifest: SkillManifest,
    precedence: SkillPrecedence,
    now: Timestamp,
) -> Result<InstalledSkill, CoreError> {
    ensure_valid_manifest(&manifest)?;
    let signature = sign_manifest(&manifest)?;
    let installed = InstalledSkill {
        install_id: SkillInstallId::generate(),
        id: manifest.versioned_id(),
        tenant_id: tenant_id.clone(),
        manifest,
        signature,
        precedence,
        active: true,
        installed_at: now,
    };
    deactivate_base(state, tenant_id, &installed.manifest.id);
    state.skills.push(installed.clone());
    Ok(installed)
}

/// Deactivates every install of a base id for a tenant.
fn deactivate_base(state: &mut PlatformState, tenant_id: &TenantId, base_id: &str) {
    for skill in &mut state.skills {
        if skill.tenant_id == *tenant_id && skill.manifest.id == base_id {
            skill.active = false;
        }
    }
}

/// Activates or deactivates an installed skill by versioned or base id.
///
/// # Errors
///
/// Returns `NotFound` when no install matches.
pub fn set_skill_active(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    skill_id: &str,
    active: bool,
) -> Result<InstalledSkill, CoreError> {
    let base_id = {
        let skill = state
            .skills
            .iter()
            .rev()
            .find(|skill| {
                skill.tenant_id == *tenant_id
                    && (skill.id == skill_id || skill.manifest.id == skill_id)
            })
            .ok_or_else(|| CoreError::not_found("skill not found"))?;
        skill.manifest.id.clone()
    };
    if active {
        deactivate_base(state, tenant_id, &base_id);
    }
    let skill = state
        .skills
        .iter_mut()
        .rev()
        .find(|skill| {
            skill.tenant_id == *tenant_id
                && (skill.id == skill_id || skill.manifest.id == skill_id)
        })
        .ok_or_else(|| CoreError::not_found("skill not found"))?;
    skill.active = active;
    Ok(skill.clone())
}

// ============================================================================
// SECTION: Drafts
// ============================================================================

/// Creates a skill draft.
///
/// Drafts accept invalid manifests; validation happens on demand and at
/// publish time.
pub fn create_draft(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    manifest: SkillManifest,
    now: Timestamp,
) -> SkillDraft {
    let draft = SkillDraft {
        id: SkillDraftId::generate(),
        tenant_id: tenant_id.clone(),
        manifest,
        created_at: now,
        updated_at: now,
    };
    state.skill_drafts.push(draft.clone());
    draft
}

/// Replaces a draft's manifest.
///
/// # Errors
///
/// Returns `NotFound` for unknown drafts.
pub fn patch_draft(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    draft_id: &SkillDraftId,
    manifest: SkillManifest,
    now: Timestamp,
) -> Result<SkillDraft, CoreError> {
    let draft = state
        .skill_drafts
        .iter_mut()
        .find(|draft| draft.id == *draft_id && draft.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("skill draft not found"))?;
    draft.manifest = manifest;
    draft.updated_at = now;
    Ok(draft.clone())
}

/// Publishes a draft: validates, installs, and activates it.
///
/// # Errors
///
/// Returns `NotFound` for unknown drafts and `BadRequest` when the manifest
/// fails validation.
pub fn publish_draft(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    draft_id: &SkillDraftId,
    now: Timestamp,
) -> Result<InstalledSkill, CoreError> {
    let manifest = state
        .skill_drafts
        .iter()
        .find(|draft| draft.id == *draft_id && draft.tenant_id == *tenant_id)
        .map(|draft| draft.manifest.clone())
        .ok_or_else(|| CoreError::not_found("skill draft not found"))?;
    install_skill(state, tenant_id, manifest, SkillPrecedence::Local, now)
}

/// Installs a bundled catalog skill by base id.
///
/// # Errors
///
/// Returns `NotFound` when the catalog has no such skill.
pub fn install_from_catalog(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    base_id: &str,
    now: Timestamp,
) -> Result<InstalledSkill, CoreError> {
    let manifest = bundled_skill_catalog()
        .into_iter()
        .find(|manifest| manifest.id == base_id)
        .ok_or_else(|| CoreError::not_found("skill not found in catalog"))?;
    install_skill(state, tenant_id, manifest, SkillPrecedence::Bundled, now)
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Routes a request to an installed skill.
///
/// Explicit ids match versioned or base id. Otherwise active skills are
/// scored: +1 for a channel match, +3 per trigger intent token found in the
/// intent or input text; precedence pre-sort breaks ties.
fn route_skill(
    state: &PlatformState,
    tenant_id: &TenantId,
    request: &SkillRunRequest,
) -> Result<(InstalledSkill, String), CoreError> {
    if let Some(skill_id) = &request.skill_id {
        let skill = state
            .skills
            .iter()
            .rev()
            .find(|skill| {
                skill.tenant_id == *tenant_id
                    && skill.active
                    && (skill.id == *skill_id || skill.manifest.id == *skill_id)
            })
            .ok_or_else(|| CoreError::not_found("skill not found"))?;
        return Ok((skill.clone(), "explicit".to_string()));
    }
    let haystack =
        format!("{} {}", request.intent, request.input).to_ascii_lowercase();
    let channel = request.channel.clone().unwrap_or_default();
    let mut candidates: Vec<&InstalledSkill> = state
        .skills
        .iter()
        .filter(|skill| skill.tenant_id == *tenant_id && skill.active)
        .collect();
    // Higher precedence first so ties resolve workspace > local > bundled.
    candidates.sort_by(|a, b| b.precedence.cmp(&a.precedence));
    let mut best: Option<(&InstalledSkill, u32)> = None;
    for skill in candidates {
        let mut score = 0u32;
        if skill.manifest.triggers.channels.iter().any(|trigger| trigger == &channel) {
            score += 1;
        }
        for intent in &skill.manifest.triggers.intents {
            if haystack.contains(&intent.to_ascii_lowercase()) {
                score += 3;
            }
        }
        if score > 0 && best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((skill, score));
        }
    }
    best.map(|(skill, score)| (skill.clone(), format!("scored:{score}")))
        .ok_or_else(|| CoreError::not_found("no skill matched the request"))
}

// ============================================================================
// SECTION: Guardrails
// ============================================================================

/// Evaluates the ordered guardrail list for a run.
///
/// # Errors
///
/// Returns `Forbidden` for kill switches and tool violations, `BadRequest`
/// for budget violations; every error carries the check list so far.
fn evaluate_guardrails(
    state: &PlatformState,
    tenant_id: &TenantId,
    skill: &InstalledSkill,
    request: &SkillRunRequest,
    requested_tools: &[String],
) -> Result<Vec<GuardrailCheck>, CoreError> {
    let mut checks = Vec::new();
    let tenant_kill = state.tenant(tenant_id).is_some_and(|tenant| tenant.autonomy_policy.kill_switch);
    if tenant_kill {
        checks.push(GuardrailCheck::fail("tenant_kill_switch", "tenant kill switch is on"));
        return Err(CoreError::forbidden("tenant kill switch is enabled").with_checks(checks));
    }
    checks.push(GuardrailCheck::pass("tenant_kill_switch"));

    if skill.manifest.guardrails.kill_switch {
        checks.push(GuardrailCheck::fail("skill_kill_switch", "skill kill switch is on"));
        return Err(CoreError::forbidden("skill kill switch is enabled").with_checks(checks));
    }
    checks.push(GuardrailCheck::pass("skill_kill_switch"));

    let allowed = skill.manifest.allowed_tools();
    let denied: Vec<&String> = requested_tools
        .iter()
        .filter(|tool| !allowed.contains(&tool.as_str()))
        .collect();
    if denied.is_empty() {
        checks.push(GuardrailCheck::pass("tool_allowlist"));
    } else {
        let detail = format!(
            "tools not allowed by manifest: {}",
            denied.iter().map(|tool| tool.as_str()).collect::<Vec<_>>().join(", ")
        );
        checks.push(GuardrailCheck::fail("tool_allowlist", detail.clone()));
        return Err(CoreError::forbidden(detail).with_checks(checks));
    }

    let guardrails = &skill.manifest.guardrails;
    let budgets = [
        ("token_budget", request.estimated_tokens, guardrails.token_budget),
        (
            "context_token_budget",
            request.context_tokens_estimate,
            guardrails.context_token_budget,
        ),
        ("time_budget", request.timeout_ms, guardrails.time_budget_ms),
    ];
    for (name, declared, budget) in budgets {
        if declared.is_some_and(|value| value > budget) {
            checks.push(GuardrailCheck::fail(name, format!("declared value exceeds {budget}")));
            return Err(
                CoreError::bad_request(format!("{name} exceeded")).with_checks(checks)
            );
        }
        checks.push(GuardrailCheck::pass(name));
    }
    Ok(checks)
}

// ============================================================================
// SECTION: Deterministic Tools
// ============================================================================

/// Sums the last thirty days of a metric for a snapshot pack.
fn metric_total(state: &PlatformState, tenant_id: &TenantId, metric_id: &str, now: Timestamp) -> f64 {
    query_metric(
        state,
        tenant_id,
        &MetricQuery {
            metric_id: Some(metric_id.to_string()),
            grain: None,
            start_date: Some(now.to_date().minus_days(30)),
            end_date: Some(now.to_date()),
        },
    )
    .map(|series| series.summary.total)
    .unwrap_or(0.0)
}

/// `compute.finance_snapshot`: cash position and runway KPI pack.
fn finance_snapshot(state: &PlatformState, tenant_id: &TenantId, now: Timestamp) -> Value {
    let cash_in = metric_total(state, tenant_id, "cash_in", now);
    let cash_out = metric_total(state, tenant_id, "cash_out", now);
    let runway_days = if cash_out == 0.0 {
        999.0
    } else {
        round3((cash_in - cash_out).max(0.0) / cash_out * 30.0)
    };
    json!({
        "cash_in_30d": round3(cash_in),
        "cash_out_30d": round3(cash_out),
        "net_30d": round3(cash_in - cash_out),
        "runway_days": runway_days,
    })
}

/// `compute.data_quality_snapshot`: latest run quality per connection.
fn data_quality_snapshot(state: &PlatformState, tenant_id: &TenantId, now: Timestamp) -> Value {
    let mut sources = Vec::new();
    let mut worst: Option<f64> = None;
    for connection in
        state.connections.iter().filter(|connection| connection.tenant_id == *tenant_id)
    {
        let latest = state.latest_source_run(&connection.id);
        let quality = latest.map(|run| run.diagnostics.quality_score);
        if let Some(score) = quality {
            worst = Some(worst.map_or(score, |current| current.min(score)));
        }
        sources.push(json!({
            "connection_id": connection.id,
            "source_type": connection.source_type,
            "quality_score": quality,
            "age_hours": latest.map(|run| run.started_at.age_hours(now)),
            "quality_passed": latest.map(|run| run.diagnostics.quality_passed),
        }));
    }
    json!({
        "sources": sources,
        "quality_score": worst.unwrap_or(1.0),
    })
}

/// `compute.deal_desk_snapshot`: pipeline KPI pack.
fn deal_desk_snapshot(state: &PlatformState, tenant_id: &TenantId, now: Timestamp) -> Value {
    let created = metric_total(state, tenant_id, "deals_created", now);
    let won = metric_total(state, tenant_id, "deals_won", now);
    json!({
        "deals_created_30d": round3(created),
        "deals_won_30d": round3(won),
        "win_rate": if created == 0.0 { 0.0 } else { round3(won / created) },
        "pipeline_value_30d": round3(metric_total(state, tenant_id, "pipeline_value", now)),
    })
}

// ============================================================================
// SECTION: Run Execution
// ============================================================================

/// Target metric modeled per bundled base id.
fn target_metric_for(base_id: &str) -> &'static str {
    match base_id {
        "finance-health" => "profit",
        "deal-desk" => "pipeline_value",
        _ => "revenue",
    }
}

/// Runs a skill pack end to end.
///
/// # Errors
///
/// Returns `NotFound` when routing finds nothing, `Forbidden` on signature or
/// guardrail violations, and `BadRequest` on budget violations.
pub fn run_skill_pack(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: &SkillRunRequest,
    adapters: &dyn RunAdapters,
    now: Timestamp,
) -> Result<SkillRun, CoreError> {
    let (skill, routing) = route_skill(state, tenant_id, request)?;

    // Signature check precedes every tool dispatch.
    let recomputed = sign_manifest(&skill.manifest)?;
    if recomputed != skill.signature {
        return Err(CoreError::forbidden("signature verification failed"));
    }

    let allowed: Vec<String> =
        skill.manifest.allowed_tools().iter().map(ToString::to_string).collect();
    let requested: Vec<String> = if request.requested_tools.is_empty() {
        allowed.clone()
    } else {
        request.requested_tools.clone()
    };
    let guardrails = evaluate_guardrails(state, tenant_id, &skill, request, &requested)?;

    let mut artifacts = SkillArtifacts::default();
    let mut deterministic_executed = Vec::new();
    let mut reasoning_hints = Vec::new();
    let mut quality_snapshot_score: Option<f64> = None;

    // Deterministic tools run before any adapter-backed tool.
    for tool in requested.iter().filter(|tool| tool.starts_with("compute.")) {
        let output = match tool.as_str() {
            "compute.finance_snapshot" => finance_snapshot(state, tenant_id, now),
            "compute.data_quality_snapshot" => {
                let snapshot = data_quality_snapshot(state, tenant_id, now);
                quality_snapshot_score = snapshot.get("quality_score").and_then(Value::as_f64);
                snapshot
            }
            "compute.deal_desk_snapshot" => deal_desk_snapshot(state, tenant_id, now),
            _ => continue,
        };
        artifacts.deterministic_outputs.insert(tool.clone(), output);
        deterministic_executed.push(tool.clone());
    }

    let mut confidence = 0.7;
    if requested.iter().any(|tool| tool == "model.run") {
        let intent = request.intent.to_ascii_lowercase();
        let objective = if intent.contains("anomaly") || intent.contains("quality") {
            ModelObjective::Anomaly
        } else {
            ModelObjective::Forecast
        };
        let outcome = adapters.run_model(
            state,
            tenant_id,
            ModelTaskRequest {
                objective: Some(objective),
                output_metric_ids: vec![target_metric_for(&skill.manifest.id).to_string()],
                horizon_days: Some(7),
                ..ModelTaskRequest::default()
            },
            now,
        )?;
        confidence = outcome.insight.confidence;
        reasoning_hints.push(outcome.insight.summary.clone());
        artifacts.model = Some(outcome.run.id.clone());
        artifacts.models.push(outcome.run.id);
    }

    if request.generate_report && requested.iter().any(|tool| tool == "reports.generate") {
        let outcome = adapters.generate_report(
            state,
            tenant_id,
            ReportRequest {
                title: Some(format!("{} report", skill.manifest.name)),
                ..ReportRequest::default()
            },
            now,
        )?;
        artifacts.report = Some(outcome.report.id.clone());
        artifacts.reports.push(outcome.report.id);
    }

    // Post-checks downgrade but never fail the run.
    let mut status = SkillRunStatus::Completed;
    let mut warnings = Vec::new();
    if confidence < skill.manifest.guardrails.confidence_min {
        status = SkillRunStatus::CompletedWithWarning;
        warnings.push("confidence_below_skill_threshold".to_string());
    }
    if quality_snapshot_score.is_some_and(|score| score < 0.70) {
        status = SkillRunStatus::CompletedWithWarning;
        warnings.push("low_data_quality".to_string());
    }
    reasoning_hints.extend(warnings);

    let run = SkillRun {
        id: SkillRunId::generate(),
        skill_id: skill.id.clone(),
        base_id: skill.manifest.id.clone(),
        tenant_id: tenant_id.clone(),
        channel: request.channel.clone().unwrap_or_else(|| "api".to_string()),
        intent: request.intent.clone(),
        status,
        confidence,
        artifacts,
        trace: SkillRunTrace {
            routing,
            tools: SkillToolTrace {
                requested,
                allowed,
                deterministic_executed,
            },
            guardrails,
        },
        reasoning_hints,
        started_at: now,
    };
    state.skill_runs.push(run.clone());
    Ok(run)
}

// ============================================================================
// SECTION: Validation Surface
// ============================================================================

/// Validates a draft's manifest on demand.
///
/// # Errors
///
/// Returns `NotFound` for unknown drafts.
pub fn validate_draft(
    state: &PlatformState,
    tenant_id: &TenantId,
    draft_id: &SkillDraftId,
) -> Result<Vec<GuardrailCheck>, CoreError> {
    let draft = state
        .skill_drafts
        .iter()
        .find(|draft| draft.id == *draft_id && draft.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("skill draft not found"))?;
    Ok(crate::core::validate_manifest(&draft.manifest))
}

/// Returns true when a validation check list is all passing.
#[must_use]
pub fn validation_passed(checks: &[GuardrailCheck]) -> bool {
    checks.iter().all(|check| check.status != CheckStatus::Fail)
}
