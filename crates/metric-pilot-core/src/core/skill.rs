// crates/metric-pilot-core/src/core/skill.rs
// ============================================================================
// Module: Metric Pilot Skill Packs
// Description: Skill manifests, signatures, installs, drafts, and run records.
// Purpose: Model versioned, signed packs of triggers, tools, and guardrails.
// Dependencies: crate::core::{error, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A skill pack is a versioned manifest describing when it triggers, which
//! tools it may call, and the guardrails bounding its execution. Manifests are
//! signed with a SHA-256 digest over their canonical JSON form; the signature
//! detects tampering of installed skills, not publisher identity. At most one
//! install per `(tenant, base id)` is active at a time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::CheckStatus;
use crate::core::error::CoreError;
use crate::core::error::GuardrailCheck;
use crate::core::hashing::sha256_canonical_json;
use crate::core::identifiers::ModelRunId;
use crate::core::identifiers::ReportId;
use crate::core::identifiers::SkillDraftId;
use crate::core::identifiers::SkillInstallId;
use crate::core::identifiers::SkillRunId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tool Catalog
// ============================================================================

/// Tool identifiers the runtime can dispatch.
pub const TOOL_CATALOG: &[&str] = &[
    "compute.finance_snapshot",
    "compute.data_quality_snapshot",
    "compute.deal_desk_snapshot",
    "model.run",
    "reports.generate",
];

/// Returns true when a tool id is dispatchable or declared custom.
#[must_use]
pub fn is_known_tool(id: &str) -> bool {
    TOOL_CATALOG.contains(&id) || id.starts_with("custom.")
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Trigger configuration for a skill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTriggers {
    /// Intent tokens the skill responds to; must be non-empty.
    #[serde(default)]
    pub intents: Vec<String>,
    /// Channels the skill prefers.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// A tool grant within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTool {
    /// Tool identifier.
    pub id: String,
    /// Whether the skill may call the tool.
    pub allow: bool,
}

/// Guardrails bounding a skill's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGuardrails {
    /// Minimum confidence below which runs are flagged.
    pub confidence_min: f64,
    /// Action types always requiring human approval.
    #[serde(default)]
    pub human_approval_for: Vec<String>,
    /// Budget cap in USD.
    pub budget_cap_usd: f64,
    /// Model token budget.
    pub token_budget: u64,
    /// Wall-clock budget in milliseconds.
    pub time_budget_ms: u64,
    /// Context token budget.
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: u64,
    /// Per-skill emergency stop.
    #[serde(default)]
    pub kill_switch: bool,
}

/// Default context token budget applied when the manifest omits it.
const fn default_context_token_budget() -> u64 {
    1_400
}

impl Default for SkillGuardrails {
    fn default() -> Self {
        Self {
            confidence_min: 0.5,
            human_approval_for: Vec::new(),
            budget_cap_usd: 1_000.0,
            token_budget: 8_000,
            time_budget_ms: 30_000,
            context_token_budget: default_context_token_budget(),
            kill_switch: false,
        }
    }
}

/// Prompt templates carried by a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPrompts {
    /// System prompt for model-backed steps.
    #[serde(default)]
    pub system: String,
}

/// Risk ranking declared by the manifest author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillRiskLevel {
    /// Read-only or advisory skill.
    Low,
    /// Skill can propose actions.
    Medium,
    /// Skill can propose high-impact actions.
    High,
}

/// Versioned skill manifest.
///
/// # Invariants
/// - `id` matches `^[a-z0-9-]{2,80}$`; `version` is semver.
/// - `tools` is non-empty and every id is catalogued or `custom.`-prefixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillManifest {
    /// Base skill identifier.
    pub id: String,
    /// Semver version string.
    pub version: String,
    /// Display name.
    pub name: String,
    /// Description of what the skill does.
    pub description: String,
    /// Trigger configuration.
    pub triggers: SkillTriggers,
    /// Tool grants.
    pub tools: Vec<SkillTool>,
    /// Execution guardrails.
    pub guardrails: SkillGuardrails,
    /// Prompt templates.
    #[serde(default)]
    pub prompts: SkillPrompts,
    /// Schedule expressions the skill can run on.
    #[serde(default)]
    pub schedules: Vec<String>,
    /// Declared risk level.
    pub risk_level: SkillRiskLevel,
}

impl SkillManifest {
    /// Returns the versioned install id (`{base}@{version}`).
    #[must_use]
    pub fn versioned_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    /// Returns tool ids the manifest allows.
    #[must_use]
    pub fn allowed_tools(&self) -> Vec<&str> {
        self.tools.iter().filter(|tool| tool.allow).map(|tool| tool.id.as_str()).collect()
    }
}

// ============================================================================
// SECTION: Manifest Validation
// ============================================================================

/// Returns true when `id` matches `^[a-z0-9-]{2,80}$`.
fn is_valid_base_id(id: &str) -> bool {
    (2..=80).contains(&id.len())
        && id.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

/// Returns true when `version` is `x.y.z` with an optional prerelease tag.
fn is_valid_semver(version: &str) -> bool {
    let (core, prerelease) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let mut segments = 0usize;
    for segment in core.split('.') {
        if segment.is_empty() || !segment.chars().all(|ch| ch.is_ascii_digit()) {
            return false;
        }
        segments += 1;
    }
    if segments != 3 {
        return false;
    }
    prerelease.is_none_or(|pre| {
        !pre.is_empty()
            && pre
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '-')
    })
}

/// Validates a manifest, returning the ordered check list.
///
/// The check list always covers id, version, triggers, tools, and guardrails
/// so callers can render a full validation report.
#[must_use]
pub fn validate_manifest(manifest: &SkillManifest) -> Vec<GuardrailCheck> {
    let mut checks = Vec::new();
    checks.push(if is_valid_base_id(&manifest.id) {
        GuardrailCheck::pass("manifest_id")
    } else {
        GuardrailCheck::fail("manifest_id", "id must match ^[a-z0-9-]{2,80}$")
    });
    checks.push(if is_valid_semver(&manifest.version) {
        GuardrailCheck::pass("manifest_version")
    } else {
        GuardrailCheck::fail("manifest_version", "version must be semver x.y.z")
    });
    checks.push(if manifest.triggers.intents.is_empty() {
        GuardrailCheck::fail("trigger_intents", "at least one trigger intent is required")
    } else {
        GuardrailCheck::pass("trigger_intents")
    });
    if manifest.tools.is_empty() {
        checks.push(GuardrailCheck::fail("tools", "at least one tool grant is required"));
    } else {
        let unknown: Vec<&str> = manifest
            .tools
            .iter()
            .filter(|tool| !is_known_tool(&tool.id))
            .map(|tool| tool.id.as_str())
            .collect();
        checks.push(if unknown.is_empty() {
            GuardrailCheck::pass("tools")
        } else {
            GuardrailCheck::fail("tools", format!("unknown tools: {}", unknown.join(", ")))
        });
    }
    let bounds_ok = (0.0..=1.0).contains(&manifest.guardrails.confidence_min)
        && manifest.guardrails.token_budget > 0
        && manifest.guardrails.time_budget_ms > 0;
    checks.push(if bounds_ok {
        GuardrailCheck::pass("guardrail_bounds")
    } else {
        GuardrailCheck::fail("guardrail_bounds", "guardrail budgets must be positive")
    });
    checks
}

/// Validates a manifest, failing with the check list attached.
///
/// # Errors
///
/// Returns [`CoreError`] of kind `BadRequest` when any check fails.
pub fn ensure_valid_manifest(manifest: &SkillManifest) -> Result<(), CoreError> {
    let checks = validate_manifest(manifest);
    if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        return Err(CoreError::bad_request("skill manifest validation failed").with_checks(checks));
    }
    Ok(())
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Computes the manifest signature: SHA-256 over canonical JSON.
///
/// # Errors
///
/// Returns [`CoreError`] of kind `Internal` when canonicalization fails.
pub fn sign_manifest(manifest: &SkillManifest) -> Result<String, CoreError> {
    sha256_canonical_json(manifest)
        .map_err(|err| CoreError::internal(format!("manifest signing failed: {err}")))
}

// ============================================================================
// SECTION: Installed Skills
// ============================================================================

/// Precedence tier for skill routing ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillPrecedence {
    /// Shipped with the platform.
    Bundled = 0,
    /// Installed by the tenant.
    Local = 1,
    /// Promoted to the tenant's workspace.
    Workspace = 2,
}

/// An installed, signed skill.
///
/// # Invariants
/// - At most one install per `(tenant_id, base id)` is active at a time.
/// - `signature` equals the SHA-256 canonical-JSON digest of `manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledSkill {
    /// Installation identifier.
    pub install_id: SkillInstallId,
    /// Versioned id (`{base}@{version}`).
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The manifest as installed.
    pub manifest: SkillManifest,
    /// Signature recorded at install time.
    pub signature: String,
    /// Routing precedence tier.
    pub precedence: SkillPrecedence,
    /// Whether this install is the active one for its base id.
    pub active: bool,
    /// Install timestamp.
    pub installed_at: Timestamp,
}

// ============================================================================
// SECTION: Skill Drafts
// ============================================================================

/// An unsigned manifest being authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDraft {
    /// Draft identifier.
    pub id: SkillDraftId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Manifest under edit.
    pub manifest: SkillManifest,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last edit timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Skill Runs
// ============================================================================

/// Skill run completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillRunStatus {
    /// Run completed cleanly.
    Completed,
    /// Run completed but tripped a post-check.
    CompletedWithWarning,
}

/// Artifacts produced by a skill run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillArtifacts {
    /// Outputs of deterministic compute tools, keyed by tool id.
    #[serde(default)]
    pub deterministic_outputs: serde_json::Map<String, Value>,
    /// Primary model run, when one executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRunId>,
    /// All model runs in execution order.
    #[serde(default)]
    pub models: Vec<ModelRunId>,
    /// Primary report, when one was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportId>,
    /// All reports in execution order.
    #[serde(default)]
    pub reports: Vec<ReportId>,
}

/// Tool dispatch trace for a skill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillToolTrace {
    /// Tools the caller requested.
    pub requested: Vec<String>,
    /// Tools the manifest allowed.
    pub allowed: Vec<String>,
    /// Deterministic tools that actually executed.
    pub deterministic_executed: Vec<String>,
}

/// Full execution trace for a skill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRunTrace {
    /// How the skill was selected (`explicit` or `scored:{points}`).
    pub routing: String,
    /// Tool dispatch trace.
    pub tools: SkillToolTrace,
    /// Ordered guardrail check outcomes.
    pub guardrails: Vec<GuardrailCheck>,
}

/// A completed skill run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRun {
    /// Run identifier.
    pub id: SkillRunId,
    /// Versioned skill id that ran.
    pub skill_id: String,
    /// Base skill id.
    pub base_id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Channel the run came from.
    pub channel: String,
    /// Intent text that routed the run.
    pub intent: String,
    /// Completion status.
    pub status: SkillRunStatus,
    /// Run confidence after post-checks.
    pub confidence: f64,
    /// Produced artifacts.
    pub artifacts: SkillArtifacts,
    /// Execution trace.
    pub trace: SkillRunTrace,
    /// Hints surfaced to downstream reasoning steps.
    #[serde(default)]
    pub reasoning_hints: Vec<String>,
    /// Run timestamp.
    pub started_at: Timestamp,
}

// ============================================================================
// SECTION: Bundled Catalog
// ============================================================================

/// Returns the bundled skill templates installable by base id.
#[must_use]
pub fn bundled_skill_catalog() -> Vec<SkillManifest> {
    let tool = |id: &str| SkillTool {
        id: id.to_string(),
        allow: true,
    };
    vec![
        SkillManifest {
            id: "finance-health".to_string(),
            version: "1.0.0".to_string(),
            name: "Finance Health".to_string(),
            description: "Cash position snapshot with runway forecasting.".to_string(),
            triggers: SkillTriggers {
                intents: vec!["finance".to_string(), "cash".to_string(), "runway".to_string()],
                channels: vec!["slack".to_string(), "email".to_string()],
            },
            tools: vec![tool("compute.finance_snapshot"), tool("model.run"), tool("reports.generate")],
            guardrails: SkillGuardrails::default(),
            prompts: SkillPrompts {
                system: "Summarize the tenant's cash position and runway.".to_string(),
            },
            schedules: Vec::new(),
            risk_level: SkillRiskLevel::Low,
        },
        SkillManifest {
            id: "data-quality".to_string(),
            version: "1.0.0".to_string(),
            name: "Data Quality Watch".to_string(),
            description: "Source freshness and quality anomaly scan.".to_string(),
            triggers: SkillTriggers {
                intents: vec!["quality".to_string(), "anomaly".to_string(), "freshness".to_string()],
                channels: vec!["slack".to_string()],
            },
            tools: vec![tool("compute.data_quality_snapshot"), tool("model.run")],
            guardrails: SkillGuardrails {
                confidence_min: 0.6,
                ..SkillGuardrails::default()
            },
            prompts: SkillPrompts {
                system: "Flag stale or low-quality sources.".to_string(),
            },
            schedules: Vec::new(),
            risk_level: SkillRiskLevel::Low,
        },
        SkillManifest {
            id: "deal-desk".to_string(),
            version: "1.0.0".to_string(),
            name: "Deal Desk".to_string(),
            description: "Pipeline review with win-rate forecasting.".to_string(),
            triggers: SkillTriggers {
                intents: vec!["pipeline".to_string(), "deals".to_string(), "sales".to_string()],
                channels: vec!["email".to_string()],
            },
            tools: vec![tool("compute.deal_desk_snapshot"), tool("model.run"), tool("reports.generate")],
            guardrails: SkillGuardrails::default(),
            prompts: SkillPrompts {
                system: "Review the pipeline and call out at-risk deals.".to_string(),
            },
            schedules: Vec::new(),
            risk_level: SkillRiskLevel::Medium,
        },
    ]
}
