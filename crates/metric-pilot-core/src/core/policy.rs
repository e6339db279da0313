// crates/metric-pilot-core/src/core/policy.rs
// ============================================================================
// Module: Metric Pilot Action Policy
// Description: Autonomy policy evaluation and autopilot gating.
// Purpose: Decide allow/review/deny for recommended actions deterministically.
// Dependencies: crate::core::tenant, serde
// ============================================================================

//! ## Overview
//! Policy evaluation is a pure function of the tenant's autonomy policy and a
//! proposed action: identical inputs always yield identical outputs. The
//! precedence order is fixed (kill switch, allowlist, budget guardrail,
//! confidence threshold, high-impact list) and the first matching rule wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::tenant::AutonomyMode;
use crate::core::tenant::AutonomyPolicy;

// ============================================================================
// SECTION: Policy Decision
// ============================================================================

/// Outcome of evaluating an action against the autonomy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// Action may execute.
    Allow,
    /// Action requires human review.
    Review,
    /// Action is denied.
    Deny,
}

/// Policy evaluation result with a stable reason label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Decision outcome.
    pub decision: PolicyDecision,
    /// Stable reason label for audit trails.
    pub reason: String,
}

// ============================================================================
// SECTION: Action Proposal
// ============================================================================

/// The policy-relevant fields of a proposed action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionProposal {
    /// Action type evaluated against the allowlist.
    pub action_type: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Estimated budget impact in USD.
    pub estimated_budget_impact_usd: f64,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a proposed action against the tenant's autonomy policy.
///
/// Precedence: kill switch, allowlist, budget guardrail, confidence
/// threshold, high-impact list, then allow.
#[must_use]
pub fn evaluate_action_policy(
    policy: &AutonomyPolicy,
    action: &ActionProposal,
) -> PolicyEvaluation {
    let verdict = |decision: PolicyDecision, reason: &str| PolicyEvaluation {
        decision,
        reason: reason.to_string(),
    };
    if policy.kill_switch {
        return verdict(PolicyDecision::Deny, "kill_switch_enabled");
    }
    if !policy.action_allowlist.iter().any(|allowed| allowed == &action.action_type) {
        return verdict(PolicyDecision::Deny, "action_not_allowlisted");
    }
    if action.estimated_budget_impact_usd > policy.budget_guardrail_usd {
        return verdict(PolicyDecision::Review, "budget_guardrail");
    }
    if action.confidence < policy.confidence_threshold {
        return verdict(PolicyDecision::Review, "low_confidence");
    }
    if policy.high_impact_actions.iter().any(|high| high == &action.action_type) {
        return verdict(PolicyDecision::Review, "high_impact_requires_approval");
    }
    verdict(PolicyDecision::Allow, "policy_allow")
}

/// Returns true when an allow-decision may execute without a human.
#[must_use]
pub fn can_autopilot(policy: &AutonomyPolicy, evaluation: &PolicyEvaluation) -> bool {
    policy.autopilot_enabled
        && policy.autonomy_mode == AutonomyMode::PolicyGated
        && evaluation.decision == PolicyDecision::Allow
}
