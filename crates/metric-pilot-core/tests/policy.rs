// crates/metric-pilot-core/tests/policy.rs
// ============================================================================
// Module: Action Policy Tests
// Description: Tests for autonomy policy evaluation and autopilot gating.
// Purpose: Validate precedence order and decision determinism.
// ============================================================================
//! ## Overview
//! Exercises the fixed precedence chain (kill switch, allowlist, budget,
//! confidence, high-impact) and the purity property: identical inputs yield
//! identical outputs.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use metric_pilot_core::core::policy::ActionProposal;
use metric_pilot_core::core::policy::PolicyDecision;
use metric_pilot_core::core::policy::can_autopilot;
use metric_pilot_core::core::policy::evaluate_action_policy;
use metric_pilot_core::core::tenant::AutonomyMode;
use metric_pilot_core::core::tenant::AutonomyPolicy;
use proptest::prelude::*;

fn policy() -> AutonomyPolicy {
    AutonomyPolicy {
        autonomy_mode: AutonomyMode::PolicyGated,
        autopilot_enabled: true,
        confidence_threshold: 0.7,
        action_allowlist: vec!["adjust_budget".to_string(), "notify_owner".to_string()],
        high_impact_actions: vec!["adjust_budget".to_string()],
        budget_guardrail_usd: 1_000.0,
        kill_switch: false,
    }
}

fn proposal(action_type: &str, confidence: f64, impact: f64) -> ActionProposal {
    ActionProposal {
        action_type: action_type.to_string(),
        confidence,
        estimated_budget_impact_usd: impact,
    }
}

/// Verifies the kill switch denies everything regardless of other fields.
#[test]
fn kill_switch_denies_first() {
    let mut policy = policy();
    policy.kill_switch = true;
    let evaluation = evaluate_action_policy(&policy, &proposal("notify_owner", 0.99, 0.0));
    assert_eq!(evaluation.decision, PolicyDecision::Deny);
    assert_eq!(evaluation.reason, "kill_switch_enabled");
}

/// Verifies non-allowlisted actions are denied.
#[test]
fn unlisted_action_is_denied() {
    let evaluation = evaluate_action_policy(&policy(), &proposal("launch_campaign", 0.99, 0.0));
    assert_eq!(evaluation.decision, PolicyDecision::Deny);
    assert_eq!(evaluation.reason, "action_not_allowlisted");
}

/// Verifies the budget guardrail outranks the confidence check.
#[test]
fn budget_guardrail_routes_to_review() {
    let evaluation = evaluate_action_policy(&policy(), &proposal("adjust_budget", 0.2, 5_000.0));
    assert_eq!(evaluation.decision, PolicyDecision::Review);
    assert_eq!(evaluation.reason, "budget_guardrail");
}

/// Verifies low confidence routes to review.
#[test]
fn low_confidence_routes_to_review() {
    let evaluation = evaluate_action_policy(&policy(), &proposal("notify_owner", 0.5, 0.0));
    assert_eq!(evaluation.decision, PolicyDecision::Review);
    assert_eq!(evaluation.reason, "low_confidence");
}

/// Verifies high-impact actions require approval even at high confidence.
#[test]
fn high_impact_requires_approval() {
    let evaluation = evaluate_action_policy(&policy(), &proposal("adjust_budget", 0.95, 100.0));
    assert_eq!(evaluation.decision, PolicyDecision::Review);
    assert_eq!(evaluation.reason, "high_impact_requires_approval");
}

/// Verifies a clean action is allowed and autopilot-eligible.
#[test]
fn clean_action_allows_and_autopilots() {
    let policy = policy();
    let evaluation = evaluate_action_policy(&policy, &proposal("notify_owner", 0.95, 0.0));
    assert_eq!(evaluation.decision, PolicyDecision::Allow);
    assert_eq!(evaluation.reason, "policy_allow");
    assert!(can_autopilot(&policy, &evaluation));
}

/// Verifies manual mode blocks autopilot even on allow.
#[test]
fn manual_mode_blocks_autopilot() {
    let mut policy = policy();
    policy.autonomy_mode = AutonomyMode::Manual;
    let evaluation = evaluate_action_policy(&policy, &proposal("notify_owner", 0.95, 0.0));
    assert_eq!(evaluation.decision, PolicyDecision::Allow);
    assert!(!can_autopilot(&policy, &evaluation));
}

proptest! {
    /// Evaluation is a pure function: identical inputs, identical outputs.
    #[test]
    fn evaluation_is_deterministic(
        confidence in 0.0f64..=1.0,
        impact in 0.0f64..100_000.0,
        action_index in 0usize..4,
    ) {
        let actions = ["adjust_budget", "notify_owner", "create_report", "launch_campaign"];
        let proposal = proposal(actions[action_index], confidence, impact);
        let policy = policy();
        let first = evaluate_action_policy(&policy, &proposal);
        let second = evaluate_action_policy(&policy, &proposal);
        prop_assert_eq!(first, second);
    }

    /// Every decision carries one of the stable reason labels.
    #[test]
    fn reasons_are_stable_labels(
        confidence in 0.0f64..=1.0,
        impact in 0.0f64..100_000.0,
    ) {
        let evaluation = evaluate_action_policy(&policy(), &proposal("adjust_budget", confidence, impact));
        let known = [
            "kill_switch_enabled",
            "action_not_allowlisted",
            "budget_guardrail",
            "low_confidence",
            "high_impact_requires_approval",
            "policy_allow",
        ];
        prop_assert!(known.contains(&evaluation.reason.as_str()));
    }
}
