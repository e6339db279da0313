// crates/metric-pilot-core/src/core/tenant.rs
// ============================================================================
// Module: Metric Pilot Tenant Model
// Description: Tenant aggregate with model, autonomy, and data policies.
// Purpose: Capture the top-level isolation unit and its per-tenant guardrails.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A tenant owns every other entity in the system. Its three policy blocks
//! drive the control plane: `model_config` selects and orders model providers,
//! `autonomy_policy` gates recommended actions, and `data_policy` bounds live
//! queries. Tenants are created once and mutated only through settings
//! patches; they are never destroyed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tenant Status
// ============================================================================

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Tenant is active and serving requests.
    Active,
    /// Tenant is suspended; mutating operations are rejected upstream.
    Suspended,
}

// ============================================================================
// SECTION: Model Configuration
// ============================================================================

/// Model provisioning mode for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMode {
    /// Platform-managed providers.
    Managed,
    /// Tenant brings its own providers.
    Byo,
}

/// Per-tenant model provider configuration.
///
/// # Invariants
/// - `failover_chain` is consulted in order after the default provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provisioning mode.
    pub mode: ModelMode,
    /// Preferred provider consulted first when the task names none.
    pub default_provider: Option<String>,
    /// Ordered failover providers.
    #[serde(default)]
    pub failover_chain: Vec<String>,
    /// Tenant-supplied providers preferred when the task asks for them.
    #[serde(default)]
    pub byo_providers: Vec<String>,
    /// Cooldown applied to a failing provider, in minutes.
    pub provider_cooldown_minutes: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            mode: ModelMode::Managed,
            default_provider: Some("managed".to_string()),
            failover_chain: Vec::new(),
            byo_providers: Vec::new(),
            provider_cooldown_minutes: 10,
        }
    }
}

// ============================================================================
// SECTION: Autonomy Policy
// ============================================================================

/// Autonomy mode governing autopilot execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutonomyMode {
    /// Actions execute automatically when policy allows.
    PolicyGated,
    /// Every action requires a human decision.
    Manual,
}

/// Per-tenant autonomy policy evaluated for every recommended action.
///
/// # Invariants
/// - `confidence_threshold` is within `[0, 1]`.
/// - An enabled `kill_switch` denies every action regardless of other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyPolicy {
    /// Autonomy mode.
    pub autonomy_mode: AutonomyMode,
    /// Whether allow-decisions may execute without approval.
    pub autopilot_enabled: bool,
    /// Minimum confidence below which actions are routed to review.
    pub confidence_threshold: f64,
    /// Action types the tenant permits at all.
    #[serde(default)]
    pub action_allowlist: Vec<String>,
    /// Action types that always require approval.
    #[serde(default)]
    pub high_impact_actions: Vec<String>,
    /// Budget ceiling in USD above which actions are routed to review.
    pub budget_guardrail_usd: f64,
    /// Emergency stop denying all actions.
    pub kill_switch: bool,
}

impl Default for AutonomyPolicy {
    fn default() -> Self {
        Self {
            autonomy_mode: AutonomyMode::PolicyGated,
            autopilot_enabled: false,
            confidence_threshold: 0.7,
            action_allowlist: vec![
                "adjust_budget".to_string(),
                "create_report".to_string(),
                "notify_owner".to_string(),
            ],
            high_impact_actions: vec!["adjust_budget".to_string()],
            budget_guardrail_usd: 5_000.0,
            kill_switch: false,
        }
    }
}

// ============================================================================
// SECTION: Data Policy
// ============================================================================

/// Per-tenant bounds applied to live queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPolicy {
    /// Maximum rows a live query may return.
    pub max_live_query_rows: usize,
    /// Maximum caller-declared timeout in milliseconds.
    pub max_live_query_timeout_ms: u64,
    /// Maximum caller-declared cost units.
    pub max_live_query_cost_units: u64,
}

impl Default for DataPolicy {
    fn default() -> Self {
        Self {
            max_live_query_rows: 500,
            max_live_query_timeout_ms: 15_000,
            max_live_query_cost_units: 100,
        }
    }
}

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// Tenant branding metadata rendered by report builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBranding {
    /// Display name used in report titles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Accent color hex string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
}

/// Top-level tenant aggregate.
///
/// # Invariants
/// - Every other entity references exactly one tenant by `id`.
/// - Mutations flow only through tenant creation and settings patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Blueprint selecting metric definitions and domains.
    pub blueprint_id: String,
    /// Branding metadata.
    #[serde(default)]
    pub branding: TenantBranding,
    /// Whether the tenant opted into model training.
    pub training_opt_in: bool,
    /// Model provider configuration.
    pub model_config: ModelConfig,
    /// Autonomy policy for recommended actions.
    pub autonomy_policy: AutonomyPolicy,
    /// Live query bounds.
    pub data_policy: DataPolicy,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last mutation timestamp.
    pub updated_at: Timestamp,
}
