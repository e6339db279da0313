// crates/metric-pilot-core/src/core/settings.rs
// ============================================================================
// Module: Metric Pilot Tenant Settings
// Description: Tenant settings, model profiles, and report types.
// Purpose: Model per-tenant configuration for channels, models, and reports.
// Dependencies: crate::core::{identifiers, model, report, tenant, time}, serde
// ============================================================================

//! ## Overview
//! Tenant settings are lazy-initialized configuration: channel wiring, model
//! preferences, and training opt-in. The `policies` section is not stored;
//! the tenant's autonomy policy is the source of truth and settings project
//! it on read. Model profiles and report types are preset-seeded, tenant-owned
//! configuration entities.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ModelProfileId;
use crate::core::identifiers::ReportTypeId;
use crate::core::identifiers::TenantId;
use crate::core::model::ModelObjective;
use crate::core::report::Channel;
use crate::core::report::ReportFormat;
use crate::core::tenant::AutonomyPolicy;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Channel Settings
// ============================================================================

/// Slack channel wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackChannelSettings {
    /// Whether Slack delivery is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Secret reference for the webhook URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_ref: Option<String>,
}

/// Telegram channel wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramChannelSettings {
    /// Whether Telegram delivery is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Secret reference for the bot token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token_ref: Option<String>,
    /// Destination chat identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Email channel wiring. Email is always deliverable; this only carries
/// presentation preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChannelSettings {
    /// Whether email delivery is enabled (informational; email is always ready).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reply-to address label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Default for EmailChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reply_to: None,
        }
    }
}

/// Serde default helper returning true.
const fn default_true() -> bool {
    true
}

/// Per-channel wiring block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Email wiring.
    #[serde(default)]
    pub email: EmailChannelSettings,
    /// Slack wiring.
    #[serde(default)]
    pub slack: SlackChannelSettings,
    /// Telegram wiring.
    #[serde(default)]
    pub telegram: TelegramChannelSettings,
}

// ============================================================================
// SECTION: Tenant Settings
// ============================================================================

/// General presentation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Reporting timezone label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Reporting currency code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Model preference settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// Preferred provider mirrored from the tenant model config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    /// Active model profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile_id: Option<ModelProfileId>,
}

/// Training opt-in settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Whether the tenant opted into model training.
    #[serde(default)]
    pub opt_in: bool,
}

/// Onboarding checklist derived from tenant state at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsChecklist {
    /// At least one source connection exists.
    pub connections_configured: bool,
    /// A model profile is active.
    pub model_profile_configured: bool,
    /// At least one report type exists.
    pub report_type_configured: bool,
    /// A non-email channel is enabled.
    pub channels_configured: bool,
}

/// Stored per-tenant settings.
///
/// # Invariants
/// - `policies` is never stored; it is projected from the tenant on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// General presentation settings.
    #[serde(default)]
    pub general: GeneralSettings,
    /// Model preferences.
    #[serde(default)]
    pub model_preferences: ModelPreferences,
    /// Training opt-in.
    #[serde(default)]
    pub training: TrainingSettings,
    /// Channel wiring.
    #[serde(default)]
    pub channels: ChannelSettings,
}

/// Settings view returned to callers, with projected sections attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsView {
    /// Stored settings sections.
    #[serde(flatten)]
    pub settings: TenantSettings,
    /// Autonomy policy projected from the tenant.
    pub policies: AutonomyPolicy,
    /// Derived onboarding checklist.
    pub checklist: SettingsChecklist,
}

// ============================================================================
// SECTION: Model Profiles
// ============================================================================

/// A reusable model task configuration.
///
/// # Invariants
/// - At most one profile per tenant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Profile identifier.
    pub id: ModelProfileId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Task objective.
    pub objective: ModelObjective,
    /// Target metric.
    pub target_metric_id: String,
    /// Forecast horizon in days.
    pub horizon_days: u32,
    /// Provider override, when pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Whether this profile is the tenant's active one.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Preset definitions seeded for every tenant on first use.
#[must_use]
pub fn model_profile_presets() -> Vec<(String, ModelObjective, String, u32)> {
    vec![
        ("Revenue Forecast".to_string(), ModelObjective::Forecast, "revenue".to_string(), 14),
        ("Profit Forecast".to_string(), ModelObjective::Forecast, "profit".to_string(), 14),
        ("Funnel Anomaly".to_string(), ModelObjective::Anomaly, "conversions".to_string(), 0),
        ("Pipeline Risk".to_string(), ModelObjective::Anomaly, "pipeline_value".to_string(), 0),
    ]
}

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// A reusable report configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportType {
    /// Report type identifier.
    pub id: ReportTypeId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Ordered section labels rendered into the body.
    pub sections: Vec<String>,
    /// Default delivery channels.
    pub default_channels: Vec<Channel>,
    /// Default output format.
    pub default_format: ReportFormat,
    /// Optional schedule expression label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Per-channel delivery message templates.
    #[serde(default)]
    pub delivery_templates: BTreeMap<Channel, String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Default per-channel delivery templates.
#[must_use]
pub fn default_delivery_templates() -> BTreeMap<Channel, String> {
    let mut templates = BTreeMap::new();
    templates.insert(
        Channel::Slack,
        "[{{channel}}] {{reportTitle}} | {{reportSummary}} | confidence={{confidence}}".to_string(),
    );
    templates.insert(
        Channel::Telegram,
        "[{{channel}}] {{reportTitle}} | {{reportSummary}}".to_string(),
    );
    templates.insert(
        Channel::Email,
        "Subject: {{reportTitle}}\n\n{{reportSummary}}\n\nTenant: {{tenantId}}\nRun: {{runId}}\nConfidence: {{confidence}}\nActions: {{actionsCount}}".to_string(),
    );
    templates
}

/// Preset report type definitions seeded on first use.
#[must_use]
pub fn report_type_presets() -> Vec<(String, Vec<String>, Vec<Channel>, ReportFormat)> {
    vec![
        (
            "Weekly Performance".to_string(),
            vec!["kpi_snapshot".to_string(), "latest_insight".to_string()],
            vec![Channel::Email],
            ReportFormat::Pdf,
        ),
        (
            "Finance Health".to_string(),
            vec![
                "kpi_snapshot".to_string(),
                "cash_position".to_string(),
                "latest_insight".to_string(),
            ],
            vec![Channel::Email, Channel::Slack],
            ReportFormat::Html,
        ),
    ]
}
