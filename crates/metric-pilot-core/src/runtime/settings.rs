// crates/metric-pilot-core/src/runtime/settings.rs
// ============================================================================
// Module: Metric Pilot Settings Runtime
// Description: Lazy settings, deep-merge patches, profiles, report types.
// Purpose: Manage tenant configuration with policy mirroring write-through.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Settings are lazy-initialized per tenant and patched by deep-merging plain
//! JSON objects, overwriting non-object leaves. Two sections have
//! cross-effects: `policies` writes through to the tenant's autonomy policy
//! (the stored settings never hold a copy) and `training.opt_in` mirrors the
//! tenant's training flag. Model profiles and report types are seeded from
//! presets on first use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::AutonomyPolicy;
use crate::core::CoreError;
use crate::core::Channel;
use crate::core::ChannelSettings;
use crate::core::ModelObjective;
use crate::core::ModelProfile;
use crate::core::ModelProfileId;
use crate::core::PlatformState;
use crate::core::ReportFormat;
use crate::core::ReportType;
use crate::core::ReportTypeId;
use crate::core::SettingsChecklist;
use crate::core::SettingsView;
use crate::core::TenantId;
use crate::core::TenantSettings;
use crate::core::Timestamp;
use crate::core::default_delivery_templates;
use crate::core::model_profile_presets;
use crate::core::report_type_presets;

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Patchable settings sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSection {
    /// General presentation settings.
    General,
    /// Model preferences.
    ModelPreferences,
    /// Training opt-in.
    Training,
    /// Autonomy policy mirror.
    Policies,
    /// Channel wiring.
    Channels,
}

impl SettingsSection {
    /// Parses a section path label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(Self::General),
            "model-preferences" => Some(Self::ModelPreferences),
            "training" => Some(Self::Training),
            "policies" => Some(Self::Policies),
            "channels" => Some(Self::Channels),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Settings Reads
// ============================================================================

/// Returns the tenant's settings view, lazily initializing storage.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown.
pub fn get_settings(
    state: &mut PlatformState,
    tenant_id: &TenantId,
) -> Result<SettingsView, CoreError> {
    let tenant = state
        .tenant(tenant_id)
        .ok_or_else(|| CoreError::not_found("tenant not found"))?
        .clone();
    let mut settings = state.settings.entry(tenant_id.clone()).or_default().clone();
    // Mirrored fields are projected from the tenant on every read.
    settings.training.opt_in = tenant.training_opt_in;
    settings.model_preferences.default_provider =
        tenant.model_config.default_provider.clone();
    let checklist = build_checklist(state, tenant_id, &settings);
    Ok(SettingsView {
        settings,
        policies: tenant.autonomy_policy,
        checklist,
    })
}

/// Derives the onboarding checklist from live state.
fn build_checklist(
    state: &PlatformState,
    tenant_id: &TenantId,
    settings: &TenantSettings,
) -> SettingsChecklist {
    SettingsChecklist {
        connections_configured: state
            .connections
            .iter()
            .any(|connection| connection.tenant_id == *tenant_id),
        model_profile_configured: state
            .model_profiles
            .iter()
            .any(|profile| profile.tenant_id == *tenant_id && profile.active),
        report_type_configured: state
            .report_types
            .iter()
            .any(|rtype| rtype.tenant_id == *tenant_id),
        channels_configured: settings.channels.slack.enabled || settings.channels.telegram.enabled,
    }
}

// ============================================================================
// SECTION: Settings Patches
// ============================================================================

/// Deep-merges `patch` into `target`, overwriting non-object leaves.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    _ => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target_slot, patch_value) => {
            *target_slot = patch_value.clone();
        }
    }
}

/// Applies a deep-merge patch to one settings section.
///
/// `policies` patches write through to the tenant's autonomy policy;
/// `training.opt_in` and `model_preferences.default_provider` mirror back to
/// the tenant.
///
/// # Errors
///
/// Returns `NotFound` for unknown tenants and `BadRequest` when the merged
/// section no longer deserializes.
pub fn patch_settings(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    section: SettingsSection,
    patch: &Value,
    now: Timestamp,
) -> Result<SettingsView, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    match section {
        SettingsSection::Policies => {
            let tenant = state
                .tenant(tenant_id)
                .ok_or_else(|| CoreError::not_found("tenant not found"))?;
            let merged: AutonomyPolicy = merge_into(&tenant.autonomy_policy, patch)?;
            if !(0.0..=1.0).contains(&merged.confidence_threshold) {
                return Err(CoreError::bad_request(
                    "confidenceThreshold must be within [0, 1]",
                ));
            }
            if let Some(tenant) = state.tenant_mut(tenant_id) {
                tenant.autonomy_policy = merged;
                tenant.updated_at = now;
            }
        }
        SettingsSection::General => {
            let settings = state.settings.entry(tenant_id.clone()).or_default();
            settings.general = merge_into(&settings.general, patch)?;
        }
        SettingsSection::ModelPreferences => {
            let settings = state.settings.entry(tenant_id.clone()).or_default();
            settings.model_preferences = merge_into(&settings.model_preferences, patch)?;
            let provider = settings.model_preferences.default_provider.clone();
            if let Some(tenant) = state.tenant_mut(tenant_id) {
                tenant.model_config.default_provider = provider;
                tenant.updated_at = now;
            }
        }
        SettingsSection::Training => {
            let settings = state.settings.entry(tenant_id.clone()).or_default();
            settings.training = merge_into(&settings.training, patch)?;
            let opt_in = settings.training.opt_in;
            if let Some(tenant) = state.tenant_mut(tenant_id) {
                tenant.training_opt_in = opt_in;
                tenant.updated_at = now;
            }
        }
        SettingsSection::Channels => {
            let settings = state.settings.entry(tenant_id.clone()).or_default();
            settings.channels = merge_into(&settings.channels, patch)?;
        }
    }
    get_settings(state, tenant_id)
}

/// Merges a patch into a serializable section and deserializes it back.
fn merge_into<T>(current: &T, patch: &Value) -> Result<T, CoreError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(current)
        .map_err(|err| CoreError::internal(format!("settings serialization failed: {err}")))?;
    deep_merge(&mut value, patch);
    serde_json::from_value(value)
        .map_err(|err| CoreError::bad_request(format!("invalid settings patch: {err}")))
}

/// Returns the tenant's channel settings, lazily initializing storage.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown.
pub fn get_channel_settings(
    state: &mut PlatformState,
    tenant_id: &TenantId,
) -> Result<ChannelSettings, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    Ok(state.settings.entry(tenant_id.clone()).or_default().channels.clone())
}

// ============================================================================
// SECTION: Model Profiles
// ============================================================================

/// Seeds preset profiles for a tenant when none exist yet.
fn seed_model_profiles(state: &mut PlatformState, tenant_id: &TenantId, now: Timestamp) {
    if state.model_profiles.iter().any(|profile| profile.tenant_id == *tenant_id) {
        return;
    }
    for (index, (name, objective, target, horizon)) in
        model_profile_presets().into_iter().enumerate()
    {
        state.model_profiles.push(ModelProfile {
            id: ModelProfileId::generate(),
            tenant_id: tenant_id.clone(),
            name,
            objective,
            target_metric_id: target,
            horizon_days: horizon,
            provider: None,
            active: index == 0,
            created_at: now,
        });
    }
}

/// Lists the tenant's model profiles, seeding presets on first use.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown.
pub fn list_model_profiles(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    now: Timestamp,
) -> Result<Vec<ModelProfile>, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    seed_model_profiles(state, tenant_id, now);
    Ok(state
        .model_profiles
        .iter()
        .filter(|profile| profile.tenant_id == *tenant_id)
        .cloned()
        .collect())
}

/// Request fields for creating or patching a model profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelProfileRequest {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Task objective.
    #[serde(default)]
    pub objective: Option<ModelObjective>,
    /// Target metric.
    #[serde(default)]
    pub target_metric_id: Option<String>,
    /// Forecast horizon in days.
    #[serde(default)]
    pub horizon_days: Option<u32>,
    /// Provider pin.
    #[serde(default)]
    pub provider: Option<String>,
}

/// Creates a model profile.
///
/// # Errors
///
/// Returns `NotFound` for unknown tenants and `BadRequest` when no name is
/// given.
pub fn create_model_profile(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: ModelProfileRequest,
    now: Timestamp,
) -> Result<ModelProfile, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    seed_model_profiles(state, tenant_id, now);
    let name = request
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CoreError::bad_request("profile name is required"))?;
    let profile = ModelProfile {
        id: ModelProfileId::generate(),
        tenant_id: tenant_id.clone(),
        name,
        objective: request.objective.unwrap_or(ModelObjective::Forecast),
        target_metric_id: request.target_metric_id.unwrap_or_else(|| "revenue".to_string()),
        horizon_days: request.horizon_days.unwrap_or(14),
        provider: request.provider,
        active: false,
        created_at: now,
    };
    state.model_profiles.push(profile.clone());
    Ok(profile)
}

/// Patches a model profile.
///
/// # Errors
///
/// Returns `NotFound` for unknown profiles.
pub fn patch_model_profile(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    profile_id: &ModelProfileId,
    request: ModelProfileRequest,
) -> Result<ModelProfile, CoreError> {
    let profile = state
        .model_profiles
        .iter_mut()
        .find(|profile| profile.id == *profile_id && profile.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("model profile not found"))?;
    if let Some(name) = request.name.filter(|name| !name.is_empty()) {
        profile.name = name;
    }
    if let Some(objective) = request.objective {
        profile.objective = objective;
    }
    if let Some(target) = request.target_metric_id {
        profile.target_metric_id = target;
    }
    if let Some(horizon) = request.horizon_days {
        profile.horizon_days = horizon;
    }
    if let Some(provider) = request.provider {
        profile.provider = Some(provider);
    }
    Ok(profile.clone())
}

/// Activates a profile, deactivating the rest and updating preferences.
///
/// # Errors
///
/// Returns `NotFound` for unknown profiles.
pub fn activate_model_profile(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    profile_id: &ModelProfileId,
) -> Result<ModelProfile, CoreError> {
    let exists = state
        .model_profiles
        .iter()
        .any(|profile| profile.id == *profile_id && profile.tenant_id == *tenant_id);
    if !exists {
        return Err(CoreError::not_found("model profile not found"));
    }
    for profile in &mut state.model_profiles {
        if profile.tenant_id == *tenant_id {
            profile.active = profile.id == *profile_id;
        }
    }
    let settings = state.settings.entry(tenant_id.clone()).or_default();
    settings.model_preferences.default_profile_id = Some(profile_id.clone());
    state
        .model_profiles
        .iter()
        .find(|profile| profile.id == *profile_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("model profile not found"))
}

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Seeds preset report types for a tenant when none exist yet.
fn seed_report_types(state: &mut PlatformState, tenant_id: &TenantId, now: Timestamp) {
    if state.report_types.iter().any(|rtype| rtype.tenant_id == *tenant_id) {
        return;
    }
    for (name, sections, channels, format) in report_type_presets() {
        state.report_types.push(ReportType {
            id: ReportTypeId::generate(),
            tenant_id: tenant_id.clone(),
            name,
            sections,
            default_channels: channels,
            default_format: format,
            schedule: None,
            delivery_templates: default_delivery_templates(),
            created_at: now,
        });
    }
}

/// Lists the tenant's report types, seeding presets on first use.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown.
pub fn list_report_types(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    now: Timestamp,
) -> Result<Vec<ReportType>, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    seed_report_types(state, tenant_id, now);
    Ok(state
        .report_types
        .iter()
        .filter(|rtype| rtype.tenant_id == *tenant_id)
        .cloned()
        .collect())
}

/// Request fields for creating or patching a report type.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReportTypeRequest {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered section labels.
    #[serde(default)]
    pub sections: Option<Vec<String>>,
    /// Default delivery channels.
    #[serde(default)]
    pub default_channels: Option<Vec<Channel>>,
    /// Default output format.
    #[serde(default)]
    pub default_format: Option<ReportFormat>,
    /// Schedule expression label.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Per-channel delivery templates.
    #[serde(default)]
    pub delivery_templates: Option<std::collections::BTreeMap<Channel, String>>,
}

/// Creates a report type.
///
/// # Errors
///
/// Returns `NotFound` for unknown tenants and `BadRequest` when no name is
/// given.
pub fn create_report_type(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: ReportTypeRequest,
    now: Timestamp,
) -> Result<ReportType, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    seed_report_types(state, tenant_id, now);
    let name = request
        .name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CoreError::bad_request("report type name is required"))?;
    let mut templates = default_delivery_templates();
    if let Some(overrides) = request.delivery_templates {
        templates.extend(overrides);
    }
    let rtype = ReportType {
        id: ReportTypeId::generate(),
        tenant_id: tenant_id.clone(),
        name,
        sections: request
            .sections
            .unwrap_or_else(|| vec!["kpi_snapshot".to_string(), "latest_insight".to_string()]),
        default_channels: request.default_channels.unwrap_or_else(|| vec![Channel::Email]),
        default_format: request.default_format.unwrap_or(ReportFormat::Pdf),
        schedule: request.schedule,
        delivery_templates: templates,
        created_at: now,
    };
    state.report_types.push(rtype.clone());
    Ok(rtype)
}

/// Patches a report type.
///
/// # Errors
///
/// Returns `NotFound` for unknown report types.
pub fn patch_report_type(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    report_type_id: &ReportTypeId,
    request: ReportTypeRequest,
) -> Result<ReportType, CoreError> {
    let rtype = state
        .report_types
        .iter_mut()
        .find(|rtype| rtype.id == *report_type_id && rtype.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("report type not found"))?;
    if let Some(name) = request.name.filter(|name| !name.is_empty()) {
        rtype.name = name;
    }
    if let Some(sections) = request.sections {
        rtype.sections = sections;
    }
    if let Some(channels) = request.default_channels {
        rtype.default_channels = channels;
    }
    if let Some(format) = request.default_format {
        rtype.default_format = format;
    }
    if let Some(schedule) = request.schedule {
        rtype.schedule = Some(schedule);
    }
    if let Some(templates) = request.delivery_templates {
        rtype.delivery_templates.extend(templates);
    }
    Ok(rtype.clone())
}
