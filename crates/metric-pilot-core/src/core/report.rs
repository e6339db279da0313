// crates/metric-pilot-core/src/core/report.rs
// ============================================================================
// Module: Metric Pilot Reports and Channels
// Description: Reports, report schedules, and channel delivery events.
// Purpose: Model report artifacts and their bounded-retry delivery records.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A report is a rendered artifact over a metric set. Delivery to external
//! channels is recorded as channel events with bounded retries: an event's
//! attempt count never exceeds its max, and once it is permanently failed no
//! retry changes its status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ChannelEventId;
use crate::core::identifiers::ReportId;
use crate::core::identifiers::ScheduleId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Channels
// ============================================================================

/// Delivery channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email delivery.
    Email,
    /// Slack webhook delivery.
    Slack,
    /// Telegram bot delivery.
    Telegram,
}

impl Channel {
    /// Returns the stable wire label for the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Telegram => "telegram",
        }
    }

    /// Parses a channel from its wire label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "slack" => Some(Self::Slack),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// PDF artifact.
    Pdf,
    /// HTML artifact.
    Html,
    /// Markdown artifact.
    Markdown,
}

/// Rendered report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report identifier.
    pub id: ReportId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Report title.
    pub title: String,
    /// Output format.
    pub format: ReportFormat,
    /// One-line summary used in delivery payloads.
    pub summary: String,
    /// Metrics the report covers.
    pub metric_ids: Vec<String>,
    /// Rendered markdown body.
    pub body: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Report Requests
// ============================================================================

/// A report generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Report title; defaulted when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Metrics to cover; defaults to `[revenue, profit, spend]`.
    #[serde(default)]
    pub metric_ids: Vec<String>,
    /// Aggregation grain label; defaults to `week`.
    #[serde(default)]
    pub grain: Option<String>,
    /// Output format; defaults to markdown.
    #[serde(default)]
    pub format: Option<ReportFormat>,
    /// Channels to deliver to; empty means no delivery.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Per-channel template overrides.
    #[serde(default)]
    pub channel_templates: std::collections::BTreeMap<Channel, String>,
    /// Extra template variables (`runId`, `insightId`, ...).
    #[serde(default)]
    pub channel_template_context: std::collections::BTreeMap<String, String>,
    /// Channels forced to fail delivery, for retry exercises.
    #[serde(default)]
    pub force_fail_channels: Vec<Channel>,
}

/// A generated report plus its delivery events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOutcome {
    /// The generated report.
    pub report: Report,
    /// Delivery events recorded for the requested channels.
    pub delivery_events: Vec<ChannelEvent>,
}

// ============================================================================
// SECTION: Report Schedules
// ============================================================================

/// Minimum schedule interval in minutes.
pub const MIN_SCHEDULE_INTERVAL_MINUTES: i64 = 5;

/// Maximum schedule interval in minutes.
pub const MAX_SCHEDULE_INTERVAL_MINUTES: i64 = 1_440;

/// Periodic report schedule.
///
/// # Invariants
/// - `interval_minutes` is clamped to `[5, 1440]`.
/// - After each fire, `next_run_at = now + interval` (drift accumulates by
///   design; see the scheduler module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchedule {
    /// Schedule identifier.
    pub id: ScheduleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Metrics the scheduled report covers.
    pub metric_ids: Vec<String>,
    /// Channels the scheduled report delivers to.
    pub channels: Vec<Channel>,
    /// Output format.
    pub format: ReportFormat,
    /// Minutes between fires.
    pub interval_minutes: i64,
    /// Whether the schedule fires at all.
    pub active: bool,
    /// When the schedule last fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<Timestamp>,
    /// When the schedule next fires.
    pub next_run_at: Timestamp,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Channel Events
// ============================================================================

/// Default maximum delivery attempts for a channel event.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Channel delivery outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventStatus {
    /// Delivery succeeded.
    Delivered,
    /// Delivery failed; retries remain.
    Failed,
    /// Delivery failed and retries are exhausted.
    FailedPermanent,
}

/// Payload carried by a channel event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEventPayload {
    /// Report the event delivers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ReportId>,
    /// Report title.
    pub title: String,
    /// Report summary.
    pub summary: String,
    /// Rendered per-channel message.
    pub message: String,
}

/// A recorded delivery attempt stream for one (report, channel) pair.
///
/// # Invariants
/// - `attempt_count <= max_attempts`.
/// - Once `status == FailedPermanent`, retries never change the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Event identifier.
    pub id: ChannelEventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Delivery channel.
    pub channel: Channel,
    /// Stable event type label (`report.delivery`).
    pub event_type: String,
    /// Delivery status.
    pub status: ChannelEventStatus,
    /// Attempts made so far.
    pub attempt_count: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Last failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Delivery payload.
    pub payload: ChannelEventPayload,
    /// Channel-specific response metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_metadata: Option<serde_json::Value>,
    /// First attempt timestamp.
    pub created_at: Timestamp,
    /// Last attempt timestamp.
    pub updated_at: Timestamp,
}
