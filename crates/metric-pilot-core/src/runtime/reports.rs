// crates/metric-pilot-core/src/runtime/reports.rs
// ============================================================================
// Module: Metric Pilot Report Builder
// Description: Templated report bodies and bounded-retry channel delivery.
// Purpose: Render deterministic reports and record delivery outcomes.
// Dependencies: crate::core, crate::runtime::metrics
// ============================================================================

//! ## Overview
//! Reports render a deterministic markdown body from metric blocks plus the
//! latest insight. Delivery is recorded, never raised: each channel gets an
//! event whose status reflects readiness (email is always ready; Slack and
//! Telegram need wiring in settings) and whose retries are bounded: once an
//! event is permanently failed it stays that way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::core::Channel;
use crate::core::ChannelEvent;
use crate::core::ChannelEventId;
use crate::core::ChannelEventPayload;
use crate::core::ChannelEventStatus;
use crate::core::ChannelSettings;
use crate::core::CoreError;
use crate::core::DEFAULT_MAX_DELIVERY_ATTEMPTS;
use crate::core::MetricGrain;
use crate::core::PlatformState;
use crate::core::Report;
use crate::core::ReportFormat;
use crate::core::ReportId;
use crate::core::ReportOutcome;
use crate::core::ReportRequest;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::default_delivery_templates;
use crate::runtime::metrics::MetricQuery;
use crate::runtime::metrics::query_metric;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Metrics covered when the request names none.
const DEFAULT_METRICS: &[&str] = &["revenue", "profit", "spend"];

/// Parses the requested grain label, defaulting to week.
#[must_use]
pub fn parse_grain(label: Option<&str>) -> MetricGrain {
    match label {
        Some("day") => MetricGrain::Day,
        Some("month") => MetricGrain::Month,
        _ => MetricGrain::Week,
    }
}

/// Returns the stable wire label for a grain.
const fn grain_label(grain: MetricGrain) -> &'static str {
    match grain {
        MetricGrain::Day => "day",
        MetricGrain::Week => "week",
        MetricGrain::Month => "month",
    }
}

// ============================================================================
// SECTION: Readiness
// ============================================================================

/// Readiness verdict for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReadiness {
    /// Whether delivery can proceed.
    pub ready: bool,
    /// Stable reason label when not ready.
    pub reason: Option<String>,
}

/// Evaluates channel readiness from tenant settings.
///
/// Email is always ready. Slack needs `enabled` plus a webhook reference;
/// Telegram needs `enabled`, a bot token reference, and a chat id. Missing
/// settings leave non-email channels unready.
#[must_use]
pub fn channel_readiness(settings: Option<&ChannelSettings>, channel: Channel) -> ChannelReadiness {
    let ready = ChannelReadiness {
        ready: true,
        reason: None,
    };
    let not_ready = |reason: &str| ChannelReadiness {
        ready: false,
        reason: Some(reason.to_string()),
    };
    match channel {
        Channel::Email => ready,
        Channel::Slack => settings.map_or_else(
            || not_ready("channel_settings_missing"),
            |channels| {
                if channels.slack.enabled && channels.slack.webhook_ref.is_some() {
                    ready
                } else {
                    not_ready("slack_disabled")
                }
            },
        ),
        Channel::Telegram => settings.map_or_else(
            || not_ready("channel_settings_missing"),
            |channels| {
                let telegram = &channels.telegram;
                if telegram.enabled && telegram.bot_token_ref.is_some() && telegram.chat_id.is_some()
                {
                    ready
                } else {
                    not_ready("telegram_disabled")
                }
            },
        ),
    }
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Renders a `{{variable}}` template against the given context.
#[must_use]
pub fn render_template(template: &str, context: &BTreeMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in context {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

/// Builds the template context for a report delivery.
fn template_context(
    tenant_id: &TenantId,
    channel: Channel,
    report: &Report,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    context.insert("reportTitle".to_string(), report.title.clone());
    context.insert("reportSummary".to_string(), report.summary.clone());
    context.insert("tenantId".to_string(), tenant_id.to_string());
    context.insert("channel".to_string(), channel.as_str().to_string());
    context.insert("runId".to_string(), String::new());
    context.insert("insightId".to_string(), String::new());
    context.insert("confidence".to_string(), "n/a".to_string());
    context.insert("actionsCount".to_string(), "0".to_string());
    for (key, value) in extra {
        context.insert(key.clone(), value.clone());
    }
    context
}

// ============================================================================
// SECTION: Report Generation
// ============================================================================

/// Renders the deterministic markdown body for a metric set.
///
/// # Errors
///
/// Propagates metric aggregation failures.
pub fn render_report_body(
    state: &PlatformState,
    tenant_id: &TenantId,
    metric_ids: &[String],
    grain: MetricGrain,
) -> Result<String, CoreError> {
    let mut body = String::new();
    let _ = writeln!(body, "## KPI snapshot");
    for metric_id in metric_ids {
        let block = query_metric(
            state,
            tenant_id,
            &MetricQuery {
                metric_id: Some(metric_id.clone()),
                grain: Some(grain),
                start_date: None,
                end_date: None,
            },
        )?;
        let _ = writeln!(
            body,
            "- {metric_id}: total={:.3}, avg={:.3}",
            block.summary.total, block.summary.average
        );
    }
    let latest_insight = state
        .insights
        .iter()
        .rev()
        .find(|insight| insight.tenant_id == *tenant_id);
    let _ = writeln!(body, "\n## Latest insight");
    if let Some(insight) = latest_insight {
        let _ = writeln!(
            body,
            "- {} (confidence {:.2}, {} recommended actions)",
            insight.summary,
            insight.confidence,
            insight.recommended_actions.len()
        );
    } else {
        let _ = writeln!(body, "- no insights yet");
    }
    Ok(body)
}

/// Resolves the effective metric set for a request.
#[must_use]
pub fn effective_metric_ids(requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        DEFAULT_METRICS.iter().map(ToString::to_string).collect()
    } else {
        requested.to_vec()
    }
}

/// Generates a report and records delivery events for requested channels.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown; metric blocks that fail to
/// aggregate surface their own errors.
pub fn generate_report(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: ReportRequest,
    now: Timestamp,
) -> Result<ReportOutcome, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    let metric_ids = effective_metric_ids(&request.metric_ids);
    let grain = parse_grain(request.grain.as_deref());
    let body = render_report_body(state, tenant_id, &metric_ids, grain)?;

    let title = request
        .title
        .clone()
        .unwrap_or_else(|| format!("Performance report ({})", now.to_date()));
    let summary =
        format!("{} metrics over {} buckets", metric_ids.len(), grain_label(grain));
    let report = Report {
        id: ReportId::generate(),
        tenant_id: tenant_id.clone(),
        title,
        format: request.format.unwrap_or(ReportFormat::Markdown),
        summary,
        metric_ids,
        body,
        created_at: now,
    };
    state.reports.push(report.clone());

    let delivery_events =
        notify_report_delivery(state, tenant_id, &report, &request, now);
    Ok(ReportOutcome {
        report,
        delivery_events,
    })
}

// ============================================================================
// SECTION: Delivery
// ============================================================================

/// Records one delivery event per requested channel.
///
/// Delivery failures are recorded in event status, never raised.
fn notify_report_delivery(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    report: &Report,
    request: &ReportRequest,
    now: Timestamp,
) -> Vec<ChannelEvent> {
    let defaults = default_delivery_templates();
    // Settings are lazy-initialized so readiness reports per-channel wiring
    // reasons rather than a blanket missing-settings error.
    let channels = state.settings.entry(tenant_id.clone()).or_default().channels.clone();
    let mut events = Vec::new();
    for channel in &request.channels {
        let readiness = channel_readiness(Some(&channels), *channel);
        let template = request
            .channel_templates
            .get(channel)
            .or_else(|| defaults.get(channel))
            .cloned()
            .unwrap_or_default();
        let context =
            template_context(tenant_id, *channel, report, &request.channel_template_context);
        let message = render_template(&template, &context);
        let forced_fail = request.force_fail_channels.contains(channel);
        let delivered = readiness.ready && !forced_fail;
        let status = if delivered {
            ChannelEventStatus::Delivered
        } else {
            ChannelEventStatus::Failed
        };
        let event = ChannelEvent {
            id: ChannelEventId::generate(),
            tenant_id: tenant_id.clone(),
            channel: *channel,
            event_type: "report.delivery".to_string(),
            status,
            attempt_count: 1,
            max_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            last_error: if delivered {
                None
            } else if forced_fail {
                Some("delivery_failed".to_string())
            } else {
                readiness.reason.clone()
            },
            payload: ChannelEventPayload {
                report_id: Some(report.id.clone()),
                title: report.title.clone(),
                summary: report.summary.clone(),
                message,
            },
            response_metadata: delivered
                .then(|| serde_json::json!({"channel": channel.as_str(), "accepted": true})),
            created_at: now,
            updated_at: now,
        };
        state.channel_events.push(event.clone());
        events.push(event);
    }
    events
}

/// Retries a failed channel event.
///
/// # Errors
///
/// Returns `NotFound` for unknown events.
pub fn retry_channel_event(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    event_id: &ChannelEventId,
    force_fail: bool,
    now: Timestamp,
) -> Result<ChannelEvent, CoreError> {
    let channel = state
        .channel_events
        .iter()
        .find(|event| event.id == *event_id && event.tenant_id == *tenant_id)
        .map(|event| event.channel)
        .ok_or_else(|| CoreError::not_found("channel event not found"))?;
    let channels = state.settings.entry(tenant_id.clone()).or_default().channels.clone();
    let readiness = channel_readiness(Some(&channels), channel);
    let event = state
        .channel_events
        .iter_mut()
        .find(|event| event.id == *event_id && event.tenant_id == *tenant_id)
        .ok_or_else(|| CoreError::not_found("channel event not found"))?;
    if event.status == ChannelEventStatus::Delivered {
        return Ok(event.clone());
    }
    if event.status == ChannelEventStatus::FailedPermanent {
        // Exhausted events never come back.
        event.updated_at = now;
        return Ok(event.clone());
    }
    event.attempt_count = (event.attempt_count + 1).min(event.max_attempts);
    let delivered = readiness.ready && !force_fail;
    if delivered {
        event.status = ChannelEventStatus::Delivered;
        event.last_error = None;
        event.response_metadata = Some(
            serde_json::json!({"channel": event.channel.as_str(), "accepted": true}),
        );
    } else {
        event.status = if event.attempt_count >= event.max_attempts {
            ChannelEventStatus::FailedPermanent
        } else {
            ChannelEventStatus::Failed
        };
        event.last_error = Some(
            readiness.reason.clone().unwrap_or_else(|| "delivery_failed".to_string()),
        );
    }
    event.updated_at = now;
    Ok(event.clone())
}
