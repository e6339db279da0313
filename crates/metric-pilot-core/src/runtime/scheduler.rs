// crates/metric-pilot-core/src/runtime/scheduler.rs
// ============================================================================
// Module: Metric Pilot Report Scheduler
// Description: Exactly-once-per-tick dispatch of periodic report schedules.
// Purpose: Decide which schedules fire and consume each tick exactly once.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The core scheduler is pure: the host drives a timer (roughly every four
//! seconds) and calls [`run_scheduler_tick`] with the current time. For each
//! active, due schedule, the consumed-tick set is the authoritative gate: a
//! `(schedule, next_run_at)` key that inserts fresh fires once and only once,
//! even under overlapping or restarted tickers. Callback failures are
//! swallowed after the schedule's timestamps advance, so a crashing job never
//! monopolizes the scheduler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::Channel;
use crate::core::CoreError;
use crate::core::MAX_SCHEDULE_INTERVAL_MINUTES;
use crate::core::MIN_SCHEDULE_INTERVAL_MINUTES;
use crate::core::PlatformState;
use crate::core::ReportFormat;
use crate::core::ReportRequest;
use crate::core::ReportSchedule;
use crate::core::ScheduleId;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::interfaces::RunAdapters;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Request to create a report schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    /// Display name.
    pub name: String,
    /// Metrics the scheduled report covers.
    #[serde(default)]
    pub metric_ids: Vec<String>,
    /// Delivery channels.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Output format; defaults to markdown.
    #[serde(default)]
    pub format: Option<ReportFormat>,
    /// Minutes between fires; clamped to `[5, 1440]`.
    pub interval_minutes: i64,
}

/// Outcome summary of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Schedules that fired this tick.
    pub fired: Vec<ScheduleId>,
    /// Schedules skipped because their tick was already consumed.
    pub skipped: Vec<ScheduleId>,
    /// Fired schedules whose callback failed (errors are swallowed).
    pub failed: Vec<ScheduleId>,
}

// ============================================================================
// SECTION: Schedule Lifecycle
// ============================================================================

/// Creates a report schedule.
///
/// # Errors
///
/// Returns `NotFound` when the tenant is unknown.
pub fn create_schedule(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: CreateScheduleRequest,
    now: Timestamp,
) -> Result<ReportSchedule, CoreError> {
    if state.tenant(tenant_id).is_none() {
        return Err(CoreError::not_found("tenant not found"));
    }
    let interval = request
        .interval_minutes
        .clamp(MIN_SCHEDULE_INTERVAL_MINUTES, MAX_SCHEDULE_INTERVAL_MINUTES);
    let schedule = ReportSchedule {
        id: ScheduleId::generate(),
        tenant_id: tenant_id.clone(),
        name: request.name,
        metric_ids: request.metric_ids,
        channels: request.channels,
        format: request.format.unwrap_or(ReportFormat::Markdown),
        interval_minutes: interval,
        active: true,
        last_run_at: None,
        next_run_at: now.plus_minutes(interval),
        created_at: now,
    };
    state.report_schedules.push(schedule.clone());
    Ok(schedule)
}

// ============================================================================
// SECTION: Tick Processing
// ============================================================================

/// Builds the consumed-tick key for a schedule fire.
fn tick_key(schedule_id: &ScheduleId, next_run_at: Timestamp) -> String {
    format!("{schedule_id}|{}", next_run_at.as_unix_millis())
}

/// Processes one scheduler tick at `now`.
///
/// Due schedules fire at most once per `(schedule, next_run_at)` key. The
/// schedule advances `next_run_at = now + interval` from the current time
/// (drift accumulates when ticks are slow; this matches the recorded
/// behavior of the original scheduler and is relied on by operators).
/// Callback errors are recorded in the outcome and otherwise swallowed.
pub fn run_scheduler_tick(
    state: &mut PlatformState,
    adapters: &dyn RunAdapters,
    now: Timestamp,
) -> TickOutcome {
    let due: Vec<ReportSchedule> = state
        .report_schedules
        .iter()
        .filter(|schedule| schedule.active && schedule.next_run_at <= now)
        .cloned()
        .collect();
    let mut outcome = TickOutcome::default();
    for schedule in due {
        let key = tick_key(&schedule.id, schedule.next_run_at);
        if !state.consumed_ticks.insert(key) {
            outcome.skipped.push(schedule.id.clone());
            continue;
        }
        let fired_at = schedule.next_run_at;
        let result = adapters.generate_report(
            state,
            &schedule.tenant_id,
            ReportRequest {
                title: Some(schedule.name.clone()),
                metric_ids: schedule.metric_ids.clone(),
                format: Some(schedule.format),
                channels: schedule.channels.clone(),
                ..ReportRequest::default()
            },
            now,
        );
        // The tick stays consumed and the schedule advances even on failure.
        if let Some(stored) = state
            .report_schedules
            .iter_mut()
            .find(|stored| stored.id == schedule.id)
        {
            stored.last_run_at = Some(fired_at);
            stored.next_run_at = now.plus_minutes(stored.interval_minutes);
        }
        match result {
            Ok(_) => outcome.fired.push(schedule.id.clone()),
            Err(_) => outcome.failed.push(schedule.id.clone()),
        }
    }
    outcome
}
