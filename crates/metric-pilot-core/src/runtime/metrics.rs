// crates/metric-pilot-core/src/runtime/metrics.rs
// ============================================================================
// Module: Metric Pilot Metric Queries
// Description: Canonical fact aggregation by grain with derived metrics.
// Purpose: Produce ordered metric series and summaries for reports and models.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Metric queries aggregate canonical facts into grain buckets (day, ISO
//! Monday week, or `yyyy-mm` month), sum per bucket, then derive the named
//! formula metrics per bucket. Series are ordered by bucket ascending and
//! summaries are rounded to three decimals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::CoreError;
use crate::core::IsoDate;
use crate::core::MetricFormula;
use crate::core::MetricGrain;
use crate::core::PlatformState;
use crate::core::TenantId;
use crate::core::find_blueprint;

// ============================================================================
// SECTION: Query Types
// ============================================================================

/// Parameters for a metric query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    /// Metric to aggregate.
    #[serde(default)]
    pub metric_id: Option<String>,
    /// Aggregation grain; defaults to day.
    #[serde(default)]
    pub grain: Option<MetricGrain>,
    /// Inclusive start date.
    #[serde(default)]
    pub start_date: Option<IsoDate>,
    /// Inclusive end date.
    #[serde(default)]
    pub end_date: Option<IsoDate>,
}

/// A single aggregated point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Bucket label (date, week Monday, or `yyyy-mm`).
    pub bucket: String,
    /// Aggregated value.
    pub value: f64,
}

/// Summary statistics over a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Sum of all points.
    pub total: f64,
    /// Mean of all points.
    pub average: f64,
    /// Maximum point value.
    pub max: f64,
    /// Minimum point value.
    pub min: f64,
}

/// An aggregated metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    /// Metric queried.
    pub metric_id: String,
    /// Grain used.
    pub grain: MetricGrain,
    /// Points ordered by bucket ascending.
    pub series: Vec<MetricPoint>,
    /// Summary statistics, rounded to three decimals.
    pub summary: MetricSummary,
}

// ============================================================================
// SECTION: Query Execution
// ============================================================================

/// Runs a metric query over the canonical store.
///
/// # Errors
///
/// Returns a `BadRequest` [`CoreError`] when `metric_id` is absent.
pub fn query_metric(
    state: &PlatformState,
    tenant_id: &TenantId,
    query: &MetricQuery,
) -> Result<MetricSeries, CoreError> {
    let metric_id = query
        .metric_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CoreError::bad_request("metricId is required"))?;
    let grain = query.grain.unwrap_or(MetricGrain::Day);

    let formula = metric_formula(state, tenant_id, metric_id);
    let series = match formula {
        MetricFormula::Passthrough => {
            let buckets = bucket_sums(state, tenant_id, metric_id, grain, query);
            to_points(buckets)
        }
        MetricFormula::Roas => {
            derive(state, tenant_id, grain, query, "revenue", "spend", |revenue, spend| {
                if spend == 0.0 { 0.0 } else { revenue / spend }
            })
        }
        MetricFormula::Profit => {
            derive(state, tenant_id, grain, query, "cash_in", "cash_out", |cash_in, cash_out| {
                cash_in - cash_out
            })
        }
        MetricFormula::RunwayDays => {
            derive(state, tenant_id, grain, query, "cash_in", "cash_out", |cash_in, cash_out| {
                if cash_out == 0.0 {
                    999.0
                } else {
                    (cash_in - cash_out).max(0.0) / cash_out * 30.0
                }
            })
        }
    };

    Ok(MetricSeries {
        metric_id: metric_id.to_string(),
        grain,
        summary: summarize(&series),
        series,
    })
}

/// Resolves a metric's formula from the tenant's blueprint.
///
/// Unknown metrics aggregate as passthroughs so materialized datasets stay
/// queryable.
fn metric_formula(state: &PlatformState, tenant_id: &TenantId, metric_id: &str) -> MetricFormula {
    state
        .tenant(tenant_id)
        .and_then(|tenant| find_blueprint(&tenant.blueprint_id))
        .and_then(|blueprint| {
            blueprint.metrics.into_iter().find(|metric| metric.id == metric_id)
        })
        .map_or(MetricFormula::Passthrough, |metric| metric.formula)
}

/// Sums facts per bucket for one metric id.
fn bucket_sums(
    state: &PlatformState,
    tenant_id: &TenantId,
    metric_id: &str,
    grain: MetricGrain,
    query: &MetricQuery,
) -> BTreeMap<String, f64> {
    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
    for fact in &state.facts {
        if fact.tenant_id != *tenant_id || fact.metric_id != metric_id {
            continue;
        }
        if query.start_date.as_ref().is_some_and(|start| fact.date < *start) {
            continue;
        }
        if query.end_date.as_ref().is_some_and(|end| fact.date > *end) {
            continue;
        }
        *buckets.entry(bucket_label(&fact.date, grain)).or_insert(0.0) += fact.value;
    }
    buckets
}

/// Returns the bucket label for a date under a grain.
#[must_use]
pub fn bucket_label(date: &IsoDate, grain: MetricGrain) -> String {
    match grain {
        MetricGrain::Day => date.as_str().to_string(),
        MetricGrain::Week => date.week_monday().as_str().to_string(),
        MetricGrain::Month => date.month_bucket(),
    }
}

/// Computes a two-component derived series per bucket.
fn derive(
    state: &PlatformState,
    tenant_id: &TenantId,
    grain: MetricGrain,
    query: &MetricQuery,
    left: &str,
    right: &str,
    combine: impl Fn(f64, f64) -> f64,
) -> Vec<MetricPoint> {
    let left_sums = bucket_sums(state, tenant_id, left, grain, query);
    let right_sums = bucket_sums(state, tenant_id, right, grain, query);
    let mut labels: Vec<&String> = left_sums.keys().chain(right_sums.keys()).collect();
    labels.sort();
    labels.dedup();
    labels
        .into_iter()
        .map(|label| MetricPoint {
            bucket: label.clone(),
            value: combine(
                left_sums.get(label).copied().unwrap_or(0.0),
                right_sums.get(label).copied().unwrap_or(0.0),
            ),
        })
        .collect()
}

/// Converts bucket sums into an ordered point list.
fn to_points(buckets: BTreeMap<String, f64>) -> Vec<MetricPoint> {
    buckets
        .into_iter()
        .map(|(bucket, value)| MetricPoint {
            bucket,
            value,
        })
        .collect()
}

/// Rounds to three decimals.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

/// Builds the rounded summary for a series.
fn summarize(series: &[MetricPoint]) -> MetricSummary {
    if series.is_empty() {
        return MetricSummary::default();
    }
    let total: f64 = series.iter().map(|point| point.value).sum();
    let max = series.iter().map(|point| point.value).fold(f64::MIN, f64::max);
    let min = series.iter().map(|point| point.value).fold(f64::MAX, f64::min);
    #[allow(clippy::cast_precision_loss, reason = "series lengths are small")]
    let average = total / series.len() as f64;
    MetricSummary {
        total: round3(total),
        average: round3(average),
        max: round3(max),
        min: round3(min),
    }
}
