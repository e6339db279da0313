// crates/metric-pilot-core/src/runtime/query.rs
// ============================================================================
// Module: Metric Pilot Query Broker
// Description: Policy-gated live read path and fact materialization.
// Purpose: Serve allowlisted projections of canonical facts with caching.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! The broker serves live queries without executing SQL: a `SELECT`-only
//! statement is reduced to a normalized query, tenant data policy and
//! connection allowlists are enforced fail-closed, and rows are projected
//! from canonical facts in table-specific shapes. Results cache for sixty
//! seconds; a cached result can be re-ingested as canonical facts with a
//! `materialized:{dataset}` source tag.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::CanonicalFact;
use crate::core::ConnectionId;
use crate::core::CoreError;
use crate::core::FactId;
use crate::core::FactLineage;
use crate::core::IsoDate;
use crate::core::LIVE_QUERY_CACHE_TTL_SECONDS;
use crate::core::LiveQueryCacheEntry;
use crate::core::LiveQueryResult;
use crate::core::MAX_LIVE_QUERY_LIMIT;
use crate::core::MaterializationId;
use crate::core::MaterializationMapping;
use crate::core::MaterializationRun;
use crate::core::NormalizedQuery;
use crate::core::PlatformState;
use crate::core::QueryMetadata;
use crate::core::QueryResultId;
use crate::core::SourceConnection;
use crate::core::Tenant;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::hashing::sha256_canonical_json;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A live query request: structured, SQL, or both (SQL wins validation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQueryRequest {
    /// Connection to query.
    pub connection_id: ConnectionId,
    /// Structured query form.
    #[serde(default)]
    pub query: Option<NormalizedQuery>,
    /// Raw `SELECT` statement reduced to a normalized query.
    #[serde(default)]
    pub sql: Option<String>,
    /// Caller-declared timeout, checked against tenant policy.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Caller-declared cost ceiling, checked against tenant policy.
    #[serde(default)]
    pub cost_limit: Option<u64>,
}

/// A materialization request over a cached result or a fresh query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeRequest {
    /// Cached result to ingest.
    #[serde(default)]
    pub result_id: Option<QueryResultId>,
    /// Fresh query to run when no cached result is named.
    #[serde(default)]
    pub live_query: Option<LiveQueryRequest>,
    /// Dataset label recorded in fact sources.
    pub dataset_name: String,
    /// Column-to-fact mapping.
    pub mapping: MaterializationMapping,
}

// ============================================================================
// SECTION: SQL Reduction
// ============================================================================

/// Tokens that reject a statement outright.
const FORBIDDEN_TOKENS: &[&str] =
    &["insert", "update", "delete", "drop", "alter", "truncate", "create", "grant"];

/// Reduces a `SELECT` statement to a normalized query.
///
/// # Errors
///
/// Returns `BadRequest` when the statement is not a plain `SELECT` or
/// contains a forbidden token.
fn reduce_sql(sql: &str, fallback_limit: usize) -> Result<NormalizedQuery, CoreError> {
    let trimmed = sql.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if !lowered.starts_with("select") {
        return Err(CoreError::bad_request("only SELECT statements are accepted"));
    }
    for token in FORBIDDEN_TOKENS {
        if lowered
            .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
            .any(|word| word == *token)
        {
            return Err(CoreError::bad_request(format!("forbidden sql token: {token}")));
        }
    }
    let columns_part = lowered
        .strip_prefix("select")
        .and_then(|rest| rest.split_once(" from "))
        .map(|(columns, _)| columns.trim().to_string());
    let table = lowered
        .split_once(" from ")
        .map(|(_, rest)| rest.split_whitespace().next().unwrap_or_default().to_string())
        .filter(|table| !table.is_empty())
        .ok_or_else(|| CoreError::bad_request("SELECT statement names no table"))?;
    let columns = match columns_part.as_deref() {
        None | Some("*") | Some("") => Vec::new(),
        Some(list) => list.split(',').map(|column| column.trim().to_string()).collect(),
    };
    Ok(NormalizedQuery {
        table,
        columns,
        limit: fallback_limit,
        filters: BTreeMap::new(),
    })
}

// ============================================================================
// SECTION: Live Queries
// ============================================================================

/// Runs a live query against a live-capable connection.
///
/// # Errors
///
/// Returns `BadRequest` on mode or policy-bound violations and `Forbidden`
/// on allowlist violations.
pub fn run_live_query(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: &LiveQueryRequest,
    now: Timestamp,
) -> Result<LiveQueryResult, CoreError> {
    let tenant = state
        .tenant(tenant_id)
        .ok_or_else(|| CoreError::not_found("tenant not found"))?
        .clone();
    let connection = state
        .connection(tenant_id, &request.connection_id)
        .ok_or_else(|| CoreError::not_found("source connection not found"))?
        .clone();
    if !connection.mode.supports_live() {
        return Err(CoreError::bad_request("connection does not support live queries"));
    }

    let normalized = normalize_request(&tenant, request)?;
    enforce_data_policy(&tenant, request, &normalized)?;
    enforce_query_policy(&connection, &normalized)?;

    let cache_key = cache_key(tenant_id, &connection.id, &normalized)?;
    if let Some(entry) = state.query_cache.get(&cache_key) {
        if entry.expires_at > now {
            let mut result = entry.result.clone();
            result.query_metadata.cached = true;
            return Ok(result);
        }
        state.query_cache.remove(&cache_key);
    }

    let all_rows = project_rows(state, tenant_id, &normalized.table);
    let filtered: Vec<BTreeMap<String, Value>> = all_rows
        .into_iter()
        .filter(|row| {
            normalized.filters.iter().all(|(column, expected)| {
                row.get(column).is_some_and(|value| value_as_string(value) == *expected)
            })
        })
        .collect();
    let total_rows = filtered.len();
    let rows: Vec<BTreeMap<String, Value>> = filtered
        .into_iter()
        .take(normalized.limit)
        .map(|row| project_columns(row, &normalized.columns))
        .collect();

    let result = LiveQueryResult {
        result_id: QueryResultId::generate(),
        query_metadata: QueryMetadata {
            table: normalized.table.clone(),
            row_count: rows.len(),
            total_rows,
            cached: false,
        },
        rows,
    };
    state.query_cache.insert(
        cache_key,
        LiveQueryCacheEntry {
            tenant_id: tenant_id.clone(),
            connection_id: connection.id,
            result: result.clone(),
            expires_at: now.plus_seconds(LIVE_QUERY_CACHE_TTL_SECONDS),
        },
    );
    Ok(result)
}

/// Normalizes the request's query or SQL into a bounded form.
fn normalize_request(
    tenant: &Tenant,
    request: &LiveQueryRequest,
) -> Result<NormalizedQuery, CoreError> {
    let default_limit = tenant.data_policy.max_live_query_rows.min(MAX_LIVE_QUERY_LIMIT);
    let mut normalized = match (&request.sql, &request.query) {
        (Some(sql), _) => reduce_sql(sql, default_limit)?,
        (None, Some(query)) => query.clone(),
        (None, None) => {
            return Err(CoreError::bad_request("either query or sql is required"));
        }
    };
    normalized.limit = normalized.limit.clamp(1, MAX_LIVE_QUERY_LIMIT);
    Ok(normalized)
}

/// Enforces the tenant data policy over declared bounds.
fn enforce_data_policy(
    tenant: &Tenant,
    request: &LiveQueryRequest,
    normalized: &NormalizedQuery,
) -> Result<(), CoreError> {
    let policy = &tenant.data_policy;
    if request.timeout_ms.is_some_and(|timeout| timeout > policy.max_live_query_timeout_ms) {
        return Err(CoreError::bad_request("timeout exceeds tenant data policy"));
    }
    if request.cost_limit.is_some_and(|cost| cost > policy.max_live_query_cost_units) {
        return Err(CoreError::bad_request("cost limit exceeds tenant data policy"));
    }
    if normalized.limit > policy.max_live_query_rows {
        return Err(CoreError::bad_request("row limit exceeds tenant data policy"));
    }
    Ok(())
}

/// Enforces the connection's table and column allowlists.
fn enforce_query_policy(
    connection: &SourceConnection,
    normalized: &NormalizedQuery,
) -> Result<(), CoreError> {
    let policy = &connection.query_policy;
    if !policy.allowed_tables.iter().any(|table| table == &normalized.table) {
        return Err(CoreError::forbidden(format!(
            "table {} is not allowed on this connection",
            normalized.table
        )));
    }
    if normalized.columns.is_empty() {
        return Ok(());
    }
    let allowed = policy
        .allowed_columns_by_table
        .get(&normalized.table)
        .or_else(|| policy.allowed_columns_by_table.get("default"));
    if let Some(allowed) = allowed {
        for column in &normalized.columns {
            if !allowed.contains(column) {
                return Err(CoreError::forbidden(format!("column {column} is not allowed")));
            }
        }
    }
    Ok(())
}

/// Computes the cache key for a normalized query.
fn cache_key(
    tenant_id: &TenantId,
    connection_id: &ConnectionId,
    normalized: &NormalizedQuery,
) -> Result<String, CoreError> {
    let digest = sha256_canonical_json(&json!({
        "tenant": tenant_id,
        "connection": connection_id,
        "query": normalized,
    }))
    .map_err(|err| CoreError::internal(format!("cache key hashing failed: {err}")))?;
    Ok(digest)
}

// ============================================================================
// SECTION: Row Projection
// ============================================================================

/// Renders a JSON value as its filter-comparable string form.
fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Projects a row down to the requested columns.
fn project_columns(
    row: BTreeMap<String, Value>,
    columns: &[String],
) -> BTreeMap<String, Value> {
    if columns.is_empty() {
        return row;
    }
    row.into_iter().filter(|(column, _)| columns.contains(column)).collect()
}

/// Projects canonical facts into table-specific row shapes.
fn project_rows(
    state: &PlatformState,
    tenant_id: &TenantId,
    table: &str,
) -> Vec<BTreeMap<String, Value>> {
    match table {
        "campaign_performance" => daily_rollup(state, tenant_id, "marketing", |row, sums| {
            let spend = sums.get("spend").copied().unwrap_or(0.0);
            let revenue = sums.get("revenue").copied().unwrap_or(0.0);
            row.insert("campaign".to_string(), Value::from("all"));
            row.insert("spend".to_string(), Value::from(spend));
            row.insert("revenue".to_string(), Value::from(revenue));
            row.insert(
                "roas".to_string(),
                Value::from(if spend == 0.0 { 0.0 } else { revenue / spend }),
            );
        }),
        "finance_ledger" => daily_rollup(state, tenant_id, "finance", |row, sums| {
            let cash_in = sums.get("cash_in").copied().unwrap_or(0.0);
            let cash_out = sums.get("cash_out").copied().unwrap_or(0.0);
            row.insert("cash_in".to_string(), Value::from(cash_in));
            row.insert("cash_out".to_string(), Value::from(cash_out));
            row.insert("net".to_string(), Value::from(cash_in - cash_out));
        }),
        "crm_pipeline" => daily_rollup(state, tenant_id, "crm", |row, sums| {
            row.insert(
                "deals_created".to_string(),
                Value::from(sums.get("deals_created").copied().unwrap_or(0.0)),
            );
            row.insert(
                "deals_won".to_string(),
                Value::from(sums.get("deals_won").copied().unwrap_or(0.0)),
            );
            row.insert(
                "pipeline_value".to_string(),
                Value::from(sums.get("pipeline_value").copied().unwrap_or(0.0)),
            );
        }),
        _ => state
            .facts
            .iter()
            .filter(|fact| fact.tenant_id == *tenant_id)
            .map(|fact| {
                let mut row = BTreeMap::new();
                row.insert("date".to_string(), Value::from(fact.date.as_str()));
                row.insert("domain".to_string(), Value::from(fact.domain.clone()));
                row.insert("metric_id".to_string(), Value::from(fact.metric_id.clone()));
                row.insert("value".to_string(), Value::from(fact.value));
                row.insert("source".to_string(), Value::from(fact.source.clone()));
                row
            })
            .collect(),
    }
}

/// Rolls up a domain's facts per day and shapes each row via `fill`.
fn daily_rollup(
    state: &PlatformState,
    tenant_id: &TenantId,
    domain: &str,
    fill: impl Fn(&mut BTreeMap<String, Value>, &BTreeMap<String, f64>),
) -> Vec<BTreeMap<String, Value>> {
    let mut by_date: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for fact in &state.facts {
        if fact.tenant_id != *tenant_id || fact.domain != domain {
            continue;
        }
        *by_date
            .entry(fact.date.as_str().to_string())
            .or_default()
            .entry(fact.metric_id.clone())
            .or_insert(0.0) += fact.value;
    }
    by_date
        .into_iter()
        .map(|(date, sums)| {
            let mut row = BTreeMap::new();
            row.insert("date".to_string(), Value::from(date));
            fill(&mut row, &sums);
            row
        })
        .collect()
}

// ============================================================================
// SECTION: Materialization
// ============================================================================

/// Materializes query rows into canonical facts.
///
/// # Errors
///
/// Returns `BadRequest` when neither a cached result nor a query is given,
/// `NotFound` when the cached result is gone, and propagates live query
/// failures.
pub fn materialize_query_result(
    state: &mut PlatformState,
    tenant_id: &TenantId,
    request: MaterializeRequest,
    now: Timestamp,
) -> Result<MaterializationRun, CoreError> {
    if request.dataset_name.is_empty() {
        return Err(CoreError::bad_request("datasetName is required"));
    }
    let (result_id, rows) = if let Some(result_id) = request.result_id {
        let entry = state
            .query_cache
            .values()
            .find(|entry| {
                entry.tenant_id == *tenant_id && entry.result.result_id == result_id
            })
            .ok_or_else(|| CoreError::not_found("cached query result not found"))?;
        (result_id.clone(), entry.result.rows.clone())
    } else if let Some(live) = request.live_query {
        let result = run_live_query(state, tenant_id, &live, now)?;
        (result.result_id, result.rows)
    } else {
        return Err(CoreError::bad_request("either resultId or liveQuery is required"));
    };

    let mapping = request.mapping;
    let total_rows = rows.len();
    let source = format!("materialized:{}", request.dataset_name);
    let mut inserted_records = 0usize;
    for row in rows {
        let Some(date) = row
            .get(&mapping.date_column)
            .map(value_as_string)
            .and_then(|raw| IsoDate::parse(&raw).ok())
        else {
            continue;
        };
        let Some(metric_id) = mapping
            .fixed_metric_id
            .clone()
            .or_else(|| mapping.metric_column.as_ref().and_then(|column| {
                row.get(column).map(value_as_string)
            }))
        else {
            continue;
        };
        let Some(value) = row.get(&mapping.value_column).and_then(Value::as_f64) else {
            continue;
        };
        if !value.is_finite() {
            continue;
        }
        let inserted = state.insert_fact(CanonicalFact {
            id: FactId::generate(),
            tenant_id: tenant_id.clone(),
            domain: mapping.domain.clone(),
            metric_id,
            date,
            value,
            source: source.clone(),
            lineage: FactLineage {
                provider: source.clone(),
                connector_run_id: None,
                extracted_at: now,
            },
        });
        if inserted {
            inserted_records += 1;
        }
    }

    let run = MaterializationRun {
        id: MaterializationId::generate(),
        tenant_id: tenant_id.clone(),
        source_result_id: result_id,
        dataset_name: request.dataset_name,
        inserted_records,
        total_rows,
        created_at: now,
    };
    state.materializations.push(run.clone());
    Ok(run)
}
