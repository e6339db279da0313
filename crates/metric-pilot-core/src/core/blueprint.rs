// crates/metric-pilot-core/src/core/blueprint.rs
// ============================================================================
// Module: Metric Pilot Blueprints
// Description: Static blueprint catalog of domains and metric definitions.
// Purpose: Select a tenant's metric set and derived-metric formulas at creation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A blueprint is a named bundle of domains and metric definitions applied at
//! tenant creation. Metric formulas are either passthroughs (`sum(x)`,
//! aggregated from canonical facts) or one of the named derived formulas
//! computed per bucket at query time. The catalog is static; tenants reference
//! blueprints by id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Metric Definitions
// ============================================================================

/// Aggregation grain for a metric definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGrain {
    /// One bucket per calendar day.
    Day,
    /// One bucket per ISO week (Monday anchor).
    Week,
    /// One bucket per calendar month.
    Month,
}

/// How a metric's value is produced at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricFormula {
    /// Sum of canonical facts carrying this metric id.
    Passthrough,
    /// `revenue / spend` per bucket; zero when spend is zero.
    Roas,
    /// `cash_in - cash_out` per bucket.
    Profit,
    /// `max(0, cash_in - cash_out) / cash_out * 30` per bucket; 999 when
    /// cash out is zero.
    RunwayDays,
}

/// A single metric definition within a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Metric identifier referenced by facts and queries.
    pub id: String,
    /// Formula producing the metric's value.
    pub formula: MetricFormula,
    /// Default aggregation grain.
    pub grain: MetricGrain,
    /// Business domain the metric belongs to.
    pub domain: String,
}

impl MetricDefinition {
    /// Builds a passthrough metric definition.
    #[must_use]
    pub fn passthrough(id: &str, domain: &str) -> Self {
        Self {
            id: id.to_string(),
            formula: MetricFormula::Passthrough,
            grain: MetricGrain::Day,
            domain: domain.to_string(),
        }
    }

    /// Builds a derived metric definition.
    #[must_use]
    pub fn derived(id: &str, formula: MetricFormula, domain: &str) -> Self {
        Self {
            id: id.to_string(),
            formula,
            grain: MetricGrain::Day,
            domain: domain.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Blueprints
// ============================================================================

/// A named bundle of domains and metric definitions.
///
/// # Invariants
/// - `metrics` only reference domains listed in `domains`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Blueprint identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Business domains the blueprint covers.
    pub domains: Vec<String>,
    /// Metric definitions applied to tenants using this blueprint.
    pub metrics: Vec<MetricDefinition>,
}

/// Returns the static blueprint catalog.
#[must_use]
pub fn blueprint_catalog() -> Vec<Blueprint> {
    vec![
        Blueprint {
            id: "b2b_saas".to_string(),
            name: "B2B SaaS".to_string(),
            domains: vec![
                "marketing".to_string(),
                "finance".to_string(),
                "crm".to_string(),
            ],
            metrics: vec![
                MetricDefinition::passthrough("revenue", "marketing"),
                MetricDefinition::passthrough("spend", "marketing"),
                MetricDefinition::passthrough("clicks", "marketing"),
                MetricDefinition::passthrough("conversions", "marketing"),
                MetricDefinition::passthrough("cash_in", "finance"),
                MetricDefinition::passthrough("cash_out", "finance"),
                MetricDefinition::passthrough("deals_created", "crm"),
                MetricDefinition::passthrough("deals_won", "crm"),
                MetricDefinition::passthrough("pipeline_value", "crm"),
                MetricDefinition::derived("roas", MetricFormula::Roas, "marketing"),
                MetricDefinition::derived("profit", MetricFormula::Profit, "finance"),
                MetricDefinition::derived("runway_days", MetricFormula::RunwayDays, "finance"),
            ],
        },
        Blueprint {
            id: "commerce".to_string(),
            name: "Commerce".to_string(),
            domains: vec!["marketing".to_string(), "finance".to_string()],
            metrics: vec![
                MetricDefinition::passthrough("revenue", "marketing"),
                MetricDefinition::passthrough("spend", "marketing"),
                MetricDefinition::passthrough("orders", "marketing"),
                MetricDefinition::passthrough("cash_in", "finance"),
                MetricDefinition::passthrough("cash_out", "finance"),
                MetricDefinition::derived("roas", MetricFormula::Roas, "marketing"),
                MetricDefinition::derived("profit", MetricFormula::Profit, "finance"),
            ],
        },
    ]
}

/// Default blueprint applied when tenant creation names none.
pub const DEFAULT_BLUEPRINT_ID: &str = "b2b_saas";

/// Looks up a blueprint by id in the static catalog.
#[must_use]
pub fn find_blueprint(id: &str) -> Option<Blueprint> {
    blueprint_catalog().into_iter().find(|blueprint| blueprint.id == id)
}
