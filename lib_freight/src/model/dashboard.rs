//! # Dashboard Data
//!
//! Each field of [`DashboardData`] is an independent slice: a push update
//! replaces exactly one of them, a poll replaces the whole struct. Nested
//! detail the synchronisation layer never inspects (aircraft, airports,
//! cargo breakdowns, trends) is carried through untouched in a flattened
//! `details` map so upstream schema growth never breaks decoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Headline KPI block shown on the dashboard cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiData {
    /// Flights currently airborne or boarding.
    pub active_flights: u32,
    /// Aircraft utilisation in hours per day.
    pub aircraft_utilization: f64,
    /// Load factor percentage.
    pub load_factor: f64,
    /// Fuel burn in L/ton-km.
    pub fuel_efficiency: f64,
    /// Revenue per available ton-kilometre (USD).
    pub ratk: f64,
    /// Hub turn time in minutes.
    pub hub_turn_time: f64,
    /// Customs classifications processed.
    pub aduanapp_classifications: u64,
    /// Compliance score percentage.
    pub compliance_score: f64,
    /// On-time performance percentage.
    pub on_time_performance: f64,
    /// Cargo throughput in tons per day.
    pub cargo_throughput: f64,
    /// Revenue per flight (USD).
    pub revenue_per_flight: f64,
    /// Cost per ton-kilometre (USD).
    pub cost_per_ton_km: f64,
}

/// Lifecycle of a single flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlightStatus {
    /// Not yet departed.
    Scheduled,
    /// Departure or arrival slipped.
    Delayed,
    /// Airborne.
    InFlight,
    /// Arrived.
    Landed,
    /// Will not operate.
    Cancelled,
}

/// A single cargo flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightData {
    /// Stable identifier.
    pub id: String,
    /// Public flight number.
    pub flight_number: String,
    /// Current status.
    pub status: FlightStatus,
    /// Scheduled departure (RFC 3339).
    #[serde(default)]
    pub departure_time: String,
    /// Scheduled arrival (RFC 3339).
    #[serde(default)]
    pub arrival_time: String,
    /// Delay in minutes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    /// Origin, destination, aircraft, cargo and route detail.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// A recurring trade lane between two airports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRoute {
    /// Stable identifier.
    pub id: String,
    /// Great-circle distance in km.
    #[serde(default)]
    pub distance: f64,
    /// Utilisation percentage.
    #[serde(default)]
    pub utilization: f64,
    /// Endpoints, revenue, trends and seasonality.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Aggregate metrics from the product-classification service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierMetrics {
    /// Lifetime classification count.
    #[serde(default)]
    pub total_classifications: u64,
    /// Cost per classification (USD).
    #[serde(default)]
    pub cost_per_operation: f64,
    /// Service uptime percentage.
    #[serde(default)]
    pub uptime: f64,
    /// Per-service stats, latency percentiles, accuracy and trends.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Area an alert belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Hubs, fleet and schedules.
    Operational,
    /// Revenue and cost.
    Financial,
    /// Systems and integrations.
    Technical,
    /// Customs and compliance.
    Regulatory,
}

/// How loud an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Something failed.
    Error,
    /// Immediate action required.
    Critical,
}

/// An operator-facing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Stable identifier.
    pub id: String,
    /// Area of the alert.
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Severity.
    pub severity: AlertSeverity,
    /// One-line title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// When the alert was raised upstream.
    #[serde(default)]
    pub timestamp: String,
    /// Component that raised it.
    #[serde(default)]
    pub source: String,
    /// Seen by an operator.
    #[serde(default)]
    pub acknowledged: bool,
    /// Underlying condition cleared.
    #[serde(default)]
    pub resolved: bool,
}

/// The synchronised application payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardData {
    /// Latest KPI block.
    pub kpis: Option<KpiData>,
    /// Current flight board.
    pub flights: Vec<FlightData>,
    /// Trade lanes.
    pub routes: Vec<TradeRoute>,
    /// Classification service metrics.
    pub classifier: Option<ClassifierMetrics>,
    /// Open alerts, oldest first.
    pub alerts: Vec<Alert>,
}

impl DashboardData {
    /// Appends an alert, dropping the oldest ones beyond `max_alerts`.
    pub fn push_alert(&mut self, alert: Alert, max_alerts: usize) {
        self.alerts.push(alert);
        if self.alerts.len() > max_alerts {
            let excess = self.alerts.len() - max_alerts;
            self.alerts.drain(..excess);
        }
    }
}

/// Time window the dashboard is scoped to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    /// Last hour.
    #[serde(rename = "1h")]
    LastHour,
    /// Last six hours.
    #[serde(rename = "6h")]
    LastSixHours,
    /// Last day.
    #[default]
    #[serde(rename = "24h")]
    LastDay,
    /// Last week.
    #[serde(rename = "7d")]
    LastWeek,
    /// Last thirty days.
    #[serde(rename = "30d")]
    LastMonth,
    /// Operator-chosen range.
    #[serde(rename = "custom")]
    Custom,
}

/// Consumer-chosen filters. Never touched by data updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilters {
    /// Time window.
    pub time_range: TimeRange,
    /// Region codes to include (empty = all).
    pub regions: Vec<String>,
    /// Commodity types to include (empty = all).
    pub commodities: Vec<String>,
    /// Route ids to include (empty = all).
    pub routes: Vec<String>,
    /// Show forecast overlays.
    pub show_predictive: bool,
}

impl Default for DashboardFilters {
    fn default() -> Self {
        Self {
            time_range: TimeRange::default(),
            regions: Vec::new(),
            commodities: Vec::new(),
            routes: Vec::new(),
            show_predictive: true,
        }
    }
}

/// A partial filter update; only the `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    /// New time window.
    pub time_range: Option<TimeRange>,
    /// Replacement region list.
    pub regions: Option<Vec<String>>,
    /// Replacement commodity list.
    pub commodities: Option<Vec<String>>,
    /// Replacement route list.
    pub routes: Option<Vec<String>>,
    /// New predictive toggle.
    pub show_predictive: Option<bool>,
}

impl FilterUpdate {
    /// Shallow-merges this update into `filters`.
    pub fn apply(self, filters: &mut DashboardFilters) {
        if let Some(time_range) = self.time_range {
            filters.time_range = time_range;
        }
        if let Some(regions) = self.regions {
            filters.regions = regions;
        }
        if let Some(commodities) = self.commodities {
            filters.commodities = commodities;
        }
        if let Some(routes) = self.routes {
            filters.routes = routes;
        }
        if let Some(show_predictive) = self.show_predictive {
            filters.show_predictive = show_predictive;
        }
    }
}
