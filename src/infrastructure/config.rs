use crate::domain::transform::UnitTransform;
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxConfig {
    pub influx: InfluxSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_refresh_jitter")]
    pub refresh_jitter: f64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl ServerSettings {
    /// Zero periods would make the timers spin or panic
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.tick_secs > 0, "tick_secs must be positive");
        ensure!(self.refresh_secs > 0, "refresh_secs must be positive");
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            refresh_secs: default_refresh_secs(),
            refresh_jitter: default_refresh_jitter(),
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueriesConfig {
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// One named batch query, run on every snapshot refresh
#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    pub name: String,
    pub query: String,
    #[serde(default = "default_range_hours")]
    pub range_hours: u32,
    /// Split the result into one table per value of this tag
    pub group_by: Option<String>,
    #[serde(default)]
    pub rename: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardsConfig {
    #[serde(default)]
    pub dashboards: Vec<DashboardConfig>,
    #[serde(default)]
    pub summaries: Vec<SummaryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub id: String,
    pub title: String,
    pub sources: Vec<SourceConfig>,
    pub y_limits: YLimitsConfig,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_lead_in_secs")]
    pub lead_in_secs: i64,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub query: String,
    pub group: Option<String>,
    pub prefix: Option<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub transforms: Vec<ColumnTransform>,
}

/// A unit transform for one column, named as delivered by the query.
/// Listed rather than keyed so column names keep their case.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ColumnTransform {
    pub column: String,
    #[serde(flatten)]
    pub transform: UnitTransform,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum YLimitsConfig {
    Fixed([f64; 2]),
    Auto {
        low_column: String,
        high_column: String,
        #[serde(default = "default_pad")]
        pad: f64,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ColumnConfig {
    pub id: String,
    pub label: Option<String>,
    pub unit: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    pub id: String,
    pub title: String,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
    pub rows: Vec<SummaryRowConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryRowConfig {
    pub label: String,
    pub query: String,
    pub group: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub delimiter: String,
    /// Read every column at this column's last valid timestamp
    pub anchor: Option<String>,
    pub value_map: Option<ValueMapConfig>,
    /// Fixed decimal places for numeric values
    pub decimals: Option<usize>,
}

/// Turns a numeric state into text: zero maps to `zero`, anything else
/// to `other`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ValueMapConfig {
    pub zero: String,
    pub other: String,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_refresh_secs() -> u64 {
    60
}

fn default_refresh_jitter() -> f64 {
    0.1
}

fn default_tick_secs() -> u64 {
    5
}

fn default_range_hours() -> u32 {
    24
}

fn default_max_rows() -> usize {
    15000
}

fn default_lead_in_secs() -> i64 {
    60
}

fn default_pad() -> f64 {
    0.1
}

fn default_max_age_secs() -> i64 {
    crate::domain::summary::default_max_age().num_seconds()
}

impl DashboardsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for dashboard in &self.dashboards {
            ensure!(
                dashboard.max_rows > 0,
                "dashboard {}: max_rows must be positive",
                dashboard.id
            );
        }
        Ok(())
    }
}

pub fn load_influx_config() -> anyhow::Result<InfluxConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/influx"))
        .build()?;

    let influx: InfluxConfig = settings.try_deserialize()?;
    influx.server.validate().context("invalid [server] settings")?;
    Ok(influx)
}

pub fn load_queries_config() -> anyhow::Result<QueriesConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/queries"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboards_config() -> anyhow::Result<DashboardsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboards"))
        .build()?;

    let dashboards: DashboardsConfig = settings.try_deserialize()?;
    dashboards.validate().context("invalid config/dashboards")?;
    Ok(dashboards)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_query() {
        let mut vars = HashMap::new();
        vars.insert("hours".to_string(), "12".to_string());

        let query = "SELECT * FROM \"WRS\" WHERE time >= now() - ${hours}h";
        let result = prepare_query(query, &vars);

        assert_eq!(result, "SELECT * FROM \"WRS\" WHERE time >= now() - 12h");
    }

    #[test]
    fn test_dashboard_defaults_and_limits() {
        let config: DashboardsConfig = toml::from_str(
            r#"
            [[dashboards]]
            id = "dctweather"
            title = "DCT Weather Information"
            y_limits = { low_column = "DewPoint", high_column = "AirTemp" }

            [[dashboards.sources]]
            query = "q_dctweather"
            drop = ["WindDir2MinAvg"]
            transforms = [{ column = "AirTemp", kind = "fahrenheit_to_celsius" }]

            [[dashboards]]
            id = "insttemps"
            title = "Instrument Temperatures"
            y_limits = [-120.0, 30.0]
            max_rows = 100

            [[dashboards.sources]]
            query = "q_insttemps"
            group = "lemi"
            prefix = "LMI"
            "#,
        )
        .unwrap();

        let weather = &config.dashboards[0];
        assert_eq!(weather.max_rows, 15000);
        assert_eq!(weather.lead_in_secs, 60);
        assert_eq!(
            weather.y_limits,
            YLimitsConfig::Auto {
                low_column: "DewPoint".to_string(),
                high_column: "AirTemp".to_string(),
                pad: 0.1,
            }
        );
        assert_eq!(
            weather.sources[0].transforms,
            vec![ColumnTransform {
                column: "AirTemp".to_string(),
                transform: UnitTransform::FahrenheitToCelsius,
            }]
        );

        let inst = &config.dashboards[1];
        assert_eq!(inst.y_limits, YLimitsConfig::Fixed([-120.0, 30.0]));
        assert_eq!(inst.sources[0].prefix.as_deref(), Some("LMI"));
        assert!(config.summaries.is_empty());
    }

    #[test]
    fn test_server_defaults() {
        let config: InfluxConfig = toml::from_str(
            r#"
            [influx]
            host = "http://localhost:8086"
            token = "t"
            database = "dct"
            retention_policy = "autogen"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.refresh_secs, 60);
        assert_eq!(config.server.tick_secs, 5);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
    }

    #[test]
    fn test_shipped_configs_parse() {
        let influx: InfluxConfig = toml::from_str(include_str!("../../config/influx.toml")).unwrap();
        assert_eq!(influx.server.tick_secs, 5);
        assert!(influx.server.validate().is_ok());

        let queries: QueriesConfig = toml::from_str(include_str!("../../config/queries.toml")).unwrap();
        let insttemps = queries.queries.iter().find(|q| q.name == "q_insttemps").unwrap();
        assert_eq!(insttemps.group_by.as_deref(), Some("instrument"));
        assert_eq!(insttemps.rename["ccd_temp"], "CCDTemp");

        let dashboards: DashboardsConfig =
            toml::from_str(include_str!("../../config/dashboards.toml")).unwrap();
        assert_eq!(dashboards.dashboards.len(), 2);
        assert_eq!(dashboards.dashboards[0].sources[0].transforms.len(), 2);
        assert!(dashboards.validate().is_ok());

        let tcs = &dashboards.summaries[0];
        assert_eq!(tcs.max_age_secs, 330);
        assert_eq!(tcs.rows[0].delimiter, ":");
        assert_eq!(tcs.rows[0].anchor.as_deref(), Some("cRA_h"));
        assert_eq!(tcs.rows[2].decimals, Some(2));

        let lpi = &dashboards.summaries[1];
        assert_eq!(lpi.rows[1].value_map.as_ref().map(|m| m.zero.as_str()), Some("Closed"));
        assert_eq!(lpi.rows[1].delimiter, "");
    }

    #[test]
    fn test_zero_periods_and_capacities_are_rejected() {
        let server: ServerSettings = toml::from_str("tick_secs = 0").unwrap();
        assert!(server.validate().is_err());
        let server: ServerSettings = toml::from_str("refresh_secs = 0").unwrap();
        assert!(server.validate().is_err());
        assert!(ServerSettings::default().validate().is_ok());

        let dashboards: DashboardsConfig = toml::from_str(
            r#"
            [[dashboards]]
            id = "insttemps"
            title = "Instrument Temperatures"
            y_limits = [-120.0, 30.0]
            max_rows = 0
            sources = []
            "#,
        )
        .unwrap();
        let err = dashboards.validate().unwrap_err();
        assert!(err.to_string().contains("insttemps"));
    }
}
