//! Rule-based field health classification
//!
//! Maps aggregate index statistics, and optionally a weather snapshot, to an
//! overall health label, weather-correlated alerts and prioritized
//! recommendations. All rules are static thresholds; the same input always
//! yields the same output apart from the timestamp.

use crate::config::{HealthThresholds, PipelineConfig};
use crate::core::ndvi::{ClassCounts, IndexStatistics};
use crate::io::weather::{Alert, AlertSeverity, WeatherContext};
use crate::types::{HealthClass, IndexRaster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field-level health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverallHealth {
    Good,
    Fair,
    Poor,
    Critical,
    #[serde(rename = "No Data")]
    NoData,
}

impl OverallHealth {
    /// Label from the healthy fraction of `total` pixels
    pub fn from_fraction(healthy: f64, total: f64) -> Self {
        if total <= 0.0 {
            return OverallHealth::NoData;
        }
        let fraction = healthy / total;
        if fraction > 0.7 {
            OverallHealth::Good
        } else if fraction > 0.5 {
            OverallHealth::Fair
        } else if fraction > 0.3 {
            OverallHealth::Poor
        } else {
            OverallHealth::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OverallHealth::Good => "Good",
            OverallHealth::Fair => "Fair",
            OverallHealth::Poor => "Poor",
            OverallHealth::Critical => "Critical",
            OverallHealth::NoData => "No Data",
        }
    }
}

impl fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Actionable follow-up for the field manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub detail: String,
}

impl Recommendation {
    fn new(priority: Priority, action: &str, detail: impl Into<String>) -> Self {
        Self {
            priority,
            action: action.to_string(),
            detail: detail.into(),
        }
    }
}

/// Class shares in percent, rounded to one decimal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassPercentages {
    pub healthy: f64,
    pub moderate_stress: f64,
    pub severe_stress: f64,
    pub critical: f64,
}

impl ClassPercentages {
    /// Severe plus critical share
    pub fn stressed(&self) -> f64 {
        self.severe_stress + self.critical
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallIndex {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Health classification of one index raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthClassification {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub pixel_counts: ClassCounts,
    pub percentages: ClassPercentages,
    pub overall_index: OverallIndex,
    pub overall_health: OverallHealth,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
}

pub struct HealthClassifier {
    thresholds: HealthThresholds,
}

impl HealthClassifier {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.thresholds)
    }

    /// Health class of a single index value
    pub fn classify_value(&self, value: f32) -> HealthClass {
        self.thresholds.class_of(value)
    }

    /// Classify aggregate statistics, adding weather-correlated alerts when
    /// a weather snapshot is supplied
    pub fn classify(
        &self,
        stats: &IndexStatistics,
        weather: Option<&WeatherContext>,
    ) -> HealthClassification {
        let counts = stats.class_counts;
        let percentages = class_percentages(stats);

        let overall_health = if counts.total > 0 {
            OverallHealth::from_fraction(counts.healthy as f64, counts.total as f64)
        } else if stats.total_pixels > 0 {
            // statistics carrying shares only
            OverallHealth::from_fraction(stats.healthy_pct, 100.0)
        } else {
            OverallHealth::NoData
        };

        let alerts = weather
            .map(|w| weather_correlated_alerts(&percentages, w))
            .unwrap_or_default();
        let recommendations = recommendations(&percentages);

        log::info!(
            "Health classified: {} (healthy={:.1}%, {} alerts, {} recommendations)",
            overall_health,
            percentages.healthy,
            alerts.len(),
            recommendations.len()
        );

        HealthClassification {
            timestamp: Utc::now(),
            source: String::new(),
            pixel_counts: counts,
            percentages,
            overall_index: OverallIndex {
                mean: stats.mean,
                std: stats.std,
                min: stats.min,
                max: stats.max,
            },
            overall_health,
            alerts,
            recommendations,
        }
    }

    /// Compute statistics of `raster` and classify them
    pub fn classify_raster(
        &self,
        raster: &IndexRaster,
        weather: Option<&WeatherContext>,
    ) -> HealthClassification {
        let stats = crate::core::ndvi::statistics(&raster.data, &self.thresholds);
        let mut classification = self.classify(&stats, weather);
        classification.source = raster.source.clone();
        classification
    }
}

fn class_percentages(stats: &IndexStatistics) -> ClassPercentages {
    let counts = &stats.class_counts;
    if counts.total > 0 {
        ClassPercentages {
            healthy: round1(counts.percent(HealthClass::Healthy)),
            moderate_stress: round1(counts.percent(HealthClass::ModerateStress)),
            severe_stress: round1(counts.percent(HealthClass::SevereStress)),
            critical: round1(counts.percent(HealthClass::Critical)),
        }
    } else {
        ClassPercentages {
            healthy: round1(stats.healthy_pct),
            moderate_stress: round1(stats.moderate_stress_pct),
            severe_stress: round1(stats.severe_stress_pct),
            critical: round1(stats.critical_pct),
        }
    }
}

fn weather_correlated_alerts(pcts: &ClassPercentages, weather: &WeatherContext) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let soil_moisture = weather.soil.moisture;
    let humidity = weather.current.humidity_pct;
    let temp = weather.current.temperature_c;

    if soil_moisture < 0.2 && pcts.stressed() > 30.0 {
        alerts.push(Alert {
            severity: AlertSeverity::Critical,
            title: "Drought Stress Detected".to_string(),
            message: format!(
                "Soil moisture at {:.0}% combined with {:.0}% stressed vegetation. \
                 Immediate irrigation required.",
                soil_moisture * 100.0,
                pcts.stressed()
            ),
            icon: Some("🚨".to_string()),
            category: None,
            score: None,
        });
    }

    if humidity > 80.0 && temp > 18.0 && pcts.moderate_stress > 20.0 {
        alerts.push(Alert {
            severity: AlertSeverity::Warning,
            title: "Disease Risk Elevated".to_string(),
            message: format!(
                "Humidity at {:.0}% and temp at {:.1}°C with {:.0}% moderately stressed \
                 vegetation. Scout for fungal pathogens.",
                humidity, temp, pcts.moderate_stress
            ),
            icon: Some("⚠️".to_string()),
            category: None,
            score: None,
        });
    }

    if temp < 2.0 && pcts.healthy > 30.0 {
        alerts.push(Alert {
            severity: AlertSeverity::Warning,
            title: "Frost Damage Risk".to_string(),
            message: format!(
                "Temperature at {:.1}°C with active vegetation. \
                 Risk of frost damage to growing crop.",
                temp
            ),
            icon: Some("🥶".to_string()),
            category: None,
            score: None,
        });
    }

    alerts
}

fn recommendations(pcts: &ClassPercentages) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    if pcts.critical > 15.0 {
        recs.push(Recommendation::new(
            Priority::High,
            "Field Inspection",
            format!(
                "{:.0}% of field is in critical condition. \
                 Deploy ground crew for immediate visual inspection.",
                pcts.critical
            ),
        ));
    }
    if pcts.severe_stress > 25.0 {
        recs.push(Recommendation::new(
            Priority::High,
            "Soil & Nutrient Test",
            "Significant stress detected. Recommend soil sampling to identify \
             possible nutrient deficiency or pH imbalance.",
        ));
    }
    if pcts.moderate_stress > 30.0 {
        recs.push(Recommendation::new(
            Priority::Medium,
            "Targeted Treatment",
            "Apply variable-rate fertilizer or irrigation to moderately stressed \
             zones to prevent further decline.",
        ));
    }
    if pcts.healthy > 70.0 {
        recs.push(Recommendation::new(
            Priority::Low,
            "Routine Monitoring",
            "Field is predominantly healthy. Continue scheduled monitoring and \
             maintain current management practices.",
        ));
    }

    if recs.is_empty() {
        recs.push(Recommendation::new(
            Priority::Medium,
            "Schedule Next Scan",
            "Re-scan in 3-5 days to track vegetation trends.",
        ));
    }
    recs
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
