//! Weather context records and the weather collaborator seam
//!
//! Fields absent from a provider payload take the benign defaults below so
//! that a partial record never triggers a weather-correlated alert.

use crate::config::FieldLocation;
use crate::types::CropResult;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Critical => write!(f, "CRITICAL"),
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Info => write!(f, "INFO"),
        }
    }
}

/// A contextual alert raised by classification or weather rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Agronomic area for weather-only alerts ("irrigation", "frost", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Urgency score 0-5 of weather-only alerts
    #[serde(rename = "severity", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentConditions {
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    pub cloud_cover_pct: f64,
    pub description: String,
}

impl Default for CurrentConditions {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            feels_like_c: 20.0,
            humidity_pct: 50.0,
            pressure_hpa: 1013.0,
            wind_speed_ms: 0.0,
            wind_direction_deg: 0.0,
            cloud_cover_pct: 0.0,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Precipitation {
    pub rain_mm: f64,
    pub rain_probability_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilConditions {
    /// Volumetric moisture fraction 0-1
    pub moisture: f64,
    pub temperature_c: f64,
}

impl Default for SoilConditions {
    fn default() -> Self {
        Self {
            moisture: 0.5,
            temperature_c: 17.0,
        }
    }
}

/// Weather and soil snapshot for the monitored field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherContext {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub coordinates: Option<Coordinates>,
    pub current: CurrentConditions,
    pub precipitation: Precipitation,
    pub soil: SoilConditions,
    pub agricultural_alerts: Vec<Alert>,
    pub dew_point_c: Option<f64>,
}

impl Default for WeatherContext {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            source: "unknown".to_string(),
            coordinates: None,
            current: CurrentConditions::default(),
            precipitation: Precipitation::default(),
            soil: SoilConditions::default(),
            agricultural_alerts: Vec::new(),
            dew_point_c: None,
        }
    }
}

/// Provider of weather context for a field
pub trait WeatherSource {
    fn acquire(&mut self, field: &FieldLocation) -> CropResult<WeatherContext>;
}

/// Always returns the same context (tests, replays, offline runs)
pub struct StaticWeather {
    context: WeatherContext,
}

impl StaticWeather {
    pub fn new(context: WeatherContext) -> Self {
        Self { context }
    }
}

impl WeatherSource for StaticWeather {
    fn acquire(&mut self, _field: &FieldLocation) -> CropResult<WeatherContext> {
        Ok(self.context.clone())
    }
}

/// Deterministic seasonal weather for a field
///
/// Northern-hemisphere monthly base temperature with humidity, rain and
/// soil moisture derived from it. Used when no live provider is configured.
pub struct SeasonalWeather {
    now: fn() -> DateTime<Utc>,
}

impl SeasonalWeather {
    pub fn new() -> Self {
        Self { now: Utc::now }
    }

    /// Fix the clock used to pick the season
    pub fn with_clock(now: fn() -> DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn generate(&self, field: &FieldLocation) -> WeatherContext {
        let timestamp = (self.now)();
        let base_temp = seasonal_base_temperature(timestamp.month());

        let humidity = (70.0 - base_temp * 0.5).clamp(20.0, 95.0);
        let wind_speed = 3.0 + (timestamp.day() % 5) as f64 * 0.8;
        let cloud_cover = ((timestamp.day() * 7) % 100) as f64;
        let rain_probability = if humidity > 60.0 { 0.3 } else { 0.1 };
        let rain: f64 = if humidity > 60.0 && cloud_cover > 50.0 { 2.5 } else { 0.0 };
        let soil_moisture = (0.4 + rain * 0.02).clamp(0.05, 0.95);

        let heat_index = if base_temp > 26.0 {
            base_temp + 0.5 * (humidity / 100.0) * base_temp
        } else {
            base_temp
        };

        WeatherContext {
            timestamp,
            source: "synthetic".to_string(),
            coordinates: Some(Coordinates { lat: field.lat, lon: field.lon }),
            current: CurrentConditions {
                temperature_c: round1(base_temp),
                feels_like_c: round1(heat_index),
                humidity_pct: round1(humidity),
                pressure_hpa: 1013.0,
                wind_speed_ms: round1(wind_speed),
                wind_direction_deg: ((timestamp.day() * 37) % 360) as f64,
                cloud_cover_pct: cloud_cover,
                description: weather_description(base_temp, cloud_cover, rain).to_string(),
            },
            precipitation: Precipitation {
                rain_mm: rain,
                rain_probability_pct: rain_probability * 100.0,
            },
            soil: SoilConditions {
                moisture: soil_moisture,
                temperature_c: round1(base_temp - 3.0),
            },
            agricultural_alerts: agricultural_alerts(
                base_temp,
                humidity,
                soil_moisture,
                wind_speed,
            ),
            dew_point_c: Some(round1(base_temp - (100.0 - humidity) / 5.0)),
        }
    }
}

impl Default for SeasonalWeather {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherSource for SeasonalWeather {
    fn acquire(&mut self, field: &FieldLocation) -> CropResult<WeatherContext> {
        let weather = self.generate(field);
        log::info!(
            "Synthetic weather: {:.1}°C, {:.0}% humidity, soil moisture {:.2}",
            weather.current.temperature_c,
            weather.current.humidity_pct,
            weather.soil.moisture
        );
        Ok(weather)
    }
}

fn seasonal_base_temperature(month: u32) -> f64 {
    match month {
        1 => -2.0,
        2 => 1.0,
        3 => 8.0,
        4 => 14.0,
        5 => 20.0,
        6 => 26.0,
        7 => 30.0,
        8 => 28.0,
        9 => 22.0,
        10 => 14.0,
        11 => 6.0,
        12 => 0.0,
        _ => 20.0,
    }
}

/// Short human-readable summary of conditions
pub fn weather_description(temp: f64, clouds: f64, rain: f64) -> &'static str {
    if rain > 5.0 {
        "Heavy rain"
    } else if rain > 1.0 {
        "Light rain"
    } else if clouds > 80.0 {
        "Overcast"
    } else if clouds > 50.0 {
        "Partly cloudy"
    } else if temp > 35.0 {
        "Hot and clear"
    } else if temp < 0.0 {
        "Cold and clear"
    } else {
        "Clear sky"
    }
}

/// Weather-only agronomic alerts (independent of vegetation state)
pub fn agricultural_alerts(temp: f64, humidity: f64, soil_moisture: f64, wind: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if soil_moisture < 0.15 {
        alerts.push(ag_alert(
            AlertSeverity::Critical,
            "irrigation",
            5,
            "Soil Moisture Deficit",
            "Critical soil moisture deficit, immediate irrigation recommended".to_string(),
        ));
    } else if soil_moisture < 0.25 {
        alerts.push(ag_alert(
            AlertSeverity::Warning,
            "irrigation",
            3,
            "Low Soil Moisture",
            "Low soil moisture, schedule irrigation within 24 hours".to_string(),
        ));
    }

    if temp < 2.0 {
        alerts.push(ag_alert(
            AlertSeverity::Critical,
            "frost",
            5,
            "Frost Risk",
            format!("Frost risk, temperature at {:.1}°C", temp),
        ));
    }

    if humidity > 85.0 && temp > 15.0 {
        alerts.push(ag_alert(
            AlertSeverity::Warning,
            "disease",
            3,
            "Fungal Disease Risk",
            "High humidity may promote fungal disease, monitor closely".to_string(),
        ));
    }

    if wind > 10.0 {
        alerts.push(ag_alert(
            AlertSeverity::Warning,
            "spray",
            2,
            "Spraying Not Advised",
            format!("Wind speed {:.1} m/s, unsuitable for pesticide application", wind),
        ));
    }

    if alerts.is_empty() {
        alerts.push(ag_alert(
            AlertSeverity::Info,
            "general",
            0,
            "Favorable Conditions",
            "Conditions favorable for crop growth".to_string(),
        ));
    }

    alerts
}

fn ag_alert(
    severity: AlertSeverity,
    category: &str,
    score: u8,
    title: &str,
    message: String,
) -> Alert {
    Alert {
        severity,
        title: title.to_string(),
        message,
        icon: None,
        category: Some(category.to_string()),
        score: Some(score),
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
