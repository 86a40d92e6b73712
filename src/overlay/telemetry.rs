//! Telemetry source
//!
//! Pull-based accessors over a mavlink2rest-style HTTP bridge. Every accessor
//! performs one bounded-time fetch and one transform, and degrades to a
//! default value on any transport or parse failure. Telemetry is best-effort
//! decoration; it must never stall or fail a recording.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw PWM range of the lights output channel
const LIGHTS_PWM_MIN: f64 = 1100.0;
const LIGHTS_PWM_MAX: f64 = 1900.0;

/// SCALED_PRESSURE2 reports centi-degrees Celsius
const TEMPERATURE_SCALE: f64 = 100.0;

/// Telemetry bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    /// mavlink2rest base URL
    pub base_url: String,
    /// Per-request timeout; must stay well under the overlay tick period
    pub timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:6040/v1/mavlink".to_string(),
            timeout_ms: 300,
        }
    }
}

/// One fully-populated telemetry snapshot; failed channels read as zero
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    /// Meters below the surface
    pub depth: f64,
    /// Meters per second, positive = ascending
    pub climb_rate: f64,
    /// Water temperature in degrees Celsius
    pub temperature: f64,
    /// Lights output, 0-100
    pub lights_percent: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Accessors over the external telemetry provider
pub struct TelemetrySource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TelemetrySource {
    pub fn new(config: &TelemetryConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("falling back to default HTTP client: {e}");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Depth in meters: negative altitude means submerged, anything at or
    /// above the surface reads as zero.
    pub async fn depth(&self) -> f64 {
        self.field("VFR_HUD", "alt")
            .await
            .map(depth_from_altitude)
            .unwrap_or_else(|e| default_channel("depth", &e))
    }

    /// Climb rate in m/s, passed through as reported.
    pub async fn climb_rate(&self) -> f64 {
        self.field("VFR_HUD", "climb")
            .await
            .unwrap_or_else(|e| default_channel("climb rate", &e))
    }

    /// Water temperature in degrees Celsius from the external pressure sensor.
    pub async fn water_temperature(&self) -> f64 {
        self.field("SCALED_PRESSURE2", "temperature")
            .await
            .map(|raw| raw / TEMPERATURE_SCALE)
            .unwrap_or_else(|e| default_channel("water temperature", &e))
    }

    /// Lights output remapped from its PWM operating range to 0-100.
    pub async fn lights_percent(&self) -> f64 {
        self.field("SERVO_OUTPUT_RAW", "servo9_raw")
            .await
            .map(percent_from_pwm)
            .unwrap_or_else(|e| default_channel("lights", &e))
    }

    /// Fetch every channel concurrently; the result is always fully populated.
    pub async fn sample(&self) -> TelemetrySample {
        let (depth, climb_rate, temperature, lights_percent) = tokio::join!(
            self.depth(),
            self.climb_rate(),
            self.water_temperature(),
            self.lights_percent()
        );
        TelemetrySample {
            depth,
            climb_rate,
            temperature,
            lights_percent,
            sampled_at: Utc::now(),
        }
    }

    async fn field(&self, message: &str, field: &str) -> Result<f64> {
        let url = format!(
            "{}/vehicles/1/components/1/messages/{message}",
            self.base_url
        );
        let doc: serde_json::Value = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("fetching {message}"))?
            .error_for_status()
            .with_context(|| format!("fetching {message}"))?
            .json()
            .await
            .with_context(|| format!("decoding {message}"))?;

        doc.get("message")
            .and_then(|m| m.get(field))
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| anyhow!("{message}.{field} missing or not numeric"))
    }
}

fn default_channel(channel: &str, error: &anyhow::Error) -> f64 {
    tracing::debug!(%channel, "telemetry unavailable, using default: {error:#}");
    0.0
}

fn depth_from_altitude(altitude: f64) -> f64 {
    (-altitude).max(0.0)
}

fn percent_from_pwm(pwm: f64) -> f64 {
    ((pwm - LIGHTS_PWM_MIN) / (LIGHTS_PWM_MAX - LIGHTS_PWM_MIN) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_negated_altitude_floored_at_surface() {
        assert_eq!(depth_from_altitude(-12.5), 12.5);
        assert_eq!(depth_from_altitude(0.0), 0.0);
        assert_eq!(depth_from_altitude(3.2), 0.0);
    }

    #[test]
    fn lights_percent_remaps_and_clamps() {
        assert_eq!(percent_from_pwm(1100.0), 0.0);
        assert_eq!(percent_from_pwm(1500.0), 50.0);
        assert_eq!(percent_from_pwm(1900.0), 100.0);
        assert_eq!(percent_from_pwm(900.0), 0.0);
        assert_eq!(percent_from_pwm(2100.0), 100.0);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let source = TelemetrySource::new(&TelemetryConfig {
            base_url: "http://127.0.0.1:6040/v1/mavlink/".to_string(),
            ..TelemetryConfig::default()
        });
        assert_eq!(source.base_url, "http://127.0.0.1:6040/v1/mavlink");
    }
}
