//! Weather lookup tool: deterministic conditions derived from the location name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolOutput};

const CONDITIONS: [&str; 6] = [
    "Clear skies",
    "Partly cloudy",
    "Overcast",
    "Light rain",
    "Thunderstorms",
    "Snow",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Deserialize)]
struct WeatherInput {
    location: String,
    #[serde(default)]
    units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub location: String,
    pub temperature: f64,
    pub units: Units,
    pub conditions: String,
    pub humidity: u32,
}

impl Forecast {
    fn for_location(location: &str, units: Units) -> Self {
        let seed = location
            .to_lowercase()
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));

        let celsius = f64::from(seed % 40) - 5.0;
        let temperature = match units {
            Units::Metric => celsius,
            Units::Imperial => celsius * 9.0 / 5.0 + 32.0,
        };

        Self {
            location: location.to_string(),
            temperature: (temperature * 10.0).round() / 10.0,
            units,
            conditions: CONDITIONS[(seed as usize / 7) % CONDITIONS.len()].to_string(),
            humidity: 30 + seed % 60,
        }
    }
}

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up current weather for a location. Returns temperature, conditions, and humidity."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)"
                }
            },
            "required": ["location"]
        })
    }

    async fn run(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input: WeatherInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let forecast = Forecast::for_location(&input.location, input.units);
        let data = serde_json::to_value(&forecast).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        Ok(ToolOutput::json(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_deterministic() {
        let a = WeatherLookupTool
            .run(serde_json::json!({"location": "Prague"}))
            .await
            .unwrap();
        let b = WeatherLookupTool
            .run(serde_json::json!({"location": "prague"}))
            .await
            .unwrap();
        assert_eq!(a.data.unwrap()["temperature"], b.data.unwrap()["temperature"]);
    }

    #[tokio::test]
    async fn imperial_conversion() {
        let metric = Forecast::for_location("Oslo", Units::Metric);
        let imperial = Forecast::for_location("Oslo", Units::Imperial);
        let expected = ((metric.temperature * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0;
        assert!((imperial.temperature - expected).abs() < 0.11);
    }

    #[tokio::test]
    async fn unknown_units_rejected() {
        let err = WeatherLookupTool
            .run(serde_json::json!({"location": "Oslo", "units": "kelvin"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn schema_requires_location() {
        assert_eq!(WeatherLookupTool.input_schema()["required"][0], "location");
    }
}
