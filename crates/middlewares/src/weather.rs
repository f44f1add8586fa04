//! Weather interceptor — deterministic handler, tool injector, and
//! executor in one.
//!
//! A template match on `before_llm_request` answers directly from
//! Open-Meteo; otherwise the `get_weather` tool spec is injected so the
//! model can ask for it, and matching tool calls are executed on
//! `after_llm_response`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName};
use relay_core::middleware::Middleware;
use relay_core::params::ToolSpec;

use crate::nlu::Engine;

const DEFAULT_LOCATION: &str = "Berlin";

/// Register the weather utterance templates on the shared engine.
pub fn register_intents(engine: &Engine) {
    engine.register_intent(
        "get_weather",
        &[
            "weather in {location}",
            "what is the weather in {location}",
            "forecast for {location}",
            "temperature in {location}",
        ],
    );
}

fn weather_tool() -> ToolSpec {
    ToolSpec {
        name: "get_weather".into(),
        description: "Get the current weather for a specific location.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and country, e.g., San Francisco, CA"
                }
            },
            "required": ["location"]
        }),
    }
}

/// Handles weather requests end to end.
pub struct Weather {
    engine: Arc<Engine>,
    client: reqwest::Client,
}

impl Weather {
    pub fn new(engine: Arc<Engine>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { engine, client }
    }

    async fn handle_weather(&self, location: &str) -> Result<Decision, MiddlewareError> {
        let location = if location.is_empty() {
            DEFAULT_LOCATION
        } else {
            location
        };

        // 1. Geocode the location
        let geo_url = format!(
            "https://geocoding-api.open-meteo.com/v1/search?name={}&count=1&language=en&format=json",
            urlencode(location)
        );
        let geo: GeoResponse = self
            .client
            .get(&geo_url)
            .send()
            .await
            .map_err(|e| MiddlewareError::execution("weather", format!("geocoding error: {e}")))?
            .json()
            .await
            .map_err(|e| {
                MiddlewareError::execution("weather", format!("geocoding decode error: {e}"))
            })?;

        let Some(place) = geo.results.first() else {
            return Ok(Decision::cancel_with(
                format!("Could not find location: {location}"),
                "weather: location not found",
            ));
        };

        // 2. Fetch the current weather
        let weather_url = format!(
            "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}&current_weather=true",
            place.latitude, place.longitude
        );
        let weather: ForecastResponse = self
            .client
            .get(&weather_url)
            .send()
            .await
            .map_err(|e| MiddlewareError::execution("weather", format!("weather api error: {e}")))?
            .json()
            .await
            .map_err(|e| {
                MiddlewareError::execution("weather", format!("weather decode error: {e}"))
            })?;

        let current = weather.current_weather;
        let condition = describe_weather_code(current.weathercode);

        let response = serde_json::json!({
            "location": place.name,
            "condition": condition,
            "temperature": current.temperature,
            "unit": "°C",
            "wind_speed": current.windspeed,
            "message": format!(
                "The current weather in {} is {} with {:.1}°C and wind speed of {:.1} km/h.",
                place.name, condition, current.temperature, current.windspeed
            ),
        });

        debug!(location = %place.name, "Answered weather request locally");
        Ok(Decision::cancel_with(
            response.to_string(),
            "weather: fetched live data from Open-Meteo",
        ))
    }
}

#[async_trait]
impl Middleware for Weather {
    fn id(&self) -> &str {
        "weather"
    }

    fn priority(&self) -> i32 {
        110
    }

    fn should_load(&self, event: &Event) -> bool {
        match event.name {
            EventName::BeforeLlmRequest => true,
            EventName::AfterLlmResponse => event
                .context
                .tool_calls()
                .iter()
                .any(|tc| tc.tool == "get_weather"),
            EventName::BeforeUserReply => false,
        }
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        match event.name {
            EventName::BeforeLlmRequest => {
                let result = self.engine.parse(&event.user_text);
                if result.intent == "get_weather" {
                    let location = result.slots.get("location").cloned().unwrap_or_default();
                    return self.handle_weather(location.trim()).await;
                }

                // No template match — offer the tool and let the model decide
                let mut params = event.params.clone();
                params.upsert_tool(weather_tool());
                Ok(Decision::override_params(
                    params,
                    "weather: injected tool schema",
                ))
            }
            EventName::AfterLlmResponse => {
                for call in event.context.tool_calls() {
                    if call.tool == "get_weather" {
                        let location = call.str_arg("location").to_string();
                        return self.handle_weather(location.trim()).await;
                    }
                }
                Ok(Decision::pass())
            }
            EventName::BeforeUserReply => Ok(Decision::pass()),
        }
    }
}

fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1..=3 => "Partly cloudy",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        61 | 63 | 65 => "Rain",
        71 | 73 | 75 => "Snow",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}

/// Percent-encode a query component.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// --- Open-Meteo wire types ---

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    results: Vec<GeoResult>,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    latitude: f64,
    longitude: f64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::event::{EventContext, ToolInvocation};

    fn weather() -> Weather {
        let engine = Arc::new(Engine::new());
        register_intents(&engine);
        Weather::new(engine)
    }

    #[tokio::test]
    async fn non_weather_input_gets_the_tool_injected() {
        let mw = weather();
        let mut event = Event::before_request("summarize this repo", EventContext::new());
        let decision = mw.on_event(&mut event).await.unwrap();

        assert!(!decision.cancel);
        let params = decision.override_params.unwrap();
        assert!(params.has_tool("get_weather"));
    }

    #[tokio::test]
    async fn existing_tool_is_not_duplicated() {
        let mw = weather();
        let mut event = Event::before_request("anything", EventContext::new());
        event.params.upsert_tool(weather_tool());
        let decision = mw.on_event(&mut event).await.unwrap();
        let params = decision.override_params.unwrap();
        assert_eq!(
            params.tools.iter().filter(|t| t.name == "get_weather").count(),
            1
        );
    }

    #[test]
    fn should_load_on_after_response_needs_a_weather_call() {
        let mw = weather();

        let event = Event::after_response("", "", EventContext::new());
        assert!(!mw.should_load(&event));

        let mut ctx = EventContext::new();
        ctx.set_tool_calls(vec![ToolInvocation {
            tool: "get_weather".into(),
            args: serde_json::Map::new(),
        }]);
        let event = Event::after_response("", "", ctx);
        assert!(mw.should_load(&event));
    }

    #[test]
    fn weather_codes_map_to_conditions() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(2), "Partly cloudy");
        assert_eq!(describe_weather_code(63), "Rain");
        assert_eq!(describe_weather_code(99), "Thunderstorm");
        assert_eq!(describe_weather_code(42), "Unknown");
    }

    #[test]
    fn urlencode_handles_spaces_and_unicode() {
        assert_eq!(urlencode("San Francisco, CA"), "San%20Francisco%2C%20CA");
        assert_eq!(urlencode("São Paulo"), "S%C3%A3o%20Paulo");
    }

    #[test]
    fn geo_response_parsing() {
        let data = r#"{"results":[{"latitude":52.52,"longitude":13.41,"name":"Berlin"}]}"#;
        let parsed: GeoResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.results[0].name, "Berlin");

        let empty: GeoResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.results.is_empty());
    }

    #[test]
    fn forecast_response_parsing() {
        let data = r#"{"current_weather":{"temperature":21.5,"windspeed":9.3,"weathercode":3}}"#;
        let parsed: ForecastResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.current_weather.weathercode, 3);
    }
}
