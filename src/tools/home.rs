//! Home tools
//!
//! Thin HTTP wrappers over a home-automation bridge. Each tool maps one
//! capability (lights, climate, media devices, calendar, weather, web
//! search, appliances) onto a bridge endpoint; no vendor protocol lives
//! in this crate. All tools share one `HomeClient` and keep their own
//! per-call timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::tools::Tool;
use crate::{Error, Result};

/// Deadline for a single bridge request
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(8);

/// Shared HTTP client for the home-automation bridge
pub struct HomeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HomeClient {
    /// Create a client for the bridge at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::Config("home bridge URL required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(BRIDGE_TIMEOUT)
            .build()
            .map_err(|e| Error::Tool(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("bridge request failed: {e}")))?;

        Self::decode(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("bridge request failed: {e}")))?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!("bridge error {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("bridge returned invalid JSON: {e}")))
    }
}

/// Music/playback transport shared by the fast path and the agent
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn play(&self, query: &str) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn skip(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
}

/// Transport used when no bridge is configured; every call fails
pub struct OfflineMedia;

#[async_trait]
impl MediaTransport for OfflineMedia {
    async fn play(&self, _query: &str) -> Result<()> {
        Err(Error::Tool("no media endpoint configured".to_string()))
    }

    async fn pause(&self) -> Result<()> {
        Err(Error::Tool("no media endpoint configured".to_string()))
    }

    async fn stop(&self) -> Result<()> {
        Err(Error::Tool("no media endpoint configured".to_string()))
    }

    async fn skip(&self) -> Result<()> {
        Err(Error::Tool("no media endpoint configured".to_string()))
    }

    async fn resume(&self) -> Result<()> {
        Err(Error::Tool("no media endpoint configured".to_string()))
    }
}

/// Media transport over the bridge's `/media` endpoints
pub struct BridgeMedia {
    client: Arc<HomeClient>,
}

impl BridgeMedia {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaTransport for BridgeMedia {
    async fn play(&self, query: &str) -> Result<()> {
        self.client
            .post("/media/play", &json!({ "query": query }))
            .await?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.client.post("/media/pause", &json!({})).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.client.post("/media/stop", &json!({})).await?;
        Ok(())
    }

    async fn skip(&self) -> Result<()> {
        self.client.post("/media/skip", &json!({})).await?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.client.post("/media/resume", &json!({})).await?;
        Ok(())
    }
}

/// Read a zone's current temperature
pub struct GetTemperature {
    client: Arc<HomeClient>,
}

impl GetTemperature {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetTemperature {
    fn name(&self) -> &str {
        "get_temperature"
    }

    fn description(&self) -> &str {
        "Get the current temperature of a room or zone in the house"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "zone": {
                    "type": "string",
                    "description": "Room or zone name, e.g. 'living room'"
                }
            },
            "required": ["zone"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let zone = str_arg(&args, "zone");
        self.client
            .get(&format!("/climate/{}", encode(zone)))
            .await
    }
}

/// Set a zone's target temperature
pub struct SetTemperature {
    client: Arc<HomeClient>,
}

impl SetTemperature {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SetTemperature {
    fn name(&self) -> &str {
        "set_temperature"
    }

    fn description(&self) -> &str {
        "Set the target temperature of a room or zone in degrees Celsius"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "zone": {
                    "type": "string",
                    "description": "Room or zone name"
                },
                "degrees": {
                    "type": "number",
                    "description": "Target temperature in Celsius"
                }
            },
            "required": ["zone", "degrees"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let zone = str_arg(&args, "zone");
        self.client
            .post(
                &format!("/climate/{}", encode(zone)),
                &json!({ "target": args["degrees"] }),
            )
            .await
    }
}

/// Turn lights on or off, or apply a scene
pub struct ControlLights {
    client: Arc<HomeClient>,
}

impl ControlLights {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ControlLights {
    fn name(&self) -> &str {
        "control_lights"
    }

    fn description(&self) -> &str {
        "Turn the lights in a room on or off, or apply a named scene"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "room": {
                    "type": "string",
                    "description": "Room name, or 'all' for the whole house"
                },
                "action": {
                    "type": "string",
                    "enum": ["on", "off", "scene"]
                },
                "scene": {
                    "type": "string",
                    "description": "Scene name, required when action is 'scene'"
                }
            },
            "required": ["room", "action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let action = str_arg(&args, "action");
        if action == "scene" && args.get("scene").and_then(Value::as_str).is_none() {
            return Err(Error::InvalidToolCall {
                tool: self.name().to_string(),
                reason: "action 'scene' requires a scene name".to_string(),
            });
        }

        self.client
            .post(
                "/lights",
                &json!({
                    "room": args["room"],
                    "action": args["action"],
                    "scene": args.get("scene"),
                }),
            )
            .await
    }
}

/// Today's (or a given day's) calendar events
pub struct GetCalendarEvents {
    client: Arc<HomeClient>,
}

impl GetCalendarEvents {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetCalendarEvents {
    fn name(&self) -> &str {
        "get_calendar_events"
    }

    fn description(&self) -> &str {
        "List calendar events for a day (defaults to today)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "description": "ISO date (YYYY-MM-DD); omit for today"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let date = args
            .get("date")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        self.client.get(&format!("/calendar?date={date}")).await
    }
}

/// Current weather for a location
pub struct GetWeather {
    client: Arc<HomeClient>,
}

impl GetWeather {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetWeather {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather and short forecast for a location"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or suburb; omit for the home location"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let path = match args.get("location").and_then(Value::as_str) {
            Some(location) if !location.is_empty() => {
                format!("/weather?location={}", encode(location))
            }
            _ => "/weather".to_string(),
        };
        self.client.get(&path).await
    }
}

/// Web search via the configured search endpoint
pub struct SearchWeb {
    client: reqwest::Client,
    search_url: String,
}

impl SearchWeb {
    /// # Errors
    ///
    /// Returns error if the search URL is empty.
    pub fn new(search_url: &str) -> Result<Self> {
        if search_url.is_empty() {
            return Err(Error::Config("web search URL required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(12))
            .build()
            .map_err(|e| Error::Tool(e.to_string()))?;

        Ok(Self {
            client,
            search_url: search_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Tool for SearchWeb {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web and return the top result snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        15
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = str_arg(&args, "query");
        let url = format!("{}/search?q={}&format=json", self.search_url, encode(query));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tool(format!("search error {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("search returned invalid JSON: {e}")))?;

        // Keep only the top snippets; the full result set would swamp
        // the conversation transcript.
        let snippets: Vec<Value> = body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(3)
                    .map(|r| {
                        json!({
                            "title": r.get("title"),
                            "content": r.get("content"),
                            "url": r.get("url"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "results": snippets }))
    }
}

/// TV power, input, and volume
pub struct ControlTv {
    client: Arc<HomeClient>,
}

impl ControlTv {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ControlTv {
    fn name(&self) -> &str {
        "control_tv"
    }

    fn description(&self) -> &str {
        "Control the TV: power on/off, switch input, or set volume"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["power_on", "power_off", "set_input", "set_volume"]
                },
                "input": {
                    "type": "string",
                    "description": "Input name, e.g. 'hdmi1', for set_input"
                },
                "volume": {
                    "type": "integer",
                    "description": "Volume level 0-100, for set_volume"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        self.client
            .post(
                "/tv",
                &json!({
                    "action": args["action"],
                    "input": args.get("input"),
                    "volume": args.get("volume"),
                }),
            )
            .await
    }
}

/// AV receiver power, input, volume, and mute
pub struct ControlReceiver {
    client: Arc<HomeClient>,
}

impl ControlReceiver {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ControlReceiver {
    fn name(&self) -> &str {
        "control_receiver"
    }

    fn description(&self) -> &str {
        "Control the AV receiver: power, input, volume, or mute"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["power_on", "power_off", "set_input", "set_volume", "mute", "unmute"]
                },
                "input": {
                    "type": "string",
                    "description": "Input name, e.g. 'bd' or 'hdmi2', for set_input"
                },
                "volume": {
                    "type": "integer",
                    "description": "Volume level 0-100, for set_volume"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        self.client
            .post(
                "/receiver",
                &json!({
                    "action": args["action"],
                    "input": args.get("input"),
                    "volume": args.get("volume"),
                }),
            )
            .await
    }
}

/// Status of a smart appliance (dishwasher, washer, ...)
pub struct GetApplianceStatus {
    client: Arc<HomeClient>,
}

impl GetApplianceStatus {
    #[must_use]
    pub fn new(client: Arc<HomeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetApplianceStatus {
    fn name(&self) -> &str {
        "get_appliance_status"
    }

    fn description(&self) -> &str {
        "Get the current status and remaining cycle time of a smart appliance"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "appliance": {
                    "type": "string",
                    "description": "Appliance name, e.g. 'dishwasher'"
                }
            },
            "required": ["appliance"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let appliance = str_arg(&args, "appliance");
        self.client
            .get(&format!("/appliances/{}", encode(appliance)))
            .await
    }
}

/// Play or control music (agent-side entry to the media transport)
pub struct ControlMedia {
    transport: Arc<dyn MediaTransport>,
}

impl ControlMedia {
    #[must_use]
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Tool for ControlMedia {
    fn name(&self) -> &str {
        "control_media"
    }

    fn description(&self) -> &str {
        "Play music matching a query, or pause/stop/skip/resume playback"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["play", "pause", "stop", "skip", "resume"]
                },
                "query": {
                    "type": "string",
                    "description": "What to play, required when action is 'play'"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let action = str_arg(&args, "action");
        match action {
            "play" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                if query.is_empty() {
                    return Err(Error::InvalidToolCall {
                        tool: self.name().to_string(),
                        reason: "action 'play' requires a query".to_string(),
                    });
                }
                self.transport.play(query).await?;
            }
            "pause" => self.transport.pause().await?,
            "stop" => self.transport.stop().await?,
            "skip" => self.transport.skip().await?,
            "resume" => self.transport.resume().await?,
            other => {
                return Err(Error::InvalidToolCall {
                    tool: self.name().to_string(),
                    reason: format!("unknown action '{other}'"),
                });
            }
        }

        Ok(json!({ "status": "ok", "action": action }))
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Percent-encode a path/query segment (spaces and reserved characters)
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_path_segments() {
        assert_eq!(encode("living room"), "living%20room");
        assert_eq!(encode("hdmi1"), "hdmi1");
        assert_eq!(encode("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn empty_bridge_url_rejected() {
        assert!(HomeClient::new("").is_err());
        assert!(SearchWeb::new("").is_err());
    }

    #[test]
    fn bridge_url_trailing_slash_trimmed() {
        let client = HomeClient::new("http://bridge.local/").unwrap();
        assert_eq!(client.base_url, "http://bridge.local");
    }
}
