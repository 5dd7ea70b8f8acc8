//! Agent tools: the registry and the home-automation capabilities
//! behind it.

pub mod home;
pub mod registry;

pub use home::{
    BridgeMedia, ControlLights, ControlMedia, ControlReceiver, ControlTv, GetApplianceStatus,
    GetCalendarEvents, GetTemperature, GetWeather, HomeClient, MediaTransport, OfflineMedia,
    SearchWeb, SetTemperature,
};
pub use registry::{Tool, ToolRegistry};
