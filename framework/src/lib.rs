//! Modest IoT tracking framework
//!
//! Device logic for a GPS + RFID tracker that reports fixes and tag scans to
//! an HTTP backend over WiFi. Nothing in this crate touches a peripheral
//! directly: boards plug in through the [`platform::Platform`] seam, so the
//! same device runs on the ESP32 firmware and on the host simulation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  TrackingDevice (composition, poll loop)    │
//! ├──────────────┬──────────────┬───────────────┤
//! │  GpsSensor   │  RfidSensor  │  Led          │
//! │  (NMEA/UART) │  (simulated) │  (actuator)   │
//! ├──────────────┴──────────────┴───────────────┤
//! │  CommunicationHandler (WiFi + HTTP JSON)    │
//! ├─────────────────────────────────────────────┤
//! │  Platform seam (serial, wifi, http, clock)  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Sensors raise [`Event`]s, components obey [`Command`]s. Each
//! [`TrackingDevice::update`] tick polls both sensors into a queue,
//! dispatches the queued events, then checks the WiFi link.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use modest_iot::sim::SimBench;
//! use modest_iot::{NetworkConfig, TrackerConfig, TrackingDevice};
//!
//! let config = TrackerConfig::new(NetworkConfig {
//!     wifi_ssid: "Wokwi-GUEST".into(),
//!     wifi_password: String::new(),
//!     tracking_endpoint: "https://example.com/api/v1/tracking".into(),
//!     rfid_endpoint: "https://example.com/api/v1/rfid".into(),
//!     device_id: "tracker-001".into(),
//! });
//!
//! let bench = SimBench::new(1_742_733_300, 42);
//! let mut device = TrackingDevice::new(&config, bench.hardware());
//! device.initialize();
//!
//! loop {
//!     for event in device.update() {
//!         println!("dispatched {:?}", event);
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`dispatch`] - Event/command identifiers and handler traits
//! - [`sensors`] - Polled sensor trait
//! - [`gps`] / [`rfid`] - The two sensors
//! - [`led`] - Status LED
//! - [`comms`] - WiFi link and HTTP uploads
//! - [`tracking`] - The composed device
//! - `sim` - Host simulation platform for tests and demos (`sim` feature, on by default)

pub mod clock;
pub mod comms;
pub mod config;
pub mod dispatch;
pub mod gps;
pub mod led;
pub mod platform;
pub mod rfid;
pub mod sensors;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod tracking;

// Re-export commonly used types
pub use clock::Clock;
pub use comms::{CommsError, CommunicationHandler, SendError};
pub use config::{ConfigError, NetworkConfig, PinConfig, TimingConfig, TrackerConfig};
pub use dispatch::{Command, CommandHandler, Event, EventHandler, EventQueue};
pub use gps::{GpsData, GpsSensor};
pub use led::Led;
pub use platform::{Hardware, HttpResponse, HttpTransport, Platform, WifiStation};
pub use rfid::{RfidData, RfidSensor};
pub use sensors::Sensor;
pub use tracking::{DeviceState, TrackingDevice};
