/// Platform seam: everything the device needs from the board
///
/// The device logic never touches a peripheral directly. Each board (the ESP32
/// firmware, the host simulation) names its concrete drivers once through
/// [`Platform`] and hands them over in a [`Hardware`] bundle.
use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady};
use rand::RngCore;

use crate::clock::Clock;

/// WiFi station interface
pub trait WifiStation {
    type Error: fmt::Debug;

    /// Start associating with the access point, returns without waiting
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error>;

    /// Current link status as reported by the WiFi stack
    fn is_connected(&self) -> bool;

    fn disconnect(&mut self) -> Result<(), Self::Error>;
}

/// Response to a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal synchronous HTTP client
///
/// `Err` means the exchange never completed (DNS, connect, timeout). Any
/// status the server sent back, including 4xx/5xx, is an `Ok`.
pub trait HttpTransport {
    type Error: fmt::Debug;

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, Self::Error>;
}

/// Concrete driver types for one board
pub trait Platform {
    /// UART the GPS module is attached to
    type Serial: Read + ReadReady;
    type Wifi: WifiStation;
    type Http: HttpTransport;
    type LedPin: OutputPin;
    type Clock: Clock;
    /// Blocking delay, cloned into every component that waits
    type Delay: DelayNs + Clone;
    /// Randomness for the simulated RFID reader
    type Rng: RngCore;
}

/// Initialized drivers handed to [`crate::TrackingDevice::new`]
pub struct Hardware<P: Platform> {
    pub gps_serial: P::Serial,
    pub wifi: P::Wifi,
    pub http: P::Http,
    pub led_pin: P::LedPin,
    pub clock: P::Clock,
    pub delay: P::Delay,
    pub rng: P::Rng,
}
