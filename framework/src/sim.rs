/// Host-side simulation of the tracker board
///
/// Every driver here shares its state through `Rc<RefCell<..>>`, so a test
/// (or the `tracker_sim` example) can keep a handle, hand a clone to the
/// device, then script inputs and inspect what the device did.
use core::cell::RefCell;
use core::convert::Infallible;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_io::{ErrorType, Read, ReadReady};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::clock::Clock;
use crate::platform::{Hardware, HttpResponse, HttpTransport, Platform, WifiStation};

const NANOS_PER_MS: u64 = 1_000_000;

// ============================================================================
// Clock and delay
// ============================================================================

#[derive(Debug, Default)]
struct ClockState {
    now_ns: u64,
    delays_ms: Vec<u32>,
}

/// Manually advanced clock that doubles as the blocking delay
///
/// Delays move time forward, the same way a real blocking wait would.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start_unix: i64,
    state: Rc<RefCell<ClockState>>,
}

impl ManualClock {
    /// Clock at boot (`millis() == 0`) with wall time `start_unix`
    pub fn new(start_unix: i64) -> Self {
        Self {
            start_unix,
            state: Rc::new(RefCell::new(ClockState::default())),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.state.borrow_mut().now_ns += ms * NANOS_PER_MS;
    }

    /// Every `delay_ms` call so far, in order
    pub fn delays(&self) -> Vec<u32> {
        self.state.borrow().delays_ms.clone()
    }

    pub fn clear_delays(&self) {
        self.state.borrow_mut().delays_ms.clear();
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.state.borrow().now_ns / NANOS_PER_MS
    }

    fn unix_time(&self) -> i64 {
        self.start_unix + (self.millis() / 1000) as i64
    }
}

impl DelayNs for ManualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().now_ns += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        let mut state = self.state.borrow_mut();
        state.delays_ms.push(ms);
        state.now_ns += u64::from(ms) * NANOS_PER_MS;
    }
}

// ============================================================================
// GPS UART
// ============================================================================

/// UART receive buffer filled by the test
#[derive(Debug, Clone, Default)]
pub struct ScriptedSerial {
    rx: Rc<RefCell<VecDeque<u8>>>,
}

impl ScriptedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes.iter().copied());
    }

    pub fn push_str(&self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    /// Bytes not yet read by the device
    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }
}

impl ErrorType for ScriptedSerial {
    type Error = Infallible;
}

impl Read for ScriptedSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut rx = self.rx.borrow_mut();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ReadReady for ScriptedSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.borrow().is_empty())
    }
}

/// Checksummed `$GPRMC` sentence with an active fix at `lat`, `lon`
///
/// UTC time and date are fixed at 12:35:19 on 23 March 2025.
pub fn rmc_sentence(lat: f64, lon: f64) -> String {
    let body = format!(
        "GPRMC,123519,A,{},{},0.0,0.0,230325,,,A",
        nmea_coordinate(lat, 2, 'N', 'S'),
        nmea_coordinate(lon, 3, 'E', 'W'),
    );
    format!("${}*{:02X}\r\n", body, neo6m::checksum(body.as_bytes()))
}

fn nmea_coordinate(value: f64, degree_digits: usize, positive: char, negative: char) -> String {
    let hemisphere = if value < 0.0 { negative } else { positive };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    format!(
        "{:0width$}{:07.4},{}",
        degrees as u32,
        minutes,
        hemisphere,
        width = degree_digits
    )
}

// ============================================================================
// WiFi
// ============================================================================

#[derive(Debug, Default)]
struct WifiState {
    reachable: bool,
    /// Status polls after `begin` before the link comes up
    connect_after_polls: u32,
    associating: bool,
    polls_since_begin: u32,
    linked: bool,
    begins: u32,
    disconnects: u32,
    /// Reason the next `begin` calls are refused
    begin_error: Option<String>,
}

/// `begin` refusal reported by [`SimWifi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWifiError(pub String);

/// WiFi station with a scriptable access point
#[derive(Debug, Clone)]
pub struct SimWifi {
    state: Rc<RefCell<WifiState>>,
}

impl SimWifi {
    /// Access point in range, link comes up on the first status poll
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(WifiState {
                reachable: true,
                ..WifiState::default()
            })),
        }
    }

    /// Access point never answers
    pub fn unreachable() -> Self {
        let wifi = Self::new();
        wifi.set_reachable(false);
        wifi
    }

    /// An unreachable access point also drops any current link
    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.borrow_mut();
        state.reachable = reachable;
        if !reachable {
            state.linked = false;
        }
    }

    pub fn set_connect_after_polls(&self, polls: u32) {
        self.state.borrow_mut().connect_after_polls = polls;
    }

    /// Lose the link without the station being told
    pub fn drop_link(&self) {
        let mut state = self.state.borrow_mut();
        state.linked = false;
        state.associating = false;
    }

    pub fn begin_calls(&self) -> u32 {
        self.state.borrow().begins
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.borrow().disconnects
    }

    /// Refuse every following `begin`, e.g. credentials the driver rejects
    pub fn fail_begin_with(&self, reason: &str) {
        self.state.borrow_mut().begin_error = Some(reason.to_string());
    }
}

impl Default for SimWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiStation for SimWifi {
    type Error = SimWifiError;

    fn begin(&mut self, _ssid: &str, _password: &str) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.begins += 1;
        if let Some(reason) = &state.begin_error {
            return Err(SimWifiError(reason.clone()));
        }
        state.associating = true;
        state.polls_since_begin = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.linked && state.associating && state.reachable {
            if state.polls_since_begin >= state.connect_after_polls {
                state.linked = true;
                state.associating = false;
            } else {
                state.polls_since_begin += 1;
            }
        }
        state.linked
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.disconnects += 1;
        state.linked = false;
        state.associating = false;
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// One POST as the server saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PostRecord {
    /// Body parsed as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Status(u16),
    Fail(String),
}

#[derive(Debug)]
struct HttpState {
    posts: Vec<PostRecord>,
    outcome: Outcome,
}

/// Transport failure reported by [`RecordingHttp`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimHttpError(pub String);

/// HTTP client that records every request and answers with a fixed outcome
#[derive(Debug, Clone)]
pub struct RecordingHttp {
    state: Rc<RefCell<HttpState>>,
}

impl RecordingHttp {
    /// Answers 200 until told otherwise
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HttpState {
                posts: Vec::new(),
                outcome: Outcome::Status(200),
            })),
        }
    }

    pub fn respond_with(&self, status: u16) {
        self.state.borrow_mut().outcome = Outcome::Status(status);
    }

    /// Fail every following request before a response arrives
    pub fn fail_with(&self, reason: &str) {
        self.state.borrow_mut().outcome = Outcome::Fail(reason.to_string());
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.state.borrow().posts.clone()
    }

    pub fn post_count(&self) -> usize {
        self.state.borrow().posts.len()
    }
}

impl Default for RecordingHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for RecordingHttp {
    type Error = SimHttpError;

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, Self::Error> {
        let mut state = self.state.borrow_mut();
        state.posts.push(PostRecord {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::from_utf8_lossy(body).into_owned(),
        });

        match &state.outcome {
            Outcome::Status(status) => Ok(HttpResponse {
                status: *status,
                body: String::new(),
            }),
            Outcome::Fail(reason) => Err(SimHttpError(reason.clone())),
        }
    }
}

// ============================================================================
// LED
// ============================================================================

/// Output pin that remembers every level written to it
#[derive(Debug, Clone, Default)]
pub struct SimLedPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl SimLedPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level, low before the first write
    pub fn is_lit(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    /// Low-to-high transitions, counting from an initially low pin
    pub fn rising_edges(&self) -> usize {
        let levels = self.levels.borrow();
        let mut previous = false;
        let mut edges = 0;
        for &level in levels.iter() {
            if level && !previous {
                edges += 1;
            }
            previous = level;
        }
        edges
    }

    pub fn writes(&self) -> usize {
        self.levels.borrow().len()
    }
}

impl PinErrorType for SimLedPin {
    type Error = Infallible;
}

impl OutputPin for SimLedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

// ============================================================================
// Board
// ============================================================================

/// Simulated board
pub struct SimPlatform;

impl Platform for SimPlatform {
    type Serial = ScriptedSerial;
    type Wifi = SimWifi;
    type Http = RecordingHttp;
    type LedPin = SimLedPin;
    type Clock = ManualClock;
    type Delay = ManualClock;
    type Rng = SmallRng;
}

/// Handles onto one simulated board
#[derive(Debug, Clone)]
pub struct SimBench {
    pub clock: ManualClock,
    pub serial: ScriptedSerial,
    pub wifi: SimWifi,
    pub http: RecordingHttp,
    pub led: SimLedPin,
    seed: u64,
}

impl SimBench {
    pub fn new(start_unix: i64, seed: u64) -> Self {
        Self {
            clock: ManualClock::new(start_unix),
            serial: ScriptedSerial::new(),
            wifi: SimWifi::new(),
            http: RecordingHttp::new(),
            led: SimLedPin::new(),
            seed,
        }
    }

    /// Drivers for the device, sharing state with this bench
    pub fn hardware(&self) -> Hardware<SimPlatform> {
        Hardware {
            gps_serial: self.serial.clone(),
            wifi: self.wifi.clone(),
            http: self.http.clone(),
            led_pin: self.led.clone(),
            clock: self.clock.clone(),
            delay: self.clock.clone(),
            rng: SmallRng::seed_from_u64(self.seed),
        }
    }
}
