/// WiFi link management and HTTP upload of sensor snapshots
///
/// GPS fixes go to the tracking endpoint as numbered records, RFID scans go
/// to the RFID endpoint. Every send is gated on the link being up and the
/// snapshot being valid; a failed gate performs no I/O at all.
use core::fmt;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{NetworkConfig, TimingConfig};
use crate::dispatch::{Command, CommandHandler};
use crate::gps::GpsData;
use crate::platform::{HttpTransport, WifiStation};
use crate::rfid::RfidData;

const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// Body posted to the tracking endpoint
#[derive(Debug, Serialize)]
struct GpsRecord<'a> {
    id: u32,
    device_id: &'a str,
    created_at: &'a str,
    latitude: f64,
    longitude: f64,
}

/// Body posted to the RFID endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RfidScan<'a> {
    rfid_code: &'a str,
    scan_type: &'a str,
}

/// Link-level failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommsError {
    /// Still disconnected after every status poll
    WifiTimeout { attempts: u32 },
    /// WiFi driver rejected a request
    Station(String),
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsError::WifiTimeout { attempts } => {
                write!(f, "WiFi not connected after {} attempts", attempts)
            }
            CommsError::Station(e) => write!(f, "WiFi driver error: {}", e),
        }
    }
}

impl std::error::Error for CommsError {}

/// Reasons a snapshot was not delivered
#[derive(Debug)]
pub enum SendError {
    NotConnected,
    InvalidData,
    Serialize(serde_json::Error),
    /// Request never produced a response
    Transport(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotConnected => write!(f, "WiFi not connected"),
            SendError::InvalidData => write!(f, "snapshot is not valid"),
            SendError::Serialize(e) => write!(f, "JSON encoding failed: {}", e),
            SendError::Transport(e) => write!(f, "HTTP request failed: {}", e),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SendError {
    fn from(e: serde_json::Error) -> Self {
        SendError::Serialize(e)
    }
}

pub struct CommunicationHandler<W, H, D> {
    wifi: W,
    http: H,
    delay: D,
    ssid: String,
    password: String,
    tracking_endpoint: String,
    rfid_endpoint: String,
    device_id: String,
    connect_attempts: u32,
    retry_delay_ms: u32,
    connected: bool,
    record_id: u32,
}

impl<W, H, D> CommunicationHandler<W, H, D>
where
    W: WifiStation,
    H: HttpTransport,
    D: DelayNs,
{
    /// Starts disconnected, first GPS record id is 1
    pub fn new(network: &NetworkConfig, timing: &TimingConfig, wifi: W, http: H, delay: D) -> Self {
        Self {
            wifi,
            http,
            delay,
            ssid: network.wifi_ssid.clone(),
            password: network.wifi_password.clone(),
            tracking_endpoint: network.tracking_endpoint.clone(),
            rfid_endpoint: network.rfid_endpoint.clone(),
            device_id: network.device_id.clone(),
            connect_attempts: timing.wifi_connect_attempts,
            retry_delay_ms: timing.wifi_retry_delay_ms,
            connected: false,
            record_id: 1,
        }
    }

    /// Associate with the configured access point, blocking between polls
    pub fn connect_to_wifi(&mut self) -> Result<(), CommsError> {
        info!("Connecting to WiFi SSID '{}'", self.ssid);
        if let Err(e) = self.wifi.begin(&self.ssid, &self.password) {
            warn!("WiFi driver refused to connect: {:?}", e);
            self.connected = false;
            return Err(CommsError::Station(format!("{:?}", e)));
        }

        // Status is polled at most once per delay, the final read decides
        let mut attempts = 0;
        while attempts < self.connect_attempts && !self.wifi.is_connected() {
            self.delay.delay_ms(self.retry_delay_ms);
            attempts += 1;
        }

        self.connected = self.wifi.is_connected();
        if self.connected {
            info!("WiFi connected after {} retries", attempts);
            Ok(())
        } else {
            warn!("WiFi connection failed after {} attempts", attempts);
            Err(CommsError::WifiTimeout { attempts })
        }
    }

    /// Reconnect if the link has dropped
    pub fn check_connection(&mut self) -> Result<(), CommsError> {
        if self.wifi.is_connected() {
            return Ok(());
        }

        warn!("WiFi link lost, reconnecting");
        if let Err(e) = self.wifi.disconnect() {
            debug!("WiFi disconnect failed: {:?}", e);
        }
        self.connected = false;
        self.connect_to_wifi()
    }

    /// Last connect succeeded and the link is still up
    pub fn is_wifi_connected(&self) -> bool {
        self.connected && self.wifi.is_connected()
    }

    /// Id the next GPS record will carry
    pub fn record_id(&self) -> u32 {
        self.record_id
    }

    /// POST a fix to the tracking endpoint, returning the HTTP status
    ///
    /// Consumes a record id once the precondition passes, whatever the
    /// outcome of the request.
    pub fn send_gps_data(&mut self, data: &GpsData) -> Result<u16, SendError> {
        if !self.connected {
            return Err(SendError::NotConnected);
        }
        if !data.is_valid {
            return Err(SendError::InvalidData);
        }

        let id = self.record_id;
        self.record_id = self.record_id.wrapping_add(1);

        let body = serde_json::to_string(&GpsRecord {
            id,
            device_id: &self.device_id,
            created_at: &data.timestamp,
            latitude: data.latitude,
            longitude: data.longitude,
        })?;

        post_json(&mut self.http, &self.tracking_endpoint, &body, "GPS")
    }

    /// POST a scan to the RFID endpoint, returning the HTTP status
    pub fn send_rfid_data(&mut self, data: &RfidData) -> Result<u16, SendError> {
        if !self.connected {
            return Err(SendError::NotConnected);
        }
        if !data.is_valid {
            return Err(SendError::InvalidData);
        }

        let body = serde_json::to_string(&RfidScan {
            rfid_code: &data.rfid_code,
            scan_type: &data.scan_type,
        })?;

        post_json(&mut self.http, &self.rfid_endpoint, &body, "RFID")
    }
}

fn post_json<H: HttpTransport>(
    http: &mut H,
    url: &str,
    body: &str,
    label: &str,
) -> Result<u16, SendError> {
    let response = http
        .post(url, &JSON_HEADERS, body.as_bytes())
        .map_err(|e| SendError::Transport(format!("{:?}", e)))?;

    if response.status == 0 {
        return Err(SendError::Transport("no status code".to_string()));
    }

    if response.status >= 400 {
        warn!("{} upload answered HTTP {}", label, response.status);
    } else {
        info!("{} upload answered HTTP {}", label, response.status);
    }
    debug!("{} response: {}", label, response.body);

    Ok(response.status)
}

impl<W, H, D> CommandHandler for CommunicationHandler<W, H, D>
where
    W: WifiStation,
    H: HttpTransport,
    D: DelayNs,
{
    fn handle(&mut self, command: Command) {
        match command {
            Command::ConnectWifi => {
                if let Err(e) = self.connect_to_wifi() {
                    warn!("{}", e);
                }
            }
            // Sends need a snapshot, which the device supplies
            other => debug!("Communication handler ignores {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::sim::{ManualClock, RecordingHttp, SimWifi, SimWifiError};

    type Handler = CommunicationHandler<SimWifi, RecordingHttp, ManualClock>;

    fn network() -> NetworkConfig {
        NetworkConfig {
            wifi_ssid: "Wokwi-GUEST".to_string(),
            wifi_password: String::new(),
            tracking_endpoint: "https://example.com/api/v1/tracking".to_string(),
            rfid_endpoint: "https://example.com/api/v1/rfid".to_string(),
            device_id: "tracker-001".to_string(),
        }
    }

    fn handler(wifi: &SimWifi) -> (Handler, RecordingHttp, ManualClock) {
        let http = RecordingHttp::new();
        let clock = ManualClock::new(0);
        let comms = CommunicationHandler::new(
            &network(),
            &TimingConfig::default(),
            wifi.clone(),
            http.clone(),
            clock.clone(),
        );
        (comms, http, clock)
    }

    fn connected() -> (Handler, RecordingHttp, ManualClock, SimWifi) {
        let wifi = SimWifi::new();
        let (mut comms, http, clock) = handler(&wifi);
        comms.connect_to_wifi().unwrap();
        (comms, http, clock, wifi)
    }

    fn fix(lat: f64, lon: f64) -> GpsData {
        GpsData {
            latitude: lat,
            longitude: lon,
            is_valid: true,
            timestamp: "2025-03-23T12:35:19Z".to_string(),
        }
    }

    fn scan(code: &str) -> RfidData {
        RfidData {
            rfid_code: code.to_string(),
            scan_type: "ENTRY".to_string(),
            is_valid: true,
        }
    }

    #[test]
    fn test_connect_immediately() {
        let wifi = SimWifi::new();
        let (mut comms, _http, clock) = handler(&wifi);
        assert!(!comms.is_wifi_connected());

        assert_eq!(comms.connect_to_wifi(), Ok(()));
        assert!(comms.is_wifi_connected());
        assert_eq!(wifi.begin_calls(), 1);
        assert!(clock.delays().is_empty());
    }

    #[test]
    fn test_connect_after_retries() {
        let wifi = SimWifi::new();
        wifi.set_connect_after_polls(3);
        let (mut comms, _http, clock) = handler(&wifi);

        assert_eq!(comms.connect_to_wifi(), Ok(()));
        assert_eq!(clock.delays(), vec![500, 500, 500]);
    }

    #[test]
    fn test_connect_gives_up_after_twenty_attempts() {
        let wifi = SimWifi::unreachable();
        let (mut comms, _http, clock) = handler(&wifi);

        assert_eq!(
            comms.connect_to_wifi(),
            Err(CommsError::WifiTimeout { attempts: 20 })
        );
        assert_eq!(clock.delays(), vec![500; 20]);
        assert_eq!(clock.millis(), 10_000);
        assert!(!comms.is_wifi_connected());
    }

    #[test]
    fn test_connect_on_last_allowed_attempt() {
        let wifi = SimWifi::new();
        wifi.set_connect_after_polls(20);
        let (mut comms, _http, clock) = handler(&wifi);

        assert_eq!(comms.connect_to_wifi(), Ok(()));
        assert_eq!(clock.delays(), vec![500; 20]);
        assert!(comms.is_wifi_connected());
    }

    #[test]
    fn test_link_one_poll_too_late_is_a_timeout() {
        let wifi = SimWifi::new();
        wifi.set_connect_after_polls(21);
        let (mut comms, _http, clock) = handler(&wifi);

        assert_eq!(
            comms.connect_to_wifi(),
            Err(CommsError::WifiTimeout { attempts: 20 })
        );
        assert_eq!(clock.delays(), vec![500; 20]);
        assert!(!comms.is_wifi_connected());
    }

    #[test]
    fn test_refused_begin_reports_station_error() {
        let wifi = SimWifi::new();
        wifi.fail_begin_with("invalid ssid");
        let (mut comms, http, clock) = handler(&wifi);

        assert_eq!(
            comms.connect_to_wifi(),
            Err(CommsError::Station(format!(
                "{:?}",
                SimWifiError("invalid ssid".to_string())
            )))
        );
        assert!(clock.delays().is_empty());
        assert!(!comms.is_wifi_connected());
        assert!(matches!(
            comms.send_gps_data(&fix(40.0, -3.0)),
            Err(SendError::NotConnected)
        ));
        assert_eq!(http.post_count(), 0);
    }

    #[test]
    fn test_refused_reconnect_clears_connected_state() {
        let (mut comms, http, _clock, wifi) = connected();
        wifi.fail_begin_with("driver stopped");

        assert!(matches!(
            comms.connect_to_wifi(),
            Err(CommsError::Station(_))
        ));
        assert!(!comms.is_wifi_connected());
        assert!(matches!(
            comms.send_gps_data(&fix(40.0, -3.0)),
            Err(SendError::NotConnected)
        ));
        assert!(matches!(
            comms.send_rfid_data(&scan("RFID001")),
            Err(SendError::NotConnected)
        ));
        assert_eq!(http.post_count(), 0);
        assert_eq!(comms.record_id(), 1);
    }

    #[test]
    fn test_is_connected_tracks_link() {
        let (comms, _http, _clock, wifi) = connected();
        assert!(comms.is_wifi_connected());
        wifi.drop_link();
        assert!(!comms.is_wifi_connected());
    }

    #[test]
    fn test_check_connection_reconnects() {
        let (mut comms, _http, _clock, wifi) = connected();

        assert_eq!(comms.check_connection(), Ok(()));
        assert_eq!(wifi.disconnect_calls(), 0);
        assert_eq!(wifi.begin_calls(), 1);

        wifi.drop_link();
        assert_eq!(comms.check_connection(), Ok(()));
        assert_eq!(wifi.disconnect_calls(), 1);
        assert_eq!(wifi.begin_calls(), 2);
        assert!(comms.is_wifi_connected());
    }

    #[test]
    fn test_check_connection_keeps_failing_while_unreachable() {
        let (mut comms, _http, _clock, wifi) = connected();
        wifi.set_reachable(false);

        for round in 1..=3 {
            assert!(matches!(
                comms.check_connection(),
                Err(CommsError::WifiTimeout { .. })
            ));
            assert_eq!(wifi.disconnect_calls(), round);
        }
        assert!(!comms.is_wifi_connected());
    }

    #[test]
    fn test_gps_record_shape() {
        let (mut comms, http, _clock, _wifi) = connected();

        assert_eq!(comms.send_gps_data(&fix(40.0, -3.0)).unwrap(), 200);

        let posts = http.posts();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.url, "https://example.com/api/v1/tracking");
        assert_eq!(post.header("content-type"), Some("application/json"));
        assert!(post.body.starts_with("{\"id\":1,\"device_id\":\"tracker-001\""));

        let json = post.json();
        assert_eq!(json["id"], 1);
        assert_eq!(json["device_id"], "tracker-001");
        assert_eq!(json["created_at"], "2025-03-23T12:35:19Z");
        assert_eq!(json["latitude"], 40.0);
        assert_eq!(json["longitude"], -3.0);
    }

    #[test]
    fn test_rfid_scan_shape() {
        let (mut comms, http, _clock, _wifi) = connected();

        assert_eq!(comms.send_rfid_data(&scan("XX01X")).unwrap(), 200);

        let posts = http.posts();
        assert_eq!(posts[0].url, "https://example.com/api/v1/rfid");
        assert_eq!(posts[0].body, r#"{"rfidCode":"XX01X","scanType":"ENTRY"}"#);
        assert_eq!(comms.record_id(), 1);
    }

    #[test]
    fn test_invalid_data_does_no_io() {
        let (mut comms, http, _clock, _wifi) = connected();

        let mut gps = fix(40.0, -3.0);
        gps.is_valid = false;
        assert!(matches!(comms.send_gps_data(&gps), Err(SendError::InvalidData)));

        let mut rfid = scan("XX01X");
        rfid.is_valid = false;
        assert!(matches!(comms.send_rfid_data(&rfid), Err(SendError::InvalidData)));

        assert_eq!(http.post_count(), 0);
        assert_eq!(comms.record_id(), 1);
    }

    #[test]
    fn test_disconnected_sends_do_no_io() {
        let wifi = SimWifi::new();
        let (mut comms, http, _clock) = handler(&wifi);

        assert!(matches!(
            comms.send_rfid_data(&scan("XX01X")),
            Err(SendError::NotConnected)
        ));
        assert!(matches!(
            comms.send_gps_data(&fix(40.0, -3.0)),
            Err(SendError::NotConnected)
        ));
        assert_eq!(http.post_count(), 0);
    }

    #[test]
    fn test_record_id_advances_on_failed_posts() {
        let (mut comms, http, _clock, _wifi) = connected();

        comms.send_gps_data(&fix(40.0, -3.0)).unwrap();
        http.fail_with("connection refused");
        assert!(matches!(
            comms.send_gps_data(&fix(40.1, -3.0)),
            Err(SendError::Transport(_))
        ));
        http.respond_with(200);
        comms.send_gps_data(&fix(40.2, -3.0)).unwrap();

        let ids: Vec<_> = http.posts().iter().map(|p| p.json()["id"].clone()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(comms.record_id(), 4);
    }

    #[test]
    fn test_error_status_still_counts_as_sent() {
        let (mut comms, http, _clock, _wifi) = connected();

        http.respond_with(404);
        assert_eq!(comms.send_rfid_data(&scan("YY02Y")).unwrap(), 404);
        http.respond_with(503);
        assert_eq!(comms.send_gps_data(&fix(40.0, -3.0)).unwrap(), 503);
    }

    #[test]
    fn test_zero_status_is_transport_error() {
        let (mut comms, http, _clock, _wifi) = connected();
        http.respond_with(0);
        assert!(matches!(
            comms.send_rfid_data(&scan("ZZ03Z")),
            Err(SendError::Transport(_))
        ));
    }

    #[test]
    fn test_connect_command() {
        let wifi = SimWifi::new();
        let (mut comms, http, _clock) = handler(&wifi);

        comms.handle(Command::SendGpsData);
        assert!(!comms.is_wifi_connected());

        comms.handle(Command::ConnectWifi);
        assert!(comms.is_wifi_connected());
        assert_eq!(http.post_count(), 0);
    }
}
