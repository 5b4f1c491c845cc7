/// Tracking device: one GPS sensor, one simulated RFID reader, one status
/// LED and one communication handler, driven by a single polling loop
///
/// Sensors raise events into a queue during `update()`. The queue is
/// dispatched through [`EventHandler::on`] before the link check, so each
/// event reads the sensor's latest snapshot and a dropped link is only
/// repaired once the tick's events have been handled.
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::clock::{elapsed_ms, Clock};
use crate::comms::{CommunicationHandler, SendError};
use crate::config::TrackerConfig;
use crate::dispatch::{Command, CommandHandler, Event, EventHandler, EventQueue};
use crate::gps::GpsSensor;
use crate::led::Led;
use crate::platform::{Hardware, Platform};
use crate::rfid::RfidSensor;
use crate::sensors::Sensor;

const INIT_BLINKS: usize = 3;
const INIT_BLINK_MS: u32 = 200;
const GPS_BLINK_MS: u32 = 100;
const RFID_BLINKS: usize = 2;
const RFID_BLINK_MS: u32 = 150;

/// Device lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Components built, nothing touched the network yet
    Constructed,
    /// Seed codes registered and first connect attempted
    Initialized,
    /// At least one update tick has run
    Running,
}

pub struct TrackingDevice<P: Platform> {
    gps: GpsSensor<P::Serial>,
    rfid: RfidSensor<P::Rng>,
    comms: CommunicationHandler<P::Wifi, P::Http, P::Delay>,
    led: Led<P::LedPin>,
    clock: P::Clock,
    delay: P::Delay,
    rfid_codes: Vec<String>,
    update_interval_ms: u64,
    last_update_ms: u64,
    state: DeviceState,
}

impl<P: Platform> TrackingDevice<P> {
    pub fn new(config: &TrackerConfig, hardware: Hardware<P>) -> Self {
        let Hardware {
            gps_serial,
            wifi,
            http,
            led_pin,
            clock,
            delay,
            rng,
        } = hardware;
        let timing = &config.timing;
        let pins = &config.pins;

        info!(
            "Tracking device {}: GPS rx={} tx={}, RFID pin {}, LED pin {}",
            config.network.device_id, pins.gps_rx, pins.gps_tx, pins.rfid, pins.led
        );

        Self {
            gps: GpsSensor::new(gps_serial, timing.gps_interval_ms),
            rfid: RfidSensor::new(pins.rfid, timing.rfid_interval_ms, rng),
            comms: CommunicationHandler::new(
                &config.network,
                timing,
                wifi,
                http,
                delay.clone(),
            ),
            led: Led::new(led_pin, false),
            clock,
            delay,
            rfid_codes: config.rfid_codes.clone(),
            update_interval_ms: timing.update_interval_ms,
            last_update_ms: 0,
            state: DeviceState::Constructed,
        }
    }

    /// Register seed codes, connect, and blink to signal readiness
    ///
    /// A failed connect is not fatal; `update()` keeps retrying.
    pub fn initialize(&mut self) {
        info!("Initializing tracking device");

        for code in &self.rfid_codes {
            if !self.rfid.add_rfid_code(code.as_str()) {
                warn!("RFID code {} not registered", code);
            }
        }

        self.handle(Command::ConnectWifi);

        for _ in 0..INIT_BLINKS {
            self.led.turn_on();
            self.delay.delay_ms(INIT_BLINK_MS);
            self.led.turn_off();
            self.delay.delay_ms(INIT_BLINK_MS);
        }

        self.state = DeviceState::Initialized;
        info!("Tracking device initialized");
    }

    /// One loop tick, returns the events dispatched in it
    ///
    /// Nothing happens until `update_interval_ms` has passed since the end
    /// of the previous tick. Events raised while the link is down are
    /// dropped; the reconnect runs after them.
    pub fn update(&mut self) -> Vec<Event> {
        if elapsed_ms(&self.clock, self.last_update_ms) < self.update_interval_ms {
            return Vec::new();
        }

        let mut queue = EventQueue::new();
        self.gps.update(&self.clock, &mut queue);
        self.rfid.update(&self.clock, &mut queue);

        let events: Vec<Event> = queue.drain().collect();
        for &event in &events {
            self.on(event);
        }

        if let Err(e) = self.comms.check_connection() {
            warn!("{}", e);
        }

        self.last_update_ms = self.clock.millis();
        self.state = DeviceState::Running;
        events
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn gps_sensor(&self) -> &GpsSensor<P::Serial> {
        &self.gps
    }

    pub fn rfid_sensor(&self) -> &RfidSensor<P::Rng> {
        &self.rfid
    }

    pub fn rfid_sensor_mut(&mut self) -> &mut RfidSensor<P::Rng> {
        &mut self.rfid
    }

    pub fn communication_handler(&self) -> &CommunicationHandler<P::Wifi, P::Http, P::Delay> {
        &self.comms
    }

    pub fn led(&self) -> &Led<P::LedPin> {
        &self.led
    }

    fn send_gps_snapshot(&mut self) -> Result<u16, SendError> {
        self.comms.send_gps_data(self.gps.last_data())
    }

    fn send_rfid_snapshot(&mut self) -> Result<u16, SendError> {
        self.comms.send_rfid_data(self.rfid.last_detection())
    }

    fn blink_gps_sent(&mut self) {
        self.led.toggle();
        self.delay.delay_ms(GPS_BLINK_MS);
        self.led.toggle();
    }

    fn blink_rfid_sent(&mut self) {
        for _ in 0..RFID_BLINKS {
            self.led.turn_on();
            self.delay.delay_ms(RFID_BLINK_MS);
            self.led.turn_off();
            self.delay.delay_ms(RFID_BLINK_MS);
        }
    }
}

impl<P: Platform> EventHandler for TrackingDevice<P> {
    fn on(&mut self, event: Event) {
        match event {
            Event::GpsData => {
                debug!("GPS data event received");
                if self.gps.last_data().is_valid && self.comms.is_wifi_connected() {
                    if let Err(e) = self.send_gps_snapshot() {
                        warn!("GPS upload failed: {}", e);
                    }
                    self.blink_gps_sent();
                }
            }
            Event::RfidDetected => {
                debug!("RFID detection event received");
                if self.rfid.last_detection().is_valid && self.comms.is_wifi_connected() {
                    if let Err(e) = self.send_rfid_snapshot() {
                        warn!("RFID upload failed: {}", e);
                    }
                    self.blink_rfid_sent();
                }
            }
        }
    }
}

impl<P: Platform> CommandHandler for TrackingDevice<P> {
    fn handle(&mut self, command: Command) {
        match command {
            Command::ConnectWifi => self.comms.handle(command),
            Command::ToggleLed | Command::TurnOn | Command::TurnOff => self.led.handle(command),
            Command::SendGpsData => {
                if let Err(e) = self.send_gps_snapshot() {
                    warn!("GPS upload failed: {}", e);
                }
            }
            Command::SendRfidData => {
                if let Err(e) = self.send_rfid_snapshot() {
                    warn!("RFID upload failed: {}", e);
                }
            }
        }
    }
}
