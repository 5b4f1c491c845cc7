/// Simulated RFID reader
///
/// There is no reader hardware behind this sensor. Every `scan_interval_ms` it
/// picks one of the registered codes at random and reports it as an ENTRY scan.
use heapless::Vec as BoundedVec;
use log::{debug, info, warn};
use rand::{Rng, RngCore};

use crate::clock::{elapsed_ms, Clock};
use crate::dispatch::{Event, EventHandler};
use crate::sensors::{Pin, Sensor};

pub const DEFAULT_RFID_INTERVAL_MS: u64 = 5_000;
pub const MAX_RFID_CODES: usize = 10;
pub const SCAN_TYPE_ENTRY: &str = "ENTRY";

/// Last detected tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RfidData {
    pub rfid_code: String,
    pub scan_type: String,
    /// When false the record must not be sent
    pub is_valid: bool,
}

pub struct RfidSensor<R> {
    pin: Pin,
    rng: R,
    codes: BoundedVec<String, MAX_RFID_CODES>,
    scan_interval_ms: u64,
    last_scan_ms: u64,
    last_detection: RfidData,
}

impl<R: RngCore> RfidSensor<R> {
    pub fn new(pin: Pin, scan_interval_ms: u64, rng: R) -> Self {
        Self {
            pin,
            rng,
            codes: BoundedVec::new(),
            scan_interval_ms,
            last_scan_ms: 0,
            last_detection: RfidData::default(),
        }
    }

    /// Register a code the simulation may report
    ///
    /// Returns `false` when all `MAX_RFID_CODES` slots are taken; the code is
    /// dropped and the stored set is left as it was.
    pub fn add_rfid_code(&mut self, code: impl Into<String>) -> bool {
        match self.codes.push(code.into()) {
            Ok(()) => true,
            Err(code) => {
                warn!("RFID code table full, dropping {}", code);
                false
            }
        }
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn last_detection(&self) -> &RfidData {
        &self.last_detection
    }

    pub fn scan_interval_ms(&self) -> u64 {
        self.scan_interval_ms
    }

    /// Report one registered code right now
    ///
    /// Does nothing while no codes are registered.
    pub fn simulate_scan(&mut self, clock: &dyn Clock, events: &mut dyn EventHandler) {
        if self.codes.is_empty() {
            debug!("RFID scan skipped, no codes registered");
            return;
        }

        let index = self.rng.gen_range(0..self.codes.len());
        self.last_detection = RfidData {
            rfid_code: self.codes[index].clone(),
            scan_type: SCAN_TYPE_ENTRY.to_string(),
            is_valid: true,
        };
        self.last_scan_ms = clock.millis();

        info!("RFID tag detected: {}", self.last_detection.rfid_code);
        events.on(Event::RfidDetected);
    }
}

impl<R: RngCore> Sensor for RfidSensor<R> {
    fn pin(&self) -> Option<Pin> {
        Some(self.pin)
    }

    fn update(&mut self, clock: &dyn Clock, events: &mut dyn EventHandler) {
        if elapsed_ms(clock, self.last_scan_ms) >= self.scan_interval_ms {
            self.simulate_scan(clock, events);
        }
    }
}
