/// GPS sensor: drains the UART into the NMEA decoder and raises
/// `Event::GpsData` when a new, different fix is accepted
use embedded_io::{Read, ReadReady};
use log::{debug, info, warn};
use neo6m::NmeaParser;

use crate::clock::{elapsed_ms, iso8601, Clock};
use crate::dispatch::{Event, EventHandler};
use crate::sensors::{Pin, Sensor};

pub const DEFAULT_GPS_INTERVAL_MS: u64 = 10_000;

const READ_CHUNK: usize = 64;

/// Last accepted GPS reading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsData {
    pub latitude: f64,
    pub longitude: f64,
    /// When false the coordinates are meaningless and must not be sent
    pub is_valid: bool,
    /// UTC time of acceptance, `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
}

pub struct GpsSensor<S> {
    serial: S,
    parser: NmeaParser,
    last_valid_data: GpsData,
    update_interval_ms: u64,
    last_update_ms: u64,
}

impl<S: Read + ReadReady> GpsSensor<S> {
    pub fn new(serial: S, update_interval_ms: u64) -> Self {
        Self {
            serial,
            parser: NmeaParser::new(),
            last_valid_data: GpsData::default(),
            update_interval_ms,
            last_update_ms: 0,
        }
    }

    /// Latest snapshot (invalid until the first fix is accepted)
    pub fn last_data(&self) -> &GpsData {
        &self.last_valid_data
    }

    /// A fix has been accepted and the receiver still reports a valid position
    pub fn has_valid_fix(&self) -> bool {
        self.last_valid_data.is_valid && self.parser.has_fix()
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval_ms
    }

    /// Feed every byte that is ready right now, never waits
    fn drain_serial(&mut self) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.serial.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("GPS UART status error: {:?}", e);
                    break;
                }
            }

            match self.serial.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        self.parser.feed_byte(byte);
                    }
                }
                Err(e) => {
                    warn!("GPS UART read error: {:?}", e);
                    break;
                }
            }
        }
    }
}

impl<S: Read + ReadReady> Sensor for GpsSensor<S> {
    fn pin(&self) -> Option<Pin> {
        // UART attached, no single GPIO
        None
    }

    fn update(&mut self, clock: &dyn Clock, events: &mut dyn EventHandler) {
        self.drain_serial();

        // The updated flag stays pending until the interval gate opens
        if !self.parser.location_updated()
            || elapsed_ms(clock, self.last_update_ms) <= self.update_interval_ms
        {
            return;
        }

        let location = self.parser.take_location();
        if !location.valid {
            return;
        }

        let stored = &self.last_valid_data;
        if stored.is_valid && location.lat == stored.latitude && location.lon == stored.longitude
        {
            debug!("GPS fix unchanged, no event");
            return;
        }

        self.last_valid_data = GpsData {
            latitude: location.lat,
            longitude: location.lon,
            is_valid: true,
            timestamp: iso8601(clock.unix_time()),
        };
        self.last_update_ms = clock.millis();

        info!(
            "GPS fix accepted: {:.6}, {:.6} at {}",
            location.lat, location.lon, self.last_valid_data.timestamp
        );
        events.on(Event::GpsData);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventQueue;
    use crate::sim::{rmc_sentence, ManualClock, ScriptedSerial};

    const START_UNIX: i64 = 1_742_733_300;

    fn sensor(interval_ms: u64) -> (GpsSensor<ScriptedSerial>, ScriptedSerial, ManualClock) {
        let serial = ScriptedSerial::new();
        let clock = ManualClock::new(START_UNIX);
        (GpsSensor::new(serial.clone(), interval_ms), serial, clock)
    }

    fn poll(sensor: &mut GpsSensor<ScriptedSerial>, clock: &ManualClock) -> Vec<Event> {
        let mut queue = EventQueue::new();
        sensor.update(clock, &mut queue);
        queue.drain().collect()
    }

    #[test]
    fn test_no_data_no_event() {
        let (mut gps, _serial, clock) = sensor(1000);
        clock.advance(5000);
        assert!(poll(&mut gps, &clock).is_empty());
        assert!(!gps.last_data().is_valid);
        assert!(!gps.has_valid_fix());
    }

    #[test]
    fn test_first_fix_after_interval_raises_event() {
        let (mut gps, serial, clock) = sensor(1000);
        clock.advance(1001);
        serial.push_str(&rmc_sentence(40.0, -3.0));

        assert_eq!(poll(&mut gps, &clock), vec![Event::GpsData]);
        let data = gps.last_data();
        assert!(data.is_valid);
        assert_eq!(data.latitude, 40.0);
        assert_eq!(data.longitude, -3.0);
        assert_eq!(data.timestamp, "2025-03-23T12:35:01Z");
        assert!(gps.has_valid_fix());
        assert_eq!(serial.pending(), 0);
    }

    #[test]
    fn test_interval_gate_is_strict() {
        let (mut gps, serial, clock) = sensor(1000);
        clock.advance(1000);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert!(poll(&mut gps, &clock).is_empty());

        // Pending location is picked up once the gate opens
        clock.advance(1);
        assert_eq!(poll(&mut gps, &clock), vec![Event::GpsData]);
    }

    #[test]
    fn test_identical_fix_is_not_reported_twice() {
        let (mut gps, serial, clock) = sensor(1000);
        clock.advance(2000);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert_eq!(poll(&mut gps, &clock).len(), 1);

        clock.advance(2000);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert!(poll(&mut gps, &clock).is_empty());
    }

    #[test]
    fn test_changed_fix_inside_interval_waits() {
        let (mut gps, serial, clock) = sensor(1000);
        clock.advance(2000);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert_eq!(poll(&mut gps, &clock).len(), 1);

        clock.advance(500);
        serial.push_str(&rmc_sentence(40.5, -3.0));
        assert!(poll(&mut gps, &clock).is_empty());
        assert_eq!(gps.last_data().latitude, 40.0);

        clock.advance(501);
        assert_eq!(poll(&mut gps, &clock), vec![Event::GpsData]);
        assert_eq!(gps.last_data().latitude, 40.5);
    }

    #[test]
    fn test_longitude_only_change_is_reported() {
        let (mut gps, serial, clock) = sensor(0);
        clock.advance(1);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert_eq!(poll(&mut gps, &clock).len(), 1);

        clock.advance(1);
        serial.push_str(&rmc_sentence(40.0, -3.5));
        assert_eq!(poll(&mut gps, &clock).len(), 1);
        assert_eq!(gps.last_data().longitude, -3.5);
    }

    #[test]
    fn test_void_fix_keeps_last_snapshot() {
        let (mut gps, serial, clock) = sensor(0);
        clock.advance(1);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        assert_eq!(poll(&mut gps, &clock).len(), 1);

        clock.advance(1);
        serial.push_str("$GPRMC,123519,V,,,,,,,230325,,\r\n");
        assert!(poll(&mut gps, &clock).is_empty());
        assert!(gps.last_data().is_valid);
        assert!(!gps.has_valid_fix());
    }

    #[test]
    fn test_void_sentence_does_not_drop_pending_fix() {
        let (mut gps, serial, clock) = sensor(1000);
        serial.push_str(&rmc_sentence(40.0, -3.0));
        serial.push_str("$GPRMC,123519,V,,,,,,,230325,,\r\n");
        assert!(poll(&mut gps, &clock).is_empty());

        clock.advance(1001);
        assert_eq!(poll(&mut gps, &clock), vec![Event::GpsData]);
        assert_eq!(gps.last_data().latitude, 40.0);
        assert!(!gps.has_valid_fix());
    }

    #[test]
    fn test_gps_has_no_pin() {
        let (gps, _serial, _clock) = sensor(1000);
        assert_eq!(gps.pin(), None);
        assert_eq!(gps.update_interval_ms(), 1000);
    }
}
