//! NEO-6M GPS NMEA Parser
//!
//! A pure Rust decoder for the NMEA 0183 sentences emitted by NEO-6M class
//! receivers. It is fed one byte at a time straight from the UART and keeps the
//! most recent committed position.
//!
//! # Features
//!
//! - Zero-allocation parsing, `no_std` compatible
//! - GPRMC/GNRMC (status A/V) and GPGGA/GNGGA (fix quality) positions
//! - `*hh` checksum validation with pass/fail counters
//! - A "location updated" flag that is raised whenever a valid position is
//!   committed and cleared when the caller takes it
//! - Receiver fix status kept apart from the committed position, so a void
//!   sentence never discards a position still waiting to be taken
//!
//! # Example
//!
//! ```no_run
//! use neo6m::NmeaParser;
//!
//! let mut parser = NmeaParser::new();
//! # let uart_bytes: &[u8] = &[];
//!
//! for &byte in uart_bytes {
//!     parser.feed_byte(byte);
//! }
//!
//! if parser.location_updated() {
//!     let location = parser.take_location();
//!     if location.valid {
//!         // forward location.lat / location.lon
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "logging")]
use log::warn;

use libm::floor;

const MAX_SENTENCE_LEN: usize = 120;

/// Last committed position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    /// Latitude in degrees (positive = North, negative = South)
    pub lat: f64,
    /// Longitude in degrees (positive = East, negative = West)
    pub lon: f64,
    /// False until a position has been committed
    pub valid: bool,
}

/// NMEA sentence parser for NEO-6M GPS
pub struct NmeaParser {
    line_buffer: [u8; MAX_SENTENCE_LEN],
    line_len: usize,
    location: Location,
    location_updated: bool,
    has_fix: bool,
    passed_checksums: u32,
    failed_checksums: u32,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            line_buffer: [0; MAX_SENTENCE_LEN],
            line_len: 0,
            location: Location::default(),
            location_updated: false,
            has_fix: false,
            passed_checksums: 0,
            failed_checksums: 0,
        }
    }

    /// Feed a single byte from UART to the parser
    ///
    /// Returns `true` when a complete sentence has been accepted (on newline).
    /// Sentences with a bad checksum or an unsupported type return `false`.
    pub fn feed_byte(&mut self, byte: u8) -> bool {
        match byte {
            b'$' => {
                self.line_buffer[0] = byte;
                self.line_len = 1;
                false
            }
            b'\r' => false,
            b'\n' => {
                if self.line_len == 0 {
                    return false;
                }
                let accepted = self.parse_line();
                self.line_len = 0;
                accepted
            }
            _ => {
                if self.line_len > 0 && self.line_len < MAX_SENTENCE_LEN {
                    self.line_buffer[self.line_len] = byte;
                    self.line_len += 1;
                }
                false
            }
        }
    }

    /// Last committed position
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// True when a valid position was committed since the last `take_location`
    pub fn location_updated(&self) -> bool {
        self.location_updated
    }

    /// Read the position and clear the updated flag
    pub fn take_location(&mut self) -> Location {
        self.location_updated = false;
        self.location
    }

    /// Receiver status from the latest RMC/GGA sentence
    ///
    /// A void sentence clears this but leaves the committed location and any
    /// pending update untouched.
    pub fn has_fix(&self) -> bool {
        self.has_fix
    }

    /// Number of sentences whose checksum matched
    pub fn passed_checksums(&self) -> u32 {
        self.passed_checksums
    }

    /// Number of sentences dropped because their checksum did not match
    pub fn failed_checksums(&self) -> u32 {
        self.failed_checksums
    }

    fn parse_line(&mut self) -> bool {
        let len = self.line_len;

        // Copy out so the fields can borrow while `self` is mutated
        let mut local_buf = [0u8; MAX_SENTENCE_LEN];
        local_buf[..len].copy_from_slice(&self.line_buffer[..len]);

        let line = match core::str::from_utf8(&local_buf[..len]) {
            Ok(s) => s,
            Err(_) => return false,
        };

        let body = match split_checksum(line) {
            Some(body) => {
                self.passed_checksums += 1;
                body
            }
            None => {
                self.failed_checksums += 1;
                #[cfg(feature = "logging")]
                warn!("NMEA checksum mismatch, dropping sentence");
                return false;
            }
        };

        if body.starts_with("$GPRMC") || body.starts_with("$GNRMC") {
            self.parse_rmc(body)
        } else if body.starts_with("$GPGGA") || body.starts_with("$GNGGA") {
            self.parse_gga(body)
        } else {
            false
        }
    }

    /// Format: $GPRMC,hhmmss.ss,A,ddmm.mmmm,N,dddmm.mmmm,E,speed,course,ddmmyy,,
    ///
    /// Only the status and position fields are read.
    fn parse_rmc(&mut self, line: &str) -> bool {
        let mut fields = [""; 12];
        if split_fields(line, &mut fields) < 10 {
            return false;
        }

        if fields[2] != "A" {
            self.has_fix = false;
            return true;
        }

        let (lat, lon) = match (
            parse_coordinate(fields[3], fields[4]),
            parse_coordinate(fields[5], fields[6]),
        ) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return false,
        };

        self.commit_location(lat, lon);
        true
    }

    /// Format: $GPGGA,hhmmss.ss,ddmm.mmmm,N,dddmm.mmmm,E,q,...
    fn parse_gga(&mut self, line: &str) -> bool {
        let mut fields = [""; 15];
        if split_fields(line, &mut fields) < 7 {
            return false;
        }

        let quality = fields[6].parse::<u8>().unwrap_or(0);
        if quality == 0 {
            self.has_fix = false;
            return true;
        }

        match (
            parse_coordinate(fields[2], fields[3]),
            parse_coordinate(fields[4], fields[5]),
        ) {
            (Some(lat), Some(lon)) => {
                self.commit_location(lat, lon);
                true
            }
            _ => false,
        }
    }

    fn commit_location(&mut self, lat: f64, lon: f64) {
        self.location = Location {
            lat,
            lon,
            valid: true,
        };
        self.location_updated = true;
        self.has_fix = true;
    }
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// XOR of every byte between `$` and `*`
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Strip and verify an optional `*hh` suffix, returning the sentence body
fn split_checksum(line: &str) -> Option<&str> {
    let Some(star) = line.rfind('*') else {
        return Some(line);
    };

    let (body, suffix) = line.split_at(star);
    let expected = u8::from_str_radix(suffix.get(1..3)?, 16).ok()?;
    let actual = checksum(body.get(1..)?.as_bytes());

    (expected == actual).then_some(body)
}

/// Split on commas into a fixed slot array, returning the number of fields
fn split_fields<'a>(line: &'a str, out: &mut [&'a str]) -> usize {
    let mut count = 0;
    for (slot, field) in out.iter_mut().zip(line.split(',')) {
        *slot = field;
        count += 1;
    }
    count
}

/// Parse NMEA coordinate field (ddmm.mmmm format)
fn parse_coordinate(coord_str: &str, dir_str: &str) -> Option<f64> {
    if coord_str.is_empty() || dir_str.is_empty() {
        return None;
    }

    let value = coord_str.parse::<f64>().ok()?;

    let degrees = floor(value / 100.0);
    let minutes = value - (degrees * 100.0);

    let mut decimal = degrees + (minutes / 60.0);

    if dir_str == "S" || dir_str == "W" {
        decimal = -decimal;
    }

    Some(decimal)
}
