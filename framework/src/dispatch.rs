/// Event/command dispatch
///
/// Events flow up from sensors ("new data is available"), commands flow down
/// to components ("do this"). Both are bare identifiers compared by tag; any
/// payload is fetched from the originating component afterwards.

use core::fmt;

/// Something happened. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Event {
    /// GPS sensor accepted a new fix
    GpsData = 10,
    /// RFID sensor detected a tag
    RfidDetected = 11,
}

/// Instruction for a component to act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    ToggleLed = 0,
    TurnOn = 1,
    TurnOff = 2,
    SendGpsData = 20,
    SendRfidData = 21,
    ConnectWifi = 22,
}

impl Event {
    pub const fn id(self) -> u16 {
        self as u16
    }
}

impl Command {
    pub const fn id(self) -> u16 {
        self as u16
    }
}

/// Identifier that does not name any known event or command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownId(pub u16);

impl fmt::Display for UnknownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown identifier {}", self.0)
    }
}

impl std::error::Error for UnknownId {}

impl TryFrom<u16> for Event {
    type Error = UnknownId;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        match id {
            10 => Ok(Event::GpsData),
            11 => Ok(Event::RfidDetected),
            other => Err(UnknownId(other)),
        }
    }
}

impl TryFrom<u16> for Command {
    type Error = UnknownId;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Command::ToggleLed),
            1 => Ok(Command::TurnOn),
            2 => Ok(Command::TurnOff),
            20 => Ok(Command::SendGpsData),
            21 => Ok(Command::SendRfidData),
            22 => Ok(Command::ConnectWifi),
            other => Err(UnknownId(other)),
        }
    }
}

/// Capability to be notified of events
pub trait EventHandler {
    fn on(&mut self, event: Event);
}

/// Capability to be controlled by commands
pub trait CommandHandler {
    fn handle(&mut self, command: Command);
}

/// Discarding sink for sensors that are not wired to anything
impl EventHandler for () {
    fn on(&mut self, _event: Event) {}
}

/// In-order buffer of raised events, drained by the owner after polling
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every queued event, oldest first
    pub fn drain(&mut self) -> std::vec::Drain<'_, Event> {
        self.events.drain(..)
    }
}

impl EventHandler for EventQueue {
    fn on(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for event in [Event::GpsData, Event::RfidDetected] {
            assert_eq!(Event::try_from(event.id()), Ok(event));
        }
        for command in [
            Command::ToggleLed,
            Command::TurnOn,
            Command::TurnOff,
            Command::SendGpsData,
            Command::SendRfidData,
            Command::ConnectWifi,
        ] {
            assert_eq!(Command::try_from(command.id()), Ok(command));
        }
    }

    #[test]
    fn test_unknown_ids_rejected() {
        assert_eq!(Event::try_from(100), Err(UnknownId(100)));
        assert_eq!(Command::try_from(3), Err(UnknownId(3)));
    }

    #[test]
    fn test_equality_is_by_identifier() {
        let from_gps = Event::GpsData;
        let from_wire = Event::try_from(10).unwrap();
        assert_eq!(from_gps, from_wire);
        assert_ne!(Event::GpsData, Event::RfidDetected);
    }

    #[test]
    fn test_queue_preserves_order() {
        let mut queue = EventQueue::new();
        queue.on(Event::RfidDetected);
        queue.on(Event::GpsData);
        assert_eq!(queue.len(), 2);

        let drained: Vec<Event> = queue.drain().collect();
        assert_eq!(drained, vec![Event::RfidDetected, Event::GpsData]);
        assert!(queue.is_empty());
    }
}
