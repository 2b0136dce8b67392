// SPDX-License-Identifier: MIT
//! Grouping of banks into events

use std::io::Read;

use serde::Serialize;
use tracing::{debug, warn};

use super::{DstReader, RawBank, ReadError};
use crate::bank::BankCodec;
use crate::codec::{BankSchema, CodecError};
use crate::format::{START_BANKID, STOP_BANKID};

/// Banks found between one start marker and the following stop marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub banks: Vec<RawBank>,
}

impl Event {
    /// First bank with the given id
    pub fn find(&self, id: i32) -> Option<&RawBank> {
        self.banks.iter().find(|bank| bank.id == id)
    }

    pub fn bank_ids(&self) -> Vec<i32> {
        self.banks.iter().map(|bank| bank.id).collect()
    }

    /// Decode this event's bank of the codec's flavor into the codec.
    ///
    /// Returns `Ok(false)` if the event holds no such bank.
    pub fn decode_into<S: BankSchema>(&self, codec: &mut BankCodec<S>) -> Result<bool, CodecError> {
        match self.find(codec.flavor().id) {
            Some(bank) => {
                codec.decode_checked(&bank.data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            banks: self
                .banks
                .iter()
                .map(|bank| (bank.name(), bank.version, bank.data.len()))
                .collect(),
        }
    }
}

/// Serializable listing of an event's banks: (name, version, length)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub banks: Vec<(String, i32, usize)>,
}

/// Iterator adapter turning a bank stream into events.
///
/// Banks outside a start/stop pair are dropped, as is an event still open
/// at the end of the stream.
pub struct Events<I> {
    banks: I,
    skipped: u64,
}

impl<I> Events<I>
where
    I: Iterator<Item = Result<RawBank, ReadError>>,
{
    pub fn new(banks: I) -> Self {
        Self { banks, skipped: 0 }
    }

    /// Banks dropped because they were outside any event
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<I> Iterator for Events<I>
where
    I: Iterator<Item = Result<RawBank, ReadError>>,
{
    type Item = Result<Event, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut current: Option<Event> = None;
        for bank in self.banks.by_ref() {
            let bank = match bank {
                Ok(bank) => bank,
                Err(e) => return Some(Err(e)),
            };
            match (bank.id, current.as_mut()) {
                (START_BANKID, open) => {
                    if open.is_some() {
                        warn!("start marker inside an open event, restarting the event");
                    }
                    current = Some(Event::default());
                }
                (STOP_BANKID, Some(_)) => return current.take().map(Ok),
                (STOP_BANKID, None) => debug!("stop marker outside an event"),
                (_, Some(event)) => event.banks.push(bank),
                (_, None) => self.skipped += 1,
            }
        }
        if let Some(event) = current {
            warn!(banks = event.banks.len(), "unterminated event at end of file");
        }
        None
    }
}

impl<R: Read> DstReader<R> {
    /// Group the banks of this reader into events
    pub fn events(self) -> Events<Self> {
        Events::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: i32) -> RawBank {
        RawBank {
            id,
            version: 0,
            data: [id.to_le_bytes(), 0i32.to_le_bytes()].concat(),
        }
    }

    #[test]
    fn test_grouping() {
        let stream = vec![
            marker(42),
            marker(START_BANKID),
            marker(13300),
            marker(12093),
            marker(STOP_BANKID),
            marker(START_BANKID),
            marker(13301),
            marker(STOP_BANKID),
            marker(START_BANKID),
            marker(1),
        ];
        let mut events = Events::new(stream.into_iter().map(Ok));
        let first = events.next().unwrap().unwrap();
        assert_eq!(first.bank_ids(), vec![13300, 12093]);
        assert!(first.find(12093).is_some());
        assert!(first.find(13301).is_none());

        let second = events.next().unwrap().unwrap();
        assert_eq!(second.bank_ids(), vec![13301]);

        assert!(events.next().is_none());
        assert_eq!(events.skipped(), 1);
    }

    #[test]
    fn test_errors_pass_through() {
        let stream: Vec<Result<RawBank, ReadError>> = vec![
            Ok(marker(START_BANKID)),
            Err(ReadError::InvalidFormat("broken".into())),
        ];
        let mut events = Events::new(stream.into_iter());
        assert!(matches!(
            events.next(),
            Some(Err(ReadError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_summary_serializes() {
        let event = Event {
            banks: vec![marker(13300)],
        };
        let json = serde_json::to_string(&event.summary()).unwrap();
        assert_eq!(json, r#"{"banks":[["hyp1",0,8]]}"#);
    }
}
