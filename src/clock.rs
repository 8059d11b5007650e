use crate::error::Error;
use crate::ident::validate_identifier;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering::SeqCst};
use uuid::Uuid;

const DEFAULT_FREQUENCY: u64 = 1_000_000_000;

/// A CTF clock class plus the writer-side notion of "current time".
///
/// Clocks are shared as `Arc<Clock>` between the trace, stream classes and
/// the integer types that map them. The description is immutable once
/// built; only the current time moves.
#[derive(Debug)]
pub struct Clock {
    name: String,
    description: Option<String>,
    frequency: u64,
    precision: u64,
    offset_s: i64,
    offset: i64,
    absolute: bool,
    uuid: Option<Uuid>,
    time: AtomicI64,
    time_set: AtomicBool,
}

impl Clock {
    pub fn new(name: &str) -> Result<Self, Error> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_owned(),
            description: None,
            frequency: DEFAULT_FREQUENCY,
            precision: 1,
            offset_s: 0,
            offset: 0,
            absolute: false,
            uuid: None,
            time: AtomicI64::new(0),
            time_set: AtomicBool::new(false),
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn with_frequency(mut self, frequency: u64) -> Result<Self, Error> {
        if frequency == 0 {
            return Err(Error::invalid_argument("Clock frequency must be non-zero"));
        }
        self.frequency = frequency;
        Ok(self)
    }

    pub fn with_precision(mut self, precision: u64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_offset_s(mut self, offset_s: i64) -> Self {
        self.offset_s = offset_s;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn precision(&self) -> u64 {
        self.precision
    }

    pub fn offset_s(&self) -> i64 {
        self.offset_s
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Set the current time, in clock cycles.
    pub fn set_time(&self, cycles: i64) {
        self.time.store(cycles, SeqCst);
        self.time_set.store(true, SeqCst);
    }

    pub fn current_time(&self) -> Result<i64, Error> {
        if self.time_set.load(SeqCst) {
            Ok(self.time.load(SeqCst))
        } else {
            Err(Error::unset(format!("clock.{}.time", self.name)))
        }
    }
}

/// Two clocks describe the same clock class when everything but the current time matches.
impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.frequency == other.frequency
            && self.precision == other.precision
            && self.offset_s == other.offset_s
            && self.offset == other.offset
            && self.absolute == other.absolute
            && self.uuid == other.uuid
    }
}

impl Eq for Clock {}
