//! Autonomous system records
//!
//! [`AutonomousSystem`] is the mutable build-time record handed out by the
//! writer. [`AsRecord`] is the read-side view whose name borrows from the
//! database's string pool.

use crate::error::{LocError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Build-time AS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutonomousSystem {
    number: u32,
    name: String,
}

impl AutonomousSystem {
    fn new(number: u32) -> Self {
        Self {
            number,
            name: String::new(),
        }
    }

    /// AS number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Organization name (may be empty)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the organization name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl fmt::Display for AutonomousSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{} - {}", self.number, self.name)
    }
}

/// AS record read from a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AsRecord<'a> {
    /// AS number
    pub number: u32,
    /// Organization name, borrowed from the database
    pub name: &'a str,
}

impl AsRecord<'_> {
    /// Copy into an owned build-time record
    pub fn to_owned_record(&self) -> AutonomousSystem {
        AutonomousSystem {
            number: self.number,
            name: self.name.to_string(),
        }
    }
}

impl fmt::Display for AsRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{} - {}", self.number, self.name)
    }
}

/// Build-time AS table, kept sorted by number
#[derive(Debug, Default, Clone)]
pub struct AsTable {
    entries: BTreeMap<u32, AutonomousSystem>,
}

impl AsTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an AS or return the existing one
    ///
    /// AS number 0 is reserved and rejected.
    pub fn add(&mut self, number: u32) -> Result<&mut AutonomousSystem> {
        if number == 0 {
            return Err(LocError::Encoding("AS number 0 is reserved".to_string()));
        }
        Ok(self
            .entries
            .entry(number)
            .or_insert_with(|| AutonomousSystem::new(number)))
    }

    /// Look up an AS by number
    pub fn get(&self, number: u32) -> Option<&AutonomousSystem> {
        self.entries.get(&number)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending AS number order
    pub fn iter(&self) -> impl Iterator<Item = &AutonomousSystem> {
        self.entries.values()
    }
}
