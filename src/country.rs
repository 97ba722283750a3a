//! Country records
//!
//! Countries map a two letter code to a continent code and a display name.

use crate::error::{LocError, Result};
use crate::network::normalize_country_code;
use serde::Serialize;
use std::collections::BTreeMap;

/// Continent codes accepted for country records
pub const CONTINENT_CODES: [&str; 7] = ["AF", "AN", "AS", "EU", "NA", "OC", "SA"];

/// Build-time country record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    code: [u8; 2],
    continent_code: Option<[u8; 2]>,
    name: String,
}

impl Country {
    /// Two letter country code
    pub fn code(&self) -> &str {
        std::str::from_utf8(&self.code).unwrap_or("")
    }

    pub(crate) fn raw_code(&self) -> [u8; 2] {
        self.code
    }

    /// Continent code, if set
    pub fn continent_code(&self) -> Option<&str> {
        self.continent_code
            .as_ref()
            .and_then(|c| std::str::from_utf8(c).ok())
    }

    pub(crate) fn raw_continent_code(&self) -> [u8; 2] {
        self.continent_code.unwrap_or([0, 0])
    }

    /// Set the continent code, an empty string clears it
    pub fn set_continent_code(&mut self, code: &str) -> Result<()> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            self.continent_code = None;
            return Ok(());
        }
        if !CONTINENT_CODES.contains(&code.as_str()) {
            return Err(LocError::InvalidCountryCode(format!(
                "unknown continent code {}",
                code
            )));
        }
        let bytes = code.as_bytes();
        self.continent_code = Some([bytes[0], bytes[1]]);
        Ok(())
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the display name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Country record read from a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountryRecord<'a> {
    /// Two letter country code
    pub code: &'a str,
    /// Continent code, empty if unset
    pub continent_code: &'a str,
    /// Display name
    pub name: &'a str,
}

/// Build-time country table, kept sorted by code
#[derive(Debug, Default, Clone)]
pub struct CountryTable {
    entries: BTreeMap<[u8; 2], Country>,
}

impl CountryTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a country or return the existing one
    pub fn add(&mut self, code: &str) -> Result<&mut Country> {
        let code = normalize_country_code(code)?;
        Ok(self.entries.entry(code).or_insert_with(|| Country {
            code,
            continent_code: None,
            name: String::new(),
        }))
    }

    /// Look up a country by code (case-insensitive)
    pub fn get(&self, code: &str) -> Option<&Country> {
        let code = normalize_country_code(code).ok()?;
        self.entries.get(&code)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in code order
    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut table = CountryTable::new();
        let de = table.add("de").unwrap();
        de.set_name("Germany");
        de.set_continent_code("EU").unwrap();

        let de = table.get("DE").unwrap();
        assert_eq!(de.code(), "DE");
        assert_eq!(de.continent_code(), Some("EU"));
        assert_eq!(de.name(), "Germany");
        assert!(table.get("FR").is_none());
    }

    #[test]
    fn test_invalid_codes() {
        let mut table = CountryTable::new();
        assert!(matches!(
            table.add("DEU"),
            Err(LocError::InvalidCountryCode(_))
        ));
        let us = table.add("US").unwrap();
        assert!(us.set_continent_code("XY").is_err());
        us.set_continent_code("").unwrap();
        assert_eq!(us.continent_code(), None);
    }

    #[test]
    fn test_sorted_iteration() {
        let mut table = CountryTable::new();
        for code in ["US", "AT", "DE"] {
            table.add(code).unwrap();
        }
        let codes: Vec<&str> = table.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["AT", "DE", "US"]);
    }
}
