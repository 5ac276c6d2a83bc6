//! String-keyed parameters
//!
//! Spaces and methods are configured with `name=value` pairs supplied by the
//! caller. [`Params`] keeps them in insertion order; a [`ParamReader`] pulls
//! typed values out and reports any key nobody asked for, so a misspelled
//! parameter fails loudly instead of being ignored.

use crate::{Result, SimdexError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Ordered list of `name=value` parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `name=value` strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use simdex_core::Params;
    ///
    /// let params = Params::parse(["M=16", "efConstruction=100"]).unwrap();
    /// assert_eq!(params.get("M"), Some("16"));
    /// assert!(Params::parse(["novalue"]).is_err());
    /// ```
    pub fn parse<I, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for item in items {
            let item = item.as_ref();
            let (name, value) = item.split_once('=').ok_or_else(|| {
                SimdexError::InvalidParam(format!("Expected name=value, got '{}'", item))
            })?;
            params.add(name.trim(), value.trim())?;
        }
        Ok(params)
    }

    /// Add or replace a parameter.
    pub fn add(&mut self, name: &str, value: impl ToString) -> Result<()> {
        if name.is_empty() || name.contains('=') {
            return Err(SimdexError::InvalidParam(format!(
                "Invalid parameter name '{}'",
                name
            )));
        }

        let value = value.to_string();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Start typed extraction.
    pub fn reader(&self) -> ParamReader<'_> {
        ParamReader {
            params: self,
            used: HashSet::new(),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Typed view over [`Params`] that tracks which keys were consumed
pub struct ParamReader<'a> {
    params: &'a Params,
    used: HashSet<&'a str>,
}

impl<'a> ParamReader<'a> {
    /// Parse `name` as `T`, or return `None` if it is absent.
    pub fn get_opt<T>(&mut self, name: &'a str) -> Result<Option<T>>
    where
        T: FromStr,
    {
        self.used.insert(name);
        match self.params.get(name) {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                SimdexError::InvalidParam(format!(
                    "Parameter '{}' has invalid value '{}'",
                    name, raw
                ))
            }),
            None => Ok(None),
        }
    }

    /// Parse `name` as `T`, falling back to `default` if it is absent.
    pub fn get_or<T>(&mut self, name: &'a str, default: T) -> Result<T>
    where
        T: FromStr,
    {
        Ok(self.get_opt(name)?.unwrap_or(default))
    }

    /// Fails if any parameter was never requested.
    pub fn finish(self) -> Result<()> {
        let unknown: Vec<&str> = self
            .params
            .iter()
            .map(|(n, _)| n)
            .filter(|n| !self.used.contains(n))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SimdexError::InvalidParam(format!(
                "Unknown parameter(s): {}",
                unknown.join(", ")
            )))
        }
    }
}
