use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::page::DEFAULT_PAGE_SIZE;

/// smallest page that still holds the meta record and a freelist header
pub const MIN_PAGE_SIZE: usize = 64;

/// cell offsets are u16
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub page_size: usize,

    /// nodes below this fraction of a page are under-populated,
    /// also the target size of the left half of a split
    pub min_fill_percent: f64,

    /// nodes above this fraction of a page get split
    pub max_fill_percent: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            min_fill_percent: 0.5,
            max_fill_percent: 0.95,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_fill_percent(mut self, min: f64, max: f64) -> Self {
        self.min_fill_percent = min;
        self.max_fill_percent = max;
        self
    }

    /// load options from a JSON file, missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let options: Options = serde_json::from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::InvalidOptions(format!(
                "page size {} outside {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        let (min, max) = (self.min_fill_percent, self.max_fill_percent);
        if !(min > 0.0 && min < max && max <= 1.0) {
            return Err(Error::InvalidOptions(format!(
                "fill percents must satisfy 0 < min < max <= 1, got min {min} max {max}"
            )));
        }

        Ok(())
    }

    pub fn max_threshold(&self) -> f64 {
        self.max_fill_percent * self.page_size as f64
    }

    pub fn min_threshold(&self) -> f64 {
        self.min_fill_percent * self.page_size as f64
    }
}
