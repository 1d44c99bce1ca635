//! Core types and constants

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Trading date (daily bars, no intraday component)
pub type TradingDate = NaiveDate;

/// Sector identifier
pub type SectorId = String;

/// Fraction of NAV (0.0 to 1.0 for long-only books)
pub type Weight = f64;

/// Price type (using f64 for precision)
pub type Price = f64;

/// Trading days per year used for annualization
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Tolerance below which a weight is treated as zero
pub const WEIGHT_EPSILON: f64 = 1e-12;

/// One panel observation for an instrument on a trading date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
    pub adj_close: Price,
    pub is_suspended: bool,
    pub sector_id: Option<SectorId>,
}

impl Observation {
    /// Observation with a flat bar at `price`
    pub fn flat(price: Price, volume: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            adj_close: price,
            is_suspended: false,
            sector_id: None,
        }
    }

    /// Set the sector
    pub fn with_sector(mut self, sector: impl Into<SectorId>) -> Self {
        self.sector_id = Some(sector.into());
        self
    }

    /// Mark as suspended
    pub fn suspended(mut self) -> Self {
        self.is_suspended = true;
        self
    }

    /// A row can be traded and used as a valid data point
    pub fn is_tradable(&self) -> bool {
        !self.is_suspended && self.adj_close.is_finite() && self.adj_close > 0.0
    }
}
