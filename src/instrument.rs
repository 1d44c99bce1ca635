//! Instrument identifiers and listing intervals

use crate::error::{AlphaError, Result};
use crate::types::TradingDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique instrument identifier: exchange plus ticker code
///
/// Textual form is `TICKER.EXCHANGE` (for example `600519.SH`). Ordering is
/// lexicographic on (exchange, ticker) and is the tie-break used across the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId {
    exchange: String,
    ticker: String,
}

impl InstrumentId {
    /// Create a new identifier
    pub fn new(exchange: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            ticker: ticker.into(),
        }
    }

    /// Exchange code
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Ticker code
    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.ticker, self.exchange)
    }
}

impl FromStr for InstrumentId {
    type Err = AlphaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().rsplit_once('.') {
            Some((ticker, exchange)) if !ticker.is_empty() && !exchange.is_empty() => {
                Ok(Self::new(exchange, ticker))
            }
            _ => Err(AlphaError::ParseError(format!(
                "instrument id '{}' is not of the form TICKER.EXCHANGE",
                s
            ))),
        }
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = AlphaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> Self {
        id.to_string()
    }
}

/// An instrument with the interval during which it may appear in a panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique identifier
    pub id: InstrumentId,
    /// First date the instrument is listed
    pub listed: TradingDate,
    /// Last date the instrument is listed (None while still listed)
    pub delisted: Option<TradingDate>,
}

impl Instrument {
    /// Create a new instrument
    pub fn new(id: InstrumentId, listed: TradingDate, delisted: Option<TradingDate>) -> Result<Self> {
        if let Some(end) = delisted {
            if end < listed {
                return Err(AlphaError::MalformedPanel(format!(
                    "{} delisted {} before listing {}",
                    id, end, listed
                )));
            }
        }
        Ok(Self {
            id,
            listed,
            delisted,
        })
    }

    /// Check whether the instrument is listed on `date`
    pub fn is_valid_on(&self, date: TradingDate) -> bool {
        date >= self.listed && self.delisted.map_or(true, |end| date <= end)
    }

    /// Check whether the instrument has been delisted by `date`
    pub fn is_delisted_by(&self, date: TradingDate) -> bool {
        self.delisted.map_or(false, |end| date > end)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.delisted {
            Some(end) => write!(f, "Instrument({}, {}..={})", self.id, self.listed, end),
            None => write!(f, "Instrument({}, {}..)", self.id, self.listed),
        }
    }
}
