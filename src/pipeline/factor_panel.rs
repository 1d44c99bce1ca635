//! Factor values per (instrument, date) with explicit omission markers

use crate::error::{AlphaError, Result};
use crate::instrument::InstrumentId;
use crate::pipeline::transform::TransformSpec;
use crate::types::TradingDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why an instrument has no factor value on a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum OmissionReason {
    /// Fewer valid observations in the lookback window than required
    InsufficientHistory { available: usize },
    /// Missing or suspended on the as-of date
    NotTradable,
    /// As-of date outside the listing interval
    OutsideValidity,
    /// Formula produced NaN or infinity
    NonFinite,
    /// Sector-neutralization without a sector for this instrument
    MissingSector,
    /// Normalization undefined for this cross-section
    DegenerateCrossSection,
}

impl OmissionReason {
    /// Short label used in flat records
    pub fn label(&self) -> &'static str {
        match self {
            OmissionReason::InsufficientHistory { .. } => "insufficient_history",
            OmissionReason::NotTradable => "not_tradable",
            OmissionReason::OutsideValidity => "outside_validity",
            OmissionReason::NonFinite => "non_finite",
            OmissionReason::MissingSector => "missing_sector",
            OmissionReason::DegenerateCrossSection => "degenerate_cross_section",
        }
    }
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// All factor values and omissions on one date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    pub values: BTreeMap<InstrumentId, f64>,
    pub omitted: BTreeMap<InstrumentId, OmissionReason>,
}

impl CrossSection {
    /// Number of instruments with a value
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no instrument has a value
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for an instrument
    pub fn get(&self, id: &InstrumentId) -> Option<f64> {
        self.values.get(id).copied()
    }

    /// Move an instrument from values to omitted
    pub(crate) fn omit(&mut self, id: &InstrumentId, reason: OmissionReason) {
        self.values.remove(id);
        self.omitted.insert(id.clone(), reason);
    }
}

/// Factor values over a set of as-of dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorPanel {
    spec: TransformSpec,
    sections: BTreeMap<TradingDate, CrossSection>,
}

impl FactorPanel {
    /// Create from computed cross-sections
    pub fn new(spec: TransformSpec, sections: BTreeMap<TradingDate, CrossSection>) -> Self {
        Self { spec, sections }
    }

    /// Factor name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Transform that produced this panel
    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// As-of dates, ascending
    pub fn dates(&self) -> impl Iterator<Item = TradingDate> + '_ {
        self.sections.keys().copied()
    }

    /// Number of as-of dates
    pub fn num_dates(&self) -> usize {
        self.sections.len()
    }

    /// Cross-section on a date
    pub fn cross_section(&self, date: TradingDate) -> Option<&CrossSection> {
        self.sections.get(&date)
    }

    /// Iterate cross-sections in date order
    pub fn iter(&self) -> impl Iterator<Item = (TradingDate, &CrossSection)> + '_ {
        self.sections.iter().map(|(d, cs)| (*d, cs))
    }

    /// Factor value, if present
    pub fn value(&self, date: TradingDate, id: &InstrumentId) -> Option<f64> {
        self.sections.get(&date).and_then(|cs| cs.get(id))
    }

    /// Factor value, turning an omission into a descriptive error
    pub fn require_value(&self, date: TradingDate, id: &InstrumentId) -> Result<f64> {
        let cs = self.sections.get(&date).ok_or_else(|| {
            AlphaError::CalendarMismatch(format!(
                "factor '{}' was not computed for {}",
                self.spec.name, date
            ))
        })?;
        if let Some(v) = cs.get(id) {
            return Ok(v);
        }
        match cs.omitted.get(id) {
            Some(OmissionReason::InsufficientHistory { available }) => {
                Err(AlphaError::InsufficientHistory {
                    instrument: id.to_string(),
                    date,
                    required: self.spec.lookback,
                    available: *available,
                })
            }
            Some(reason) => Err(AlphaError::MissingFactorValue {
                instrument: id.to_string(),
                date,
                reason: *reason,
            }),
            None => Err(AlphaError::UnknownInstrument(id.to_string())),
        }
    }

    /// Flatten to one record per (date, instrument), omissions included
    pub fn to_records(&self) -> Vec<FactorRecord> {
        let mut records = Vec::new();
        for (date, cs) in &self.sections {
            let mut rows: Vec<FactorRecord> = cs
                .values
                .iter()
                .map(|(id, v)| FactorRecord {
                    date: *date,
                    instrument_id: id.clone(),
                    value: Some(*v),
                    status: "valid".to_string(),
                    available: None,
                })
                .chain(cs.omitted.iter().map(|(id, reason)| FactorRecord {
                    date: *date,
                    instrument_id: id.clone(),
                    value: None,
                    status: reason.label().to_string(),
                    available: match reason {
                        OmissionReason::InsufficientHistory { available } => Some(*available),
                        _ => None,
                    },
                }))
                .collect();
            rows.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
            records.extend(rows);
        }
        records
    }
}

/// Flat factor record for CSV output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRecord {
    pub date: TradingDate,
    pub instrument_id: InstrumentId,
    pub value: Option<f64>,
    pub status: String,
    pub available: Option<usize>,
}
