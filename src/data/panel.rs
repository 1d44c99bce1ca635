//! Panel of per-instrument, per-date observations on a shared calendar

use crate::calendar::TradingCalendar;
use crate::error::{AlphaError, Result};
use crate::instrument::{Instrument, InstrumentId};
use crate::types::{Observation, Price, SectorId, TradingDate};
use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One flat input row, the ingestion format of the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub instrument_id: InstrumentId,
    pub date: TradingDate,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
    pub adj_close: Price,
    #[serde(deserialize_with = "deserialize_flag")]
    pub is_suspended: bool,
    #[serde(default)]
    pub sector_id: Option<SectorId>,
}

impl PanelRow {
    /// Create a row from an observation
    pub fn new(instrument_id: InstrumentId, date: TradingDate, obs: Observation) -> Self {
        Self {
            instrument_id,
            date,
            open: obs.open,
            high: obs.high,
            low: obs.low,
            close: obs.close,
            volume: obs.volume,
            adj_close: obs.adj_close,
            is_suspended: obs.is_suspended,
            sector_id: obs.sector_id,
        }
    }

    fn into_parts(self) -> (InstrumentId, TradingDate, Observation) {
        let obs = Observation {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            adj_close: self.adj_close,
            is_suspended: self.is_suspended,
            sector_id: self.sector_id.filter(|s| !s.is_empty()),
        };
        (self.instrument_id, self.date, obs)
    }
}

/// Accept `true/false`, `1/0` and their string forms for suspension flags
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Ok(true),
            "false" | "f" | "0" | "no" | "n" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid suspension flag '{}'",
                other
            ))),
        },
    }
}

/// Immutable panel of observations
///
/// Cells are stored densely as `[instrument][calendar position]`; `None` means the
/// instrument did not trade that day. Instruments are kept sorted by identifier.
#[derive(Debug, Clone)]
pub struct Panel {
    calendar: TradingCalendar,
    instruments: Vec<Instrument>,
    index: HashMap<InstrumentId, usize>,
    cells: Vec<Vec<Option<Observation>>>,
}

impl Panel {
    /// Start building a panel
    pub fn builder() -> PanelBuilder {
        PanelBuilder::new()
    }

    /// Shared trading calendar
    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Instruments, sorted by identifier
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Number of instruments
    pub fn num_instruments(&self) -> usize {
        self.instruments.len()
    }

    /// Number of stored observations
    pub fn num_observations(&self) -> usize {
        self.cells
            .iter()
            .map(|series| series.iter().filter(|c| c.is_some()).count())
            .sum()
    }

    /// Position of an instrument
    pub fn instrument_index(&self, id: &InstrumentId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Look up an instrument by identifier
    pub fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instrument_index(id).map(|i| &self.instruments[i])
    }

    /// Observation by instrument position and calendar position
    pub fn observation_at(&self, inst: usize, date_idx: usize) -> Option<&Observation> {
        self.cells.get(inst).and_then(|s| s.get(date_idx)).and_then(|c| c.as_ref())
    }

    /// Observation by identifier and date
    pub fn observation(&self, id: &InstrumentId, date: TradingDate) -> Option<&Observation> {
        let inst = self.instrument_index(id)?;
        let date_idx = self.calendar.index_of(date)?;
        self.observation_at(inst, date_idx)
    }

    /// Check if an instrument can be traded at a calendar position
    pub fn is_tradable_at(&self, inst: usize, date_idx: usize) -> bool {
        let listed = self
            .calendar
            .date(date_idx)
            .map_or(false, |d| self.instruments[inst].is_valid_on(d));
        listed
            && self
                .observation_at(inst, date_idx)
                .map_or(false, Observation::is_tradable)
    }

    /// Latest tradable adjusted price at or before a calendar position
    pub fn last_price_at_or_before(&self, inst: usize, date_idx: usize) -> Option<(usize, Price)> {
        let series = self.cells.get(inst)?;
        let end = date_idx.min(series.len().checked_sub(1)?);
        (0..=end).rev().find_map(|i| {
            series[i]
                .as_ref()
                .filter(|o| o.is_tradable())
                .map(|o| (i, o.adj_close))
        })
    }

    /// Return from close at `date_idx` to close at `date_idx + horizon`
    ///
    /// Defined only when both ends are tradable observations.
    pub fn forward_return(&self, inst: usize, date_idx: usize, horizon: usize) -> Option<f64> {
        let start = self.observation_at(inst, date_idx).filter(|o| o.is_tradable())?;
        let end = self
            .observation_at(inst, date_idx + horizon)
            .filter(|o| o.is_tradable())?;
        let ret = end.adj_close / start.adj_close - 1.0;
        ret.is_finite().then_some(ret)
    }

    /// Read-only view that cannot address rows after `date`
    pub fn as_of(&self, date: TradingDate) -> Result<PointInTimeView<'_>> {
        let as_of_idx = self.calendar.require_index(date)?;
        Ok(PointInTimeView {
            panel: self,
            as_of_idx,
        })
    }

    /// Flatten back into rows (instrument-major, date ascending)
    pub fn rows(&self) -> Vec<PanelRow> {
        let mut rows = Vec::with_capacity(self.num_observations());
        for (inst, series) in self.cells.iter().enumerate() {
            for (date_idx, cell) in series.iter().enumerate() {
                if let (Some(obs), Some(date)) = (cell, self.calendar.date(date_idx)) {
                    rows.push(PanelRow::new(
                        self.instruments[inst].id.clone(),
                        date,
                        obs.clone(),
                    ));
                }
            }
        }
        rows
    }
}

/// Point-in-time slice of a panel as of one calendar position
#[derive(Debug, Clone, Copy)]
pub struct PointInTimeView<'a> {
    panel: &'a Panel,
    as_of_idx: usize,
}

impl<'a> PointInTimeView<'a> {
    /// As-of date
    pub fn date(&self) -> TradingDate {
        self.panel.calendar.dates()[self.as_of_idx]
    }

    /// As-of calendar position
    pub fn index(&self) -> usize {
        self.as_of_idx
    }

    /// Instruments in the underlying panel
    pub fn instruments(&self) -> &'a [Instrument] {
        &self.panel.instruments
    }

    /// Observation at the as-of date
    pub fn current(&self, inst: usize) -> Option<&'a Observation> {
        self.panel.observation_at(inst, self.as_of_idx)
    }

    /// Cells for calendar positions `[t - lookback, t]`, truncated at the start of the calendar
    pub fn window(&self, inst: usize, lookback: usize) -> &'a [Option<Observation>] {
        let start = self.as_of_idx.saturating_sub(lookback);
        &self.panel.cells[inst][start..=self.as_of_idx]
    }
}

/// Builder that validates rows into a `Panel`
#[derive(Debug, Default)]
pub struct PanelBuilder {
    calendar: Option<TradingCalendar>,
    instruments: BTreeMap<InstrumentId, Instrument>,
    rows: Vec<PanelRow>,
}

impl PanelBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit trading calendar; rows on other dates are rejected
    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Register listing metadata for an instrument
    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.insert(instrument.id.clone(), instrument);
        self
    }

    /// Add a row
    pub fn add_row(&mut self, row: PanelRow) -> &mut Self {
        self.rows.push(row);
        self
    }

    /// Add an observation
    pub fn add_observation(
        &mut self,
        id: InstrumentId,
        date: TradingDate,
        obs: Observation,
    ) -> &mut Self {
        self.rows.push(PanelRow::new(id, date, obs));
        self
    }

    /// Add many rows
    pub fn extend_rows<I: IntoIterator<Item = PanelRow>>(mut self, rows: I) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Validate and build the panel
    pub fn build(self) -> Result<Panel> {
        let calendar = match self.calendar {
            Some(calendar) => {
                if let Some(row) = self.rows.iter().find(|r| !calendar.contains(r.date)) {
                    return Err(AlphaError::CalendarMismatch(format!(
                        "{} has a row on {} which is not in the trading calendar",
                        row.instrument_id, row.date
                    )));
                }
                calendar
            }
            None => TradingCalendar::from_unsorted(self.rows.iter().map(|r| r.date)),
        };

        // Listing intervals: explicit metadata wins, otherwise first..=last row
        let mut spans: BTreeMap<InstrumentId, (TradingDate, TradingDate)> = BTreeMap::new();
        for row in &self.rows {
            spans
                .entry(row.instrument_id.clone())
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(row.date);
                    *hi = (*hi).max(row.date);
                })
                .or_insert((row.date, row.date));
        }

        let mut instruments = self.instruments;
        for (id, (lo, hi)) in spans {
            if !instruments.contains_key(&id) {
                let inst = Instrument::new(id.clone(), lo, Some(hi))?;
                instruments.insert(id, inst);
            }
        }

        let instruments: Vec<Instrument> = instruments.into_values().collect();
        let index: HashMap<InstrumentId, usize> = instruments
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.id.clone(), i))
            .collect();

        let mut cells: Vec<Vec<Option<Observation>>> =
            vec![vec![None; calendar.len()]; instruments.len()];

        for row in self.rows {
            let (id, date, obs) = row.into_parts();
            let inst = index[&id];
            if !instruments[inst].is_valid_on(date) {
                return Err(AlphaError::MalformedPanel(format!(
                    "{} has a row on {} outside its listing interval",
                    instruments[inst], date
                )));
            }
            let date_idx = calendar.require_index(date)?;
            let cell = &mut cells[inst][date_idx];
            if cell.is_some() {
                return Err(AlphaError::MalformedPanel(format!(
                    "duplicate row for {} on {}",
                    id, date
                )));
            }
            *cell = Some(obs);
        }

        let panel = Panel {
            calendar,
            instruments,
            index,
            cells,
        };

        log::info!(
            "Built panel: {} instruments x {} trading days ({} observations)",
            panel.num_instruments(),
            panel.calendar.len(),
            panel.num_observations()
        );

        Ok(panel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> TradingDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn id(t: &str) -> InstrumentId {
        InstrumentId::new("SZ", t)
    }

    fn sample_panel() -> Panel {
        let mut builder = Panel::builder();
        for (i, day) in [2, 3, 4, 5].iter().enumerate() {
            builder.add_observation(id("A"), d(*day), Observation::flat(10.0 + i as f64, 100.0));
        }
        builder.add_observation(id("B"), d(2), Observation::flat(20.0, 100.0));
        builder.add_observation(id("B"), d(4), Observation::flat(22.0, 100.0).suspended());
        builder.add_observation(id("B"), d(5), Observation::flat(24.0, 100.0));
        builder.build().unwrap()
    }

    #[test]
    fn test_build_derives_calendar_and_intervals() {
        let panel = sample_panel();
        assert_eq!(panel.calendar().len(), 4);
        assert_eq!(panel.num_instruments(), 2);
        assert_eq!(panel.num_observations(), 7);

        let b = panel.instrument(&id("B")).unwrap();
        assert_eq!(b.listed, d(2));
        assert_eq!(b.delisted, Some(d(5)));
    }

    #[test]
    fn test_missing_rows_are_not_zero() {
        let panel = sample_panel();
        assert!(panel.observation(&id("B"), d(3)).is_none());
        let b = panel.instrument_index(&id("B")).unwrap();
        assert!(!panel.is_tradable_at(b, 1));
        assert!(!panel.is_tradable_at(b, 2));
        assert!(panel.is_tradable_at(b, 3));
    }

    #[test]
    fn test_last_price_skips_suspended_and_missing() {
        let panel = sample_panel();
        let b = panel.instrument_index(&id("B")).unwrap();
        assert_eq!(panel.last_price_at_or_before(b, 2), Some((0, 20.0)));
        assert_eq!(panel.last_price_at_or_before(b, 3), Some((3, 24.0)));
    }

    #[test]
    fn test_forward_return() {
        let panel = sample_panel();
        let a = panel.instrument_index(&id("A")).unwrap();
        assert_eq!(panel.forward_return(a, 0, 1), Some(11.0 / 10.0 - 1.0));
        assert_eq!(panel.forward_return(a, 3, 1), None);

        let b = panel.instrument_index(&id("B")).unwrap();
        assert_eq!(panel.forward_return(b, 0, 2), None); // suspended at the end
    }

    #[test]
    fn test_point_in_time_window_stops_at_as_of() {
        let panel = sample_panel();
        let view = panel.as_of(d(3)).unwrap();
        let a = panel.instrument_index(&id("A")).unwrap();
        let window = view.window(a, 10);
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].as_ref().unwrap().adj_close, 11.0);
    }

    #[test]
    fn test_explicit_calendar_rejects_foreign_dates() {
        let calendar = TradingCalendar::new(vec![d(2), d(3)]).unwrap();
        let mut builder = Panel::builder().with_calendar(calendar);
        builder.add_observation(id("A"), d(4), Observation::flat(10.0, 1.0));
        assert!(matches!(builder.build(), Err(AlphaError::CalendarMismatch(_))));
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let mut builder = Panel::builder();
        builder.add_observation(id("A"), d(2), Observation::flat(10.0, 1.0));
        builder.add_observation(id("A"), d(2), Observation::flat(11.0, 1.0));
        assert!(matches!(builder.build(), Err(AlphaError::MalformedPanel(_))));
    }

    #[test]
    fn test_rows_outside_listing_rejected() {
        let inst = Instrument::new(id("A"), d(3), None).unwrap();
        let mut builder = Panel::builder().with_instrument(inst);
        builder.add_observation(id("A"), d(2), Observation::flat(10.0, 1.0));
        assert!(matches!(builder.build(), Err(AlphaError::MalformedPanel(_))));
    }

    #[test]
    fn test_rows_round_trip() {
        let panel = sample_panel();
        let rebuilt = Panel::builder().extend_rows(panel.rows()).build().unwrap();
        assert_eq!(rebuilt.rows(), panel.rows());
    }
}
