//! Point-in-time sector classification

use crate::data::panel::Panel;
use crate::instrument::InstrumentId;
use crate::types::{SectorId, TradingDate};
use hashbrown::HashMap;

/// Sector membership per instrument, with effective dates
///
/// Each instrument carries a list of `(effective_from, sector)` entries sorted by
/// date; the sector on a date is the latest entry effective on or before it.
#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    history: HashMap<InstrumentId, Vec<(TradingDate, SectorId)>>,
}

impl SectorMap {
    /// Create an empty sector map
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a sector valid for all dates
    pub fn insert(&mut self, id: InstrumentId, sector: impl Into<SectorId>) -> &mut Self {
        self.insert_effective(id, TradingDate::MIN, sector)
    }

    /// Assign a sector effective from `from` onwards
    pub fn insert_effective(
        &mut self,
        id: InstrumentId,
        from: TradingDate,
        sector: impl Into<SectorId>,
    ) -> &mut Self {
        let entries = self.history.entry(id).or_default();
        let sector = sector.into();
        match entries.binary_search_by(|(d, _)| d.cmp(&from)) {
            Ok(pos) => entries[pos].1 = sector,
            Err(pos) => entries.insert(pos, (from, sector)),
        }
        self
    }

    /// Build from the `sector_id` column of a panel, recording reclassifications
    pub fn from_panel(panel: &Panel) -> Self {
        let mut map = Self::new();
        for row in panel.rows() {
            if let Some(sector) = row.sector_id {
                let current = map.sector_of(&row.instrument_id, row.date).cloned();
                if current.as_ref() != Some(&sector) {
                    map.insert_effective(row.instrument_id, row.date, sector);
                }
            }
        }
        map
    }

    /// Sector of an instrument as of `date`
    pub fn sector_of(&self, id: &InstrumentId, date: TradingDate) -> Option<&SectorId> {
        let entries = self.history.get(id)?;
        let pos = entries.partition_point(|(d, _)| *d <= date);
        pos.checked_sub(1).map(|i| &entries[i].1)
    }

    /// Number of instruments with a classification
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
