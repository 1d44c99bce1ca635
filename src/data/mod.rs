//! Panel store: immutable, point-in-time-correct market data

pub mod io;
pub mod panel;
pub mod sector;

pub use io::{load_panel_csv, read_csv, read_json, read_panel_csv, write_csv, write_json};
pub use panel::{Panel, PanelBuilder, PanelRow, PointInTimeView};
pub use sector::SectorMap;
