//! Factor engine: declarative transforms evaluated point-in-time over a panel

pub mod engine;
pub mod factor_panel;
pub mod factors;
pub mod normalize;
pub mod transform;

pub use engine::{compute_factor, FactorEngine};
pub use factor_panel::{CrossSection, FactorPanel, FactorRecord, OmissionReason};
pub use factors::{
    build_factor, AverageVolume, Factor, FactorOutcome, HistoricalVolatility, Momentum,
    MovingAverageGap, Reversal,
};
pub use transform::{Formula, PostProcess, TransformSpec};
