//! Portfolio constructor: factor scores to constrained long-only weights

pub mod constraints;
pub mod constructor;
pub mod turnover;
pub mod weights;

pub use constraints::{Constraints, WeightingScheme};
pub use constructor::PortfolioConstructor;
pub use turnover::{clip_turnover, water_level};
pub use weights::{turnover, PortfolioWeights, Relaxation, WeightRecord};
