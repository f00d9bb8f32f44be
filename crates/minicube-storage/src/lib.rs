//! MiniCube Storage Engine
//!
//! In-memory analytical storage providing:
//! - Columnar fact tables built through a two-phase builder
//! - Inverted bitmap indexes over dimension values
//! - Cube engine for sum / group-sum / distinct aggregation
//! - Row source contract and loaders

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod columnar;
pub mod filter;
pub mod index;
pub mod schema;
pub mod source;

mod engine;
mod parallel;

pub use columnar::builder::{DerivedDimension, FactTableBuilder};
pub use columnar::{FactTable, TableStats};
pub use engine::{round_indicator, CubeEngine, INDICATOR_SCALE};
pub use filter::DimFilter;
pub use index::{BitmapIndex, DistinctSet};
pub use parallel::init_worker_pool;
pub use schema::Schema;

/// Re-exported so callers build indicator values with the same decimal type
pub use bigdecimal::BigDecimal;
