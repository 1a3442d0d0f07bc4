//! Common types and utilities shared across the cmip-ensembles crates.

pub mod error;
pub mod key;
pub mod mip;
pub mod time;

pub use error::{CmipError, CmipResult};
pub use key::DatasetKey;
pub use mip::MipId;
pub use time::{
    decode_cf_times, replace_dates, truncate_to_month, Calendar, CfDate, CfTimeUnits, TimeSlice,
    TimeUnit,
};
