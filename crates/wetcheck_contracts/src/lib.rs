#![forbid(unsafe_code)]

pub mod audit;
pub mod auth;
pub mod common;
pub mod record;
pub mod stored;

pub use common::{
    ContractViolation, IsoUtcTimestamp, ReasonCodeId, SchemaVersion, Validate,
};
