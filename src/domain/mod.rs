//! Domain layer - investment transactions and gas tracking

pub mod gas;
pub mod transaction;
