pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod storage;
pub mod telemetry;
pub mod tenancy;
pub mod validation;
pub mod workflows;
