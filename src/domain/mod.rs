//! Domain layer for TSQL Guardian
//!
//! CDD Principle: Domain Model - Pure business logic for SQL script linting
//! - Contains the violation record, its ordering and the run-level report aggregate
//! - Independent of parsing, file system and presentation concerns
//! - Expresses the ubiquitous language of rules, findings and severities

pub mod violations;

// Re-export main domain types for convenience
pub use violations::*;
