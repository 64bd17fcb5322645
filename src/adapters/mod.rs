//! Infrastructure adapters. Implement outbound ports, drive inbound ones.
//!
//! Storage and interactive UI. Map errors to DomainError.

pub mod persistence;
pub mod ui;
