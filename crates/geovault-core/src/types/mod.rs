//! Shared validation types and helpers.

pub mod checksum;
pub mod name;
