//! Local I/O resilience helpers.

pub mod retry;
