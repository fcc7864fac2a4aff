//! Outer surfaces: CSV command scripts and the account report.

pub mod csv;
pub mod script;
