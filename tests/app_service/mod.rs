//! # tests/app_service/mod.rs
//!
//! Deklariert die Sub-Module für die Fassaden-Tests.

mod fill_and_results;
mod key_workflows;
mod lifecycle;
