//! # src/models/mod.rs
//!
//! Die Datenstrukturen der Bibliothek: Schlüsselmaterial, das Format
//! verschlüsselter Nachrichten, Einsendungen und lokal gespeicherte Datensätze.

pub mod keys;
pub mod records;
pub mod sealed_message;
pub mod submission;
