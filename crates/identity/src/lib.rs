//! Identity resolution: advisory linkage between provider contact
//! identifiers and known client records.
//!
//! Matching is a scored comparison over normalized phone keys with a
//! confidence threshold; low-confidence and ambiguous cases stay unlinked
//! rather than guessing. Resolution never blocks chat creation.

pub mod directory;
pub mod error;
pub mod normalize;
pub mod resolve;

pub use {
    directory::{ContactDirectory, ContactRecord, SqliteContactDirectory},
    error::{Error, Result},
    normalize::normalize_phone,
    resolve::PhoneLinker,
};
