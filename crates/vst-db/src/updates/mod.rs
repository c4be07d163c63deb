//! Update builder types for item mutations.
//!
//! Each builder produces an update struct with `Option` fields. Only `Some`
//! fields are copied onto the stored record inside the update transaction.

pub mod item;
