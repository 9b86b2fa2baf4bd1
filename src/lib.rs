//! Core library for working with [OCFL](https://ocfl.io/) objects: the
//! inventory data model and its validation, a resumable and revertible
//! commit engine, and a full object validator, all over a pluggable storage
//! backend.
//!
//! Everything lives in the [`ocfl`] module.

pub mod ocfl;
