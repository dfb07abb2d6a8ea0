//! CLI command implementations.

pub mod input;
pub mod inspect;
pub mod output;
pub mod verify;
