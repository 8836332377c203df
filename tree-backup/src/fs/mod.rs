//! Filesystem helpers: tree walking and free-space checks.

pub mod space;
pub mod walker;
