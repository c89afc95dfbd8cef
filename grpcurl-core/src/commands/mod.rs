//! The three CLI verbs: `list`, `describe`, and `invoke`.

pub mod describe;
pub mod invoke;
pub mod list;
