//! Application layer (use-cases, policies).
//!
//! Turns parsed diffs and highlight results into display rows without
//! depending on any particular front end.

pub mod render;
