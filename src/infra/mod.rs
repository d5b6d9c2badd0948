//! Infrastructure layer (adapters/implementations).
//!
//! This module contains the patch parser, the syntect highlighter, the worker
//! pool and configuration on disk.

pub mod app_config;
pub mod diff;
pub mod hash;
pub mod highlight;
pub mod worker;
