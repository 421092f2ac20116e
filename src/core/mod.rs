/*!
 * Core Module
 * Fundamental shared types
 */

pub mod types;

pub use types::*;
