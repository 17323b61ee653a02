//! Core domain types and logic.

pub mod breadth;
pub mod cache;
pub mod catalog;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod issue;
pub mod price;
pub mod rule;
pub mod rule_eval;
pub mod rule_parser;
pub mod scan;
pub mod scan_config;
pub mod series;
pub mod series_math;
pub mod signal;
pub mod summary;
pub mod universe;
