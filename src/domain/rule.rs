//! Rule AST data structures.
//!
//! This module defines the typed tree produced by the rule parser:
//! - `Direction`: Which crossing or breakout side a rule listens for
//! - `Comparator`: Threshold comparison operator
//! - `Trend`: Outcome of a `direction` rule
//! - `RuleSpec`: Leaf primitives and the `all_of` / `any_of` combinators
//!
//! Leaves read series exclusively through [`SeriesRef`]s.

use crate::domain::error::BreadthscanError;
use crate::domain::series::SeriesRef;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Both,
}

impl Direction {
    pub fn accepts_up(self) -> bool {
        matches!(self, Direction::Up | Direction::Both)
    }

    pub fn accepts_down(self) -> bool {
        matches!(self, Direction::Down | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Both => "both",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    pub fn holds(self, value: f64, level: f64) -> bool {
        match self {
            Comparator::Gt => value > level,
            Comparator::Ge => value >= level,
            Comparator::Lt => value < level,
            Comparator::Le => value <= level,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    pub fn between(earlier: f64, current: f64) -> Self {
        if current > earlier {
            Trend::Up
        } else if current < earlier {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Flat => "flat",
            Trend::Down => "down",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleSpec {
    CrossoverLevel {
        series: SeriesRef,
        level: f64,
        direction: Direction,
    },
    CrossoverSeries {
        left: SeriesRef,
        right: SeriesRef,
        direction: Direction,
    },
    Threshold {
        series: SeriesRef,
        op: Comparator,
        level: f64,
    },
    Direction {
        series: SeriesRef,
        lookback: usize,
        only: Option<Trend>,
    },
    BreakoutExtreme {
        series: SeriesRef,
        window: usize,
        direction: Direction,
    },
    StreakGate {
        series: SeriesRef,
        op: Comparator,
        level: f64,
        min_consecutive: usize,
    },
    AllOf(Vec<RuleSpec>),
    AnyOf(Vec<RuleSpec>),
}

impl RuleSpec {
    /// Variant tag, used as the base of emitted signal types.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleSpec::CrossoverLevel { .. } => "crossover_level",
            RuleSpec::CrossoverSeries { .. } => "crossover_series",
            RuleSpec::Threshold { .. } => "threshold",
            RuleSpec::Direction { .. } => "direction",
            RuleSpec::BreakoutExtreme { .. } => "breakout_extreme",
            RuleSpec::StreakGate { .. } => "streak_gate",
            RuleSpec::AllOf(_) => "all_of",
            RuleSpec::AnyOf(_) => "any_of",
        }
    }

    /// Every series reference in the tree, in order of first appearance.
    pub fn series_refs(&self) -> Vec<&SeriesRef> {
        let mut refs = Vec::new();
        let mut seen = BTreeSet::new();
        self.collect_refs(&mut refs, &mut seen);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a SeriesRef>, seen: &mut BTreeSet<&'a SeriesRef>) {
        match self {
            RuleSpec::AllOf(children) | RuleSpec::AnyOf(children) => {
                for child in children {
                    child.collect_refs(refs, seen);
                }
            }
            leaf => {
                for series_ref in leaf.leaf_refs() {
                    if seen.insert(series_ref) {
                        refs.push(series_ref);
                    }
                }
            }
        }
    }

    fn leaf_refs(&self) -> Vec<&SeriesRef> {
        match self {
            RuleSpec::CrossoverLevel { series, .. }
            | RuleSpec::Threshold { series, .. }
            | RuleSpec::Direction { series, .. }
            | RuleSpec::BreakoutExtreme { series, .. }
            | RuleSpec::StreakGate { series, .. } => vec![series],
            RuleSpec::CrossoverSeries { left, right, .. } => vec![left, right],
            RuleSpec::AllOf(_) | RuleSpec::AnyOf(_) => vec![],
        }
    }

    /// Instance of the first referenced series; signals are attributed to it.
    pub fn primary_instance(&self) -> Option<&str> {
        self.series_refs()
            .first()
            .map(|r| r.instance_id.as_str())
    }

    /// Check every reference against the series each instance declares.
    pub fn validate_refs(
        &self,
        declared: &BTreeMap<String, Vec<&'static str>>,
    ) -> Result<(), BreadthscanError> {
        for series_ref in self.series_refs() {
            let names = declared.get(&series_ref.instance_id).ok_or_else(|| {
                BreadthscanError::RuleInvalid {
                    reason: format!("unknown indicator instance '{}'", series_ref.instance_id),
                }
            })?;
            if !names.iter().any(|name| *name == series_ref.series_name) {
                return Err(BreadthscanError::RuleInvalid {
                    reason: format!(
                        "instance '{}' does not emit series '{}' (available: {})",
                        series_ref.instance_id,
                        series_ref.series_name,
                        names.join(", ")
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A configured rule: its name and parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRule {
    pub name: String,
    pub spec: RuleSpec,
}
