//! Rule evaluation engine.
//!
//! Evaluates a [`RuleSpec`] against one ticker's [`SeriesCatalog`] and returns
//! every date on which it fires.
//!
//! # Evaluation Semantics
//!
//! - Leaves run over the aligned frame of their own references; "previous"
//!   and "consecutive" mean neighbouring points of that frame
//! - Crossovers need a previous point; a value resting on the level is not a cross
//! - `all_of`: fires on a date only when every child fires on that date
//! - `any_of`: fires on a date when at least one child fires on it
//! - Composite hits are kept only on dates where every series the composite
//!   references is valid

use crate::domain::catalog::{CatalogMiss, SeriesCatalog};
use crate::domain::rule::{Comparator, Direction, RuleSpec, Trend};
use crate::domain::series::SeriesRef;
use crate::domain::series_math::{align, AlignedFrame};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One firing of a rule on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub signal_type: String,
    pub metadata: Map<String, Value>,
}

impl Hit {
    fn new(signal_type: impl Into<String>) -> Self {
        Self {
            signal_type: signal_type.into(),
            metadata: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub type Hits = BTreeMap<NaiveDate, Hit>;

pub fn evaluate(rule: &RuleSpec, catalog: &SeriesCatalog) -> Result<Hits, CatalogMiss> {
    match rule {
        RuleSpec::CrossoverLevel {
            series,
            level,
            direction,
        } => {
            let frame = frame_for(catalog, &[series])?;
            Ok(crossings(
                &frame.dates,
                frame.column(0),
                *level,
                *direction,
                "crossover_level",
                |hit, i| {
                    hit.with("value", frame.column(0)[i])
                        .with("previous", frame.column(0)[i - 1])
                        .with("level", *level)
                },
            ))
        }
        RuleSpec::CrossoverSeries {
            left,
            right,
            direction,
        } => {
            let frame = frame_for(catalog, &[left, right])?;
            let spread: Vec<f64> = frame
                .column(0)
                .iter()
                .zip(frame.column(1))
                .map(|(l, r)| l - r)
                .collect();
            Ok(crossings(
                &frame.dates,
                &spread,
                0.0,
                *direction,
                "crossover_series",
                |hit, i| {
                    hit.with("left", frame.column(0)[i])
                        .with("right", frame.column(1)[i])
                        .with("value", spread[i])
                        .with("previous", spread[i - 1])
                },
            ))
        }
        RuleSpec::Threshold { series, op, level } => {
            let frame = frame_for(catalog, &[series])?;
            Ok(frame
                .dates
                .iter()
                .zip(frame.column(0))
                .filter(|(_, value)| op.holds(**value, *level))
                .map(|(&date, &value)| {
                    let hit = Hit::new("threshold")
                        .with("value", value)
                        .with("level", *level)
                        .with("op", op.symbol());
                    (date, hit)
                })
                .collect())
        }
        RuleSpec::Direction {
            series,
            lookback,
            only,
        } => {
            let frame = frame_for(catalog, &[series])?;
            Ok(trend_changes(&frame, *lookback, *only))
        }
        RuleSpec::BreakoutExtreme {
            series,
            window,
            direction,
        } => {
            let frame = frame_for(catalog, &[series])?;
            Ok(breakout(&frame, *window, *direction))
        }
        RuleSpec::StreakGate {
            series,
            op,
            level,
            min_consecutive,
        } => {
            let frame = frame_for(catalog, &[series])?;
            Ok(streak(&frame, *op, *level, *min_consecutive))
        }
        RuleSpec::AllOf(children) => {
            let child_hits = evaluate_children(children, catalog)?;
            let Some((first, rest)) = child_hits.split_first() else {
                return Ok(Hits::new());
            };
            let mut hits = Hits::new();
            for date in first.keys() {
                if rest.iter().all(|child| child.contains_key(date)) {
                    let types = child_hits.iter().map(|child| child[date].signal_type.clone());
                    hits.insert(*date, composite("all_of", types));
                }
            }
            restrict_to_frame(rule, catalog, hits)
        }
        RuleSpec::AnyOf(children) => {
            let child_hits = evaluate_children(children, catalog)?;
            let dates: BTreeSet<NaiveDate> = child_hits
                .iter()
                .flat_map(|child| child.keys().copied())
                .collect();
            let hits = dates
                .into_iter()
                .map(|date| {
                    let types = child_hits
                        .iter()
                        .filter_map(|child| child.get(&date))
                        .map(|hit| hit.signal_type.clone());
                    (date, composite("any_of", types))
                })
                .collect();
            restrict_to_frame(rule, catalog, hits)
        }
    }
}

fn frame_for(catalog: &SeriesCatalog, refs: &[&SeriesRef]) -> Result<AlignedFrame, CatalogMiss> {
    let inputs = refs
        .iter()
        .map(|series_ref| catalog.lookup(series_ref))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(align(&inputs))
}

fn crossings<F>(
    dates: &[NaiveDate],
    values: &[f64],
    level: f64,
    direction: Direction,
    kind: &str,
    describe: F,
) -> Hits
where
    F: Fn(Hit, usize) -> Hit,
{
    let mut hits = Hits::new();
    for i in 1..values.len() {
        let (prev, curr) = (values[i - 1], values[i]);
        let side = if direction.accepts_up() && prev <= level && curr > level {
            "up"
        } else if direction.accepts_down() && prev >= level && curr < level {
            "down"
        } else {
            continue;
        };
        hits.insert(dates[i], describe(Hit::new(format!("{}_{}", kind, side)), i));
    }
    hits
}

fn trend_changes(frame: &AlignedFrame, lookback: usize, only: Option<Trend>) -> Hits {
    let values = frame.column(0);
    let mut hits = Hits::new();
    for i in lookback..values.len() {
        let trend = Trend::between(values[i - lookback], values[i]);
        if only.is_some_and(|wanted| wanted != trend) {
            continue;
        }
        let hit = Hit::new(format!("direction_{}", trend.as_str()))
            .with("value", values[i])
            .with("previous", values[i - lookback])
            .with("trend", trend.as_str());
        hits.insert(frame.dates[i], hit);
    }
    hits
}

fn breakout(frame: &AlignedFrame, window: usize, direction: Direction) -> Hits {
    let values = frame.column(0);
    let mut hits = Hits::new();
    for i in window..values.len() {
        let preceding = &values[i - window..i];
        let max = preceding.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = preceding.iter().copied().fold(f64::INFINITY, f64::min);
        let curr = values[i];

        let (side, extreme) = if direction.accepts_up() && curr > max {
            ("up", max)
        } else if direction.accepts_down() && curr < min {
            ("down", min)
        } else {
            continue;
        };
        let hit = Hit::new(format!("breakout_extreme_{}", side))
            .with("value", curr)
            .with("extreme", extreme);
        hits.insert(frame.dates[i], hit);
    }
    hits
}

fn streak(frame: &AlignedFrame, op: Comparator, level: f64, min_consecutive: usize) -> Hits {
    let mut hits = Hits::new();
    let mut run = 0usize;
    for (&date, &value) in frame.dates.iter().zip(frame.column(0)) {
        if op.holds(value, level) {
            run += 1;
        } else {
            run = 0;
        }
        if run == min_consecutive {
            let hit = Hit::new("streak_gate")
                .with("value", value)
                .with("level", level)
                .with("streak", run);
            hits.insert(date, hit);
        }
    }
    hits
}

fn evaluate_children(
    children: &[RuleSpec],
    catalog: &SeriesCatalog,
) -> Result<Vec<Hits>, CatalogMiss> {
    children
        .iter()
        .map(|child| evaluate(child, catalog))
        .collect()
}

fn composite(kind: &str, child_types: impl Iterator<Item = String>) -> Hit {
    let children: Vec<Value> = child_types.map(Value::String).collect();
    Hit::new(kind).with("children", children)
}

fn restrict_to_frame(
    rule: &RuleSpec,
    catalog: &SeriesCatalog,
    mut hits: Hits,
) -> Result<Hits, CatalogMiss> {
    let frame = frame_for(catalog, &rule.series_refs())?;
    let valid: BTreeSet<NaiveDate> = frame.dates.into_iter().collect();
    hits.retain(|date, _| valid.contains(date));
    Ok(hits)
}
