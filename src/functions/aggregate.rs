//! Aggregate accumulators
//!
//! Each aggregate is registered twice: a read method (`Sum`) that yields the
//! group's result and an accumulate method (`SetSum`) that is called once
//! per source row. Both share one accumulator per group.

use std::fmt;

use crate::error::{Error, ErrorCode, Result};
use crate::types::Value;

// ============================================================================
// Accumulator Trait
// ============================================================================

/// Per-group aggregation state
pub trait Accumulator: fmt::Debug {
    /// Fold one row's arguments into the state
    fn accumulate(&mut self, args: &[Value]) -> Result<()>;

    /// Current result of the aggregation
    fn finish(&self) -> Value;
}

/// Constructor for a fresh accumulator
pub type AccumulatorFactory = fn() -> Box<dyn Accumulator>;

fn first_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    args.first().ok_or_else(|| {
        Error::with_message(ErrorCode::KindMismatch, format!("{} expects an argument", name))
    })
}

fn numeric_arg(name: &str, args: &[Value]) -> Result<f64> {
    let value = first_arg(name, args)?;
    value.as_f64().ok_or_else(|| {
        Error::with_message(
            ErrorCode::KindMismatch,
            format!("{} expects a numeric argument, got {}", name, value.column_type()),
        )
    })
}

// ============================================================================
// COUNT
// ============================================================================

#[derive(Debug, Default)]
pub struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn accumulate(&mut self, _args: &[Value]) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Integer(self.count)
    }
}

pub fn new_count() -> Box<dyn Accumulator> {
    Box::<CountAccumulator>::default()
}

// ============================================================================
// SUM / AVG
// ============================================================================

#[derive(Debug, Default)]
pub struct SumAccumulator {
    sum: f64,
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<()> {
        self.sum += numeric_arg("SetSum", args)?;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Real(self.sum)
    }
}

pub fn new_sum() -> Box<dyn Accumulator> {
    Box::<SumAccumulator>::default()
}

#[derive(Debug, Default)]
pub struct AvgAccumulator {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<()> {
        self.sum += numeric_arg("SetAvg", args)?;
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count == 0 {
            Value::Real(0.0)
        } else {
            Value::Real(self.sum / self.count as f64)
        }
    }
}

pub fn new_avg() -> Box<dyn Accumulator> {
    Box::<AvgAccumulator>::default()
}

// ============================================================================
// MIN / MAX
// ============================================================================

#[derive(Debug, Default)]
pub struct MinAccumulator {
    value: Option<f64>,
}

impl Accumulator for MinAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<()> {
        let v = numeric_arg("SetMin", args)?;
        self.value = Some(self.value.map_or(v, |cur| cur.min(v)));
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Real(self.value.unwrap_or(0.0))
    }
}

pub fn new_min() -> Box<dyn Accumulator> {
    Box::<MinAccumulator>::default()
}

#[derive(Debug, Default)]
pub struct MaxAccumulator {
    value: Option<f64>,
}

impl Accumulator for MaxAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<()> {
        let v = numeric_arg("SetMax", args)?;
        self.value = Some(self.value.map_or(v, |cur| cur.max(v)));
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Real(self.value.unwrap_or(0.0))
    }
}

pub fn new_max() -> Box<dyn Accumulator> {
    Box::<MaxAccumulator>::default()
}

// ============================================================================
// AGGREGATE VALUES
// ============================================================================

/// Concatenates every value of the group, comma separated
#[derive(Debug, Default)]
pub struct AggregateValuesAccumulator {
    values: Vec<String>,
}

impl Accumulator for AggregateValuesAccumulator {
    fn accumulate(&mut self, args: &[Value]) -> Result<()> {
        let value = first_arg("SetAggregateValues", args)?;
        self.values.push(value.to_string());
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Text(self.values.join(","))
    }
}

pub fn new_aggregate_values() -> Box<dyn Accumulator> {
    Box::<AggregateValuesAccumulator>::default()
}
