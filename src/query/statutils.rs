//! Post-aggregate window calculators: moving averages, sums and deviations
//! computed over result records.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::{debug, trace};

use super::drilldown::Drilldown;
use super::{Record, SPLIT_DIMENSION_NAME};
use crate::error::{QueryError, QueryResult};
use crate::model::{Cube, MeasureAggregate};

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Mean and sample variance; the variance of fewer than two values is 0.
fn mean_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, squares / (n - 1.0))
}

pub fn weighted_moving_average(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let denominator = n * (n + 1.0) / 2.0;
    let total: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i + 1) as f64 * v)
        .sum();
    round_to(total / denominator, 4)
}

pub fn simple_moving_average(values: &[f64]) -> f64 {
    round_to(values.iter().sum::<f64>() / values.len() as f64, 2)
}

pub fn simple_moving_sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn simple_relative_stdev(values: &[f64]) -> f64 {
    let (mean, variance) = mean_variance(values);
    if mean > 0.0 {
        round_to(variance.sqrt() / mean, 4)
    } else {
        0.0
    }
}

pub fn simple_variance(values: &[f64]) -> f64 {
    round_to(mean_variance(values).1, 2)
}

pub fn simple_stdev(values: &[f64]) -> f64 {
    round_to(mean_variance(values).1.sqrt(), 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    WeightedMovingAverage,
    SimpleMovingAverage,
    SimpleMovingSum,
    MovingStdev,
    MovingRelativeStdev,
    MovingVariance,
}

impl WindowFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "wma" => Some(Self::WeightedMovingAverage),
            "sma" => Some(Self::SimpleMovingAverage),
            "sms" => Some(Self::SimpleMovingSum),
            "smstd" => Some(Self::MovingStdev),
            "smrsd" => Some(Self::MovingRelativeStdev),
            "smvar" => Some(Self::MovingVariance),
            _ => None,
        }
    }

    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            Self::WeightedMovingAverage => weighted_moving_average(values),
            Self::SimpleMovingAverage => simple_moving_average(values),
            Self::SimpleMovingSum => simple_moving_sum(values),
            Self::MovingStdev => simple_stdev(values),
            Self::MovingRelativeStdev => simple_relative_stdev(values),
            Self::MovingVariance => simple_variance(values),
        }
    }

    /// Display label of the function applied to `measure`.
    pub fn label(self, measure: &str) -> String {
        let prefix = match self {
            Self::WeightedMovingAverage => "Weighted Moving Avg.",
            Self::SimpleMovingAverage => "Simple Moving Avg.",
            Self::SimpleMovingSum => "Simple Moving Sum",
            Self::MovingStdev => "Moving Std. Deviation",
            Self::MovingRelativeStdev => "Moving Relative St. Dev.",
            Self::MovingVariance => "Moving Variance",
        };
        format!("{} of {}", prefix, measure)
    }
}

/// Window function state over a stream of records.
///
/// Values of `source` are collected per window key into a queue of at most
/// `window_size` values; every record gets the function of its queue stored
/// under `target`. Groups may interleave.
#[derive(Debug, Clone)]
pub struct WindowCalculator {
    function: WindowFunction,
    target: String,
    source: String,
    window_size: usize,
    window_key: Vec<String>,
    windows: HashMap<Vec<String>, VecDeque<f64>>,
}

impl WindowCalculator {
    pub fn new(
        function: WindowFunction,
        target: &str,
        source: &str,
        window_size: usize,
        window_key: Vec<String>,
    ) -> QueryResult<Self> {
        if window_size < 1 {
            return Err(QueryError::argument("Window size should be >= 1"));
        }
        Ok(Self {
            function,
            target: target.into(),
            source: source.into(),
            window_size,
            window_key,
            windows: HashMap::new(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn window_key(&self) -> &[String] {
        &self.window_key
    }

    pub fn calculate(&mut self, record: &mut Record) {
        let key: Vec<String> = self
            .window_key
            .iter()
            .map(|k| record.get(k).map(Value::to_string).unwrap_or_default())
            .collect();
        let values = self
            .windows
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.window_size));

        if let Some(value) = record.get(&self.source).and_then(Value::as_f64) {
            if values.len() == self.window_size {
                values.pop_front();
            }
            values.push_back(value);
        }

        if !values.is_empty() {
            let result = self.function.apply(values.make_contiguous());
            trace!(target_attribute = %self.target, result, "window value");
            record.insert(self.target.clone(), Value::from(result));
        }
    }
}

/// Window size of `aggregate` and the drilldown key references its windows
/// are grouped by.
///
/// The size is the aggregate's own, else the `aggregation_units` of a drilled
/// level, else 1. Items without `aggregation_units` become part of the key.
fn window_parameters(
    aggregate: &MeasureAggregate,
    drilldown: &Drilldown,
    split: bool,
) -> QueryResult<(usize, Vec<String>)> {
    let mut key = Vec::new();
    if split {
        key.push(SPLIT_DIMENSION_NAME.to_string());
    }

    let mut size = aggregate.window_size;
    for item in drilldown {
        let units = item.deepest_level().and_then(|l| l.aggregation_units());
        match units {
            Some(units) if aggregate.window_size.is_none() => size = Some(units),
            Some(_) => {}
            None => key.extend(item.keys.iter().cloned()),
        }
    }

    let size = size.unwrap_or(1);
    if size < 1 {
        return Err(QueryError::model(format!(
            "Window size for aggregate '{}' should be an integer greater than or equal 1",
            aggregate.name
        )));
    }
    Ok((size, key))
}

/// Calculators of the post-aggregate (window function) aggregates.
pub fn calculators_for_aggregates(
    cube: &Cube,
    aggregates: &[&MeasureAggregate],
    drilldown: &Drilldown,
    split: bool,
) -> QueryResult<Vec<WindowCalculator>> {
    let mut calculators = Vec::new();

    for aggregate in aggregates {
        let measure = aggregate.measure.as_deref().ok_or_else(|| {
            QueryError::Internal(format!(
                "No measure specified for aggregate '{}' in cube '{}'",
                aggregate.name, cube.name
            ))
        })?;
        let function_name = aggregate.function.as_deref().ok_or_else(|| {
            QueryError::argument(format!(
                "No post-calculation function for aggregate '{}'",
                aggregate.name
            ))
        })?;
        let function = WindowFunction::from_name(function_name).ok_or_else(|| {
            QueryError::argument(format!(
                "Unknown post-calculation function '{}' for aggregate '{}'",
                function_name, aggregate.name
            ))
        })?;

        let source = match cube.aggregate(measure) {
            Ok(source) => source.name.clone(),
            Err(_) => cube.measure(measure)?.name.clone(),
        };
        let (size, key) = window_parameters(aggregate, drilldown, split)?;
        debug!(
            aggregate = %aggregate.name,
            source = %source,
            window_size = size,
            window_key = ?key,
            "registered window calculator"
        );
        calculators.push(WindowCalculator::new(function, &aggregate.name, &source, size, key)?);
    }

    Ok(calculators)
}
