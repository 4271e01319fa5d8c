//! Named statistic functions applied to the attribute values of a zone
//!
//! Built-ins: `mean`, `median`, `sd` (sample), `min`, `max`, `sum`, `range`.
//! Custom functions receive the zone's values with missing entries removed
//! and must return exactly one value.

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crowntrace_core::{Error, Result};

/// Signature of a statistic: values in, one value out
pub type StatisticFn = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// Names of the statistics computed when none are requested
pub const DEFAULT_STATISTICS: [&str; 5] = ["mean", "median", "sd", "min", "max"];

// Used to reject custom functions at registration time.
const PROBE: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 10.0];

/// A named statistic
#[derive(Clone)]
pub struct Statistic {
    name: String,
    func: StatisticFn,
}

impl Statistic {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply to values that are already free of missing entries.
    ///
    /// Empty input is missing without calling the function; so is a
    /// non-finite result.
    pub fn evaluate(&self, values: &[f64]) -> Result<Option<f64>> {
        if values.is_empty() {
            return Ok(None);
        }
        let out = (self.func)(values);
        match out.as_slice() {
            [v] => Ok(v.is_finite().then_some(*v)),
            other => Err(Error::InvalidStatistic {
                name: self.name.clone(),
                reason: format!("returned {} values instead of 1", other.len()),
            }),
        }
    }
}

impl fmt::Debug for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statistic").field(&self.name).finish()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

fn sample_sd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn builtin(name: &str) -> Option<fn(&[f64]) -> f64> {
    let f: fn(&[f64]) -> f64 = match name {
        "mean" => mean,
        "median" => median,
        "sd" => sample_sd,
        "min" => min,
        "max" => max,
        "sum" => |v| v.iter().sum(),
        "range" => |v| max(v) - min(v),
        _ => return None,
    };
    Some(f)
}

/// Ordered set of named statistics.
///
/// Serializes as the list of names; only built-ins can be deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StatisticTable {
    stats: Vec<Statistic>,
}

impl StatisticTable {
    /// Table with no statistics (count only)
    pub fn empty() -> Self {
        Self { stats: Vec::new() }
    }

    /// Table of built-in statistics by name
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut table = Self::empty();
        for name in names {
            table.add_builtin(name.as_ref())?;
        }
        Ok(table)
    }

    /// Append a built-in statistic
    pub fn add_builtin(&mut self, name: &str) -> Result<()> {
        let f = builtin(name).ok_or_else(|| Error::InvalidStatistic {
            name: name.to_string(),
            reason: "unknown built-in statistic".into(),
        })?;
        self.insert(name, Arc::new(move |v: &[f64]| vec![f(v)]))
    }

    /// Register a custom statistic.
    ///
    /// The function is probed once on sample values; a result of anything
    /// other than exactly one value is rejected.
    pub fn register<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        let produced = f(&PROBE).len();
        if produced != 1 {
            return Err(Error::InvalidStatistic {
                name: name.to_string(),
                reason: format!("must return a single value, returned {}", produced),
            });
        }
        self.insert(name, Arc::new(f))
    }

    /// Register a custom statistic that always returns one value
    pub fn register_scalar<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(move |v: &[f64]| vec![f(v)]))
    }

    fn insert(&mut self, name: &str, func: StatisticFn) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidStatistic {
                name: name.to_string(),
                reason: "statistic name is empty".into(),
            });
        }
        if self.stats.iter().any(|s| s.name == name) {
            return Err(Error::InvalidStatistic {
                name: name.to_string(),
                reason: "statistic registered twice".into(),
            });
        }
        self.stats.push(Statistic {
            name: name.to_string(),
            func,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statistic> {
        self.stats.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.stats.iter().map(|s| s.name.clone()).collect()
    }
}

impl Default for StatisticTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for name in DEFAULT_STATISTICS {
            if let Some(f) = builtin(name) {
                table.stats.push(Statistic {
                    name: name.to_string(),
                    func: Arc::new(move |v: &[f64]| vec![f(v)]),
                });
            }
        }
        table
    }
}

impl TryFrom<Vec<String>> for StatisticTable {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::from_names(&names)
    }
}

impl From<StatisticTable> for Vec<String> {
    fn from(table: StatisticTable) -> Self {
        table.names()
    }
}

/// Output name of a statistic for an attribute: `height` + `sd` → `heightSd`
pub fn composite_name(attribute: &str, statistic: &str) -> String {
    let mut chars = statistic.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", attribute, first.to_uppercase(), chars.as_str()),
        None => attribute.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(table: &StatisticTable, name: &str, values: &[f64]) -> Option<f64> {
        table
            .iter()
            .find(|s| s.name() == name)
            .unwrap()
            .evaluate(values)
            .unwrap()
    }

    #[test]
    fn test_default_table() {
        let table = StatisticTable::default();
        assert_eq!(table.names(), vec!["mean", "median", "sd", "min", "max"]);

        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(eval(&table, "mean", &v).unwrap(), 5.0);
        assert_relative_eq!(eval(&table, "median", &v).unwrap(), 4.5);
        assert_relative_eq!(eval(&table, "sd", &v).unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert_eq!(eval(&table, "min", &v), Some(2.0));
        assert_eq!(eval(&table, "max", &v), Some(9.0));
    }

    #[test]
    fn test_empty_input_is_missing() {
        let mut table = StatisticTable::default();
        table
            .register_scalar("first", |v| {
                assert!(!v.is_empty(), "called on empty input");
                v[0]
            })
            .unwrap();
        for stat in table.iter() {
            assert_eq!(stat.evaluate(&[]).unwrap(), None);
        }
    }

    #[test]
    fn test_single_value_sd_missing() {
        let table = StatisticTable::default();
        assert_eq!(eval(&table, "sd", &[3.0]), None);
        assert_eq!(eval(&table, "median", &[3.0]), Some(3.0));
    }

    #[test]
    fn test_register_rejects_vector_result() {
        let mut table = StatisticTable::empty();
        let err = table.register("quartiles", |v: &[f64]| v.iter().take(3).copied().collect()).unwrap_err();
        assert!(matches!(err, Error::InvalidStatistic { .. }));
        assert!(err.is_configuration());
        assert!(table.register("nothing", |_: &[f64]| Vec::new()).is_err());
        assert!(table.is_empty());

        table.register("p90ish", |v: &[f64]| vec![v.iter().copied().fold(f64::MIN, f64::max) * 0.9]).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_runtime_bad_result_is_error() {
        let mut table = StatisticTable::empty();
        table
            .register("odd", |v: &[f64]| if v.len() == 2 { vec![] } else { vec![1.0] })
            .unwrap();
        let stat = table.iter().next().unwrap();
        assert!(stat.evaluate(&[1.0, 2.0]).is_err());
        assert_eq!(stat.evaluate(&[1.0]).unwrap(), Some(1.0));
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let mut table = StatisticTable::default();
        assert!(table.add_builtin("mean").is_err());
        assert!(table.add_builtin("mode").is_err());
        assert!(table.register_scalar("", |_| 0.0).is_err());
        table.add_builtin("range").unwrap();
        assert_eq!(eval(&table, "range", &[1.0, 6.0]), Some(5.0));
    }

    #[test]
    fn test_serde_names() {
        let table: StatisticTable = serde_json::from_str(r#"["max","sum"]"#).unwrap();
        assert_eq!(table.names(), vec!["max", "sum"]);
        assert_eq!(serde_json::to_string(&table).unwrap(), r#"["max","sum"]"#);
        assert!(serde_json::from_str::<StatisticTable>(r#"["nope"]"#).is_err());
    }

    #[test]
    fn test_composite_name() {
        assert_eq!(composite_name("height", "sd"), "heightSd");
        assert_eq!(composite_name("crownArea", "mean"), "crownAreaMean");
    }
}
