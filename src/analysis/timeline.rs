//! Alignment passes over built series: gap filling, chronological
//! ordering and running totals.

use crate::error::{ChartError, ChartResult};
use crate::interval::month_ordinal;
use crate::models::{Point, Series};
use indexmap::IndexSet;
use std::collections::HashSet;

/// Append a zero point for every key in `keys` the series lacks.
pub fn fill_gaps(series: &mut Series, keys: &IndexSet<String>) {
    let present: HashSet<String> = series.points.iter().map(|p| p.key.clone()).collect();

    for key in keys {
        if !present.contains(key) {
            series.points.push(Point::new(key.clone(), 0.0));
        }
    }
}

/// Calendar position of an interval key.
///
/// Fields compare in declaration order: year, month, day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    year: i64,
    month: u32,
    day: u32,
}

impl SortKey {
    /// Decompose `D-Mon-YYYY`, `Mon-YYYY` or `YYYY`.
    ///
    /// The year may be negative (`-5`, `1-Jan--5`). Month keys sort as
    /// day 0 and year keys as month 0. Unknown month names count as 0.
    pub fn parse(key: &str) -> ChartResult<Self> {
        let bad = || ChartError::SortKeyFormat(key.to_string());
        let (head, year) = split_year(key);

        let (day, month) = match head.map(|h| h.split('-').collect::<Vec<_>>()).as_deref() {
            None => (0, 0),
            Some([""]) => return Err(bad()),
            Some([month]) => (0, month_ordinal(month)),
            Some([day, month]) => (day.parse::<u32>().map_err(|_| bad())?, month_ordinal(month)),
            Some(_) => return Err(bad()),
        };

        Ok(Self {
            year: year.parse().map_err(|_| bad())?,
            month,
            day,
        })
    }
}

/// Split the trailing year off a key, keeping a leading minus sign on it.
fn split_year(key: &str) -> (Option<&str>, &str) {
    let Some(dash) = key.rfind('-') else {
        return (None, key);
    };
    if dash == 0 {
        return (None, key);
    }
    if key[..dash].ends_with('-') {
        // the last dash is the sign of the year
        (Some(&key[..dash - 1]), &key[dash..])
    } else {
        (Some(&key[..dash]), &key[dash + 1..])
    }
}

/// Order points chronologically by their keys.
///
/// Every key is decomposed before anything moves, so on error the series
/// is left exactly as it was.
pub fn sort_chronologically(series: &mut Series) -> ChartResult<()> {
    let keys = series
        .points
        .iter()
        .map(|p| SortKey::parse(&p.key))
        .collect::<ChartResult<Vec<_>>>()?;

    let mut keyed: Vec<(SortKey, Point)> = keys
        .into_iter()
        .zip(std::mem::take(&mut series.points))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    series.points = keyed.into_iter().map(|(_, point)| point).collect();

    Ok(())
}

/// Replace every value with the running total up to and including it.
pub fn accumulate(series: &mut Series) {
    let mut running = 0.0;
    for point in &mut series.points {
        running += point.value;
        point.value = running;
    }
}
