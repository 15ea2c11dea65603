use std::collections::{BTreeMap, VecDeque};

use crate::record::Record;

pub const DEFAULT_WINDOW: usize = 100;

const INITIAL_LIMITS: (f64, f64) = (0.0, 1.0);

/// Rolling per-field table behind a live chart: the last `size` rows of every
/// field plus y-axis limits over everything seen so far.
///
/// Fields that are missing from a row read as `NaN`.
#[derive(Clone, Debug)]
pub struct ChartWindow {
    size: usize,
    rows: u64,
    columns: BTreeMap<String, VecDeque<f64>>,
    min: Option<f64>,
    max: Option<f64>,
    limits: (f64, f64),
}

impl Default for ChartWindow {
    fn default() -> Self {
        ChartWindow::new(DEFAULT_WINDOW)
    }
}

impl ChartWindow {
    pub fn new(size: usize) -> Self {
        ChartWindow {
            size: size.max(1),
            rows: 0,
            columns: BTreeMap::new(),
            min: None,
            max: None,
            limits: INITIAL_LIMITS,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Rows pushed so far, including those scrolled out of the window.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Appends one row. Returns true when the y-axis limits moved.
    pub fn push(&mut self, record: &Record) -> bool {
        let held = self.held_rows();
        for field in record.fields() {
            if !self.columns.contains_key(field) {
                self.columns
                    .insert(field.to_string(), VecDeque::from(vec![f64::NAN; held]));
            }
        }

        for (field, column) in self.columns.iter_mut() {
            if column.len() == self.size {
                column.pop_front();
            }
            column.push_back(record.get(field).unwrap_or(f64::NAN));
        }
        self.rows += 1;

        for (_, value) in record.iter().filter(|(_, v)| !v.is_nan()) {
            self.min = Some(self.min.map_or(value, |m| m.min(value)));
            self.max = Some(self.max.map_or(value, |m| m.max(value)));
        }

        let limits = match (self.min, self.max) {
            (Some(min), Some(max)) => (round_lim(min), round_lim(max)),
            _ => INITIAL_LIMITS,
        };
        let changed = limits != self.limits;
        self.limits = limits;
        changed
    }

    /// Last `size` values of `field`, left-padded with zeros.
    pub fn series(&self, field: &str) -> Option<Vec<f64>> {
        let column = self.columns.get(field)?;
        let mut values = vec![0.0; self.size - column.len()];
        values.extend(column.iter().copied());
        Some(values)
    }

    pub fn y_limits(&self) -> (f64, f64) {
        self.limits
    }

    fn held_rows(&self) -> usize {
        usize::try_from(self.rows).map_or(self.size, |rows| rows.min(self.size))
    }
}

/// Rounds a magnitude up to one significant digit, e.g. 3.2 -> 4, 47 -> 50,
/// -130 -> -200. Magnitudes below 1 round to 0.
pub fn round_lim(value: f64) -> f64 {
    let (sign, magnitude) = if value < 0.0 {
        (-1.0, -value)
    } else {
        (1.0, value)
    };
    if magnitude.is_nan() || magnitude < 1.0 {
        return 0.0;
    }
    if magnitude.is_infinite() {
        return value;
    }
    let mut scale = 10f64.powi(magnitude.log10().trunc() as i32);
    let mut leading = magnitude / scale;
    if leading >= 10.0 {
        scale *= 10.0;
        leading /= 10.0;
    }
    sign * scale * (leading.trunc() + 1.0)
}
