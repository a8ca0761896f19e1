use crate::collectors::{MetricValue, Samples};
use crate::error::{PluginError, Result};

/// Column layout for summing one row role out of comma-separated stats.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    /// Index of the column that classifies each row.
    pub role_column: usize,
    /// Only rows whose role column equals this contribute.
    pub role: &'static str,
    /// Rows narrower than this mean the source is not what we expect.
    pub min_columns: usize,
    /// `(accumulator name, column index)`
    pub sums: &'static [(&'static str, usize)],
}

/// Sums the configured columns over every row of the requested role.
///
/// A single short row anywhere in the input fails the whole table, even when
/// earlier rows were fine.
pub fn sum_rows(body: &str, spec: &TableSpec) -> Result<Samples> {
    let mut samples = Samples::new();

    for (lineno, line) in body.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() < spec.min_columns {
            return Err(PluginError::Format(format!(
                "line {} has {} columns, expected at least {} (wrong uri or socket?)",
                lineno + 1,
                columns.len(),
                spec.min_columns
            )));
        }

        if columns[spec.role_column] != spec.role {
            continue;
        }

        for (name, index) in spec.sums {
            let raw = columns[*index].trim();
            let value: f64 = raw.parse().map_err(|_| {
                PluginError::Format(format!(
                    "line {}: column {index} ({name}) is not numeric: '{raw}'",
                    lineno + 1
                ))
            })?;
            let slot = samples
                .entry((*name).to_string())
                .or_insert(MetricValue::Float(0.0));
            *slot = MetricValue::Float(slot.as_f64() + value);
        }
    }

    Ok(samples)
}
