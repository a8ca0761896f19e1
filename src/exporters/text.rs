use std::io::Write;

use crate::collectors::Samples;
use crate::error::Result;
use crate::schema::Schema;

/// Formats samples into the agent's `key\tvalue\ttimestamp` line format.
///
/// Lines follow schema order. Metrics without a sample, and samples that are
/// not in the schema, produce nothing; non-finite values are dropped with a
/// warning.
pub fn format_samples(prefix: &str, schema: &Schema, samples: &Samples, timestamp: i64) -> String {
    let mut lines = String::new();

    for (group, def) in schema.metrics() {
        let Some(value) = samples.get(def.name) else {
            continue;
        };
        let key = metric_key(prefix, group, def.name);
        if !value.is_finite() {
            tracing::warn!(metric = %key, value = %value, "dropping non-finite value");
            continue;
        }
        lines.push_str(&format!("{key}\t{value}\t{timestamp}\n"));
    }

    lines
}

/// Writes the formatted lines in one go.
pub fn write_samples<W: Write>(
    out: &mut W,
    prefix: &str,
    schema: &Schema,
    samples: &Samples,
    timestamp: i64,
) -> Result<()> {
    let lines = format_samples(prefix, schema, samples, timestamp);
    out.write_all(lines.as_bytes())?;
    out.flush()?;
    Ok(())
}

pub fn metric_key(prefix: &str, group: &str, name: &str) -> String {
    if prefix.is_empty() {
        format!("{group}.{name}")
    } else {
        format!("{prefix}.{group}.{name}")
    }
}
