use std::collections::HashMap;

use crate::collectors::{MetricValue, Samples};
use crate::error::{PluginError, Result};

/// Parses `<tag> <name> <value>` lines, stopping at a line equal to `end`.
///
/// Lines with a different tag are ignored. A later duplicate name wins.
pub fn parse_tagged<'a>(text: &'a str, tag: &str, end: &str) -> HashMap<&'a str, &'a str> {
    let mut fields = HashMap::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line == end {
            break;
        }
        let mut parts = line.splitn(3, ' ');
        if parts.next() != Some(tag) {
            continue;
        }
        if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
            fields.insert(name, value.trim());
        }
    }
    fields
}

/// Picks `names` out of parsed fields; every one must be present and numeric.
pub fn select(fields: &HashMap<&str, &str>, names: &[&str]) -> Result<Samples> {
    let mut samples = Samples::with_capacity(names.len());
    for name in names {
        let raw = fields.get(name).ok_or_else(|| PluginError::Extraction {
            metric: name.to_string(),
            reason: "field not found".to_string(),
        })?;
        let value = match raw.parse::<u64>() {
            Ok(v) => MetricValue::Uint(v),
            Err(_) => raw.parse::<f64>().map(MetricValue::Float).map_err(|_| {
                PluginError::Extraction {
                    metric: name.to_string(),
                    reason: format!("'{raw}' is not a number"),
                }
            })?,
        };
        samples.insert(name.to_string(), value);
    }
    Ok(samples)
}
