use crate::collectors::{MetricValue, Samples};
use crate::schema::{Kind, Schema};
use crate::state::{Observation, Observations};

/// Turns counter samples into per-second rates against the previous record.
///
/// Gauges and metrics unknown to the schema pass through untouched. A counter
/// is dropped when there is nothing to compare against: no previous record,
/// no previous value for that metric, or a previous timestamp that is not
/// strictly older than `now`. A counter that went backwards reports 0.
pub fn apply(schema: &Schema, previous: Option<&Observations>, current: &Samples, now: i64) -> Samples {
    let mut out = Samples::with_capacity(current.len());

    for (name, value) in current {
        let is_counter = schema
            .get(name)
            .is_some_and(|def| def.kind == Kind::Counter);
        if !is_counter {
            out.insert(name.clone(), *value);
            continue;
        }

        let Some(prev) = previous.and_then(|p| p.get(name)) else {
            tracing::debug!(metric = %name, "no previous value, skipping counter");
            continue;
        };
        if let Some(rate) = per_second(prev, *value, now) {
            out.insert(name.clone(), MetricValue::Float(rate));
        }
    }

    out
}

fn per_second(prev: &Observation, current: MetricValue, now: i64) -> Option<f64> {
    // overflow only comes from a damaged record
    let elapsed = now.checked_sub(prev.timestamp).filter(|e| *e > 0)?;

    // A counter reset (e.g. the target restarted) reports 0.
    let delta = match (prev.value, current) {
        (MetricValue::Uint(before), MetricValue::Uint(after)) => after.checked_sub(before).unwrap_or(0) as f64,
        (before, after) => (after.as_f64() - before.as_f64()).max(0.0),
    };
    Some(delta / elapsed as f64)
}

/// Counter values of `current`, stamped with `now`, to persist for next time.
pub fn snapshot(schema: &Schema, current: &Samples, now: i64) -> Observations {
    current
        .iter()
        .filter(|(name, _)| schema.get(name).is_some_and(|def| def.kind == Kind::Counter))
        .map(|(name, value)| {
            (
                name.clone(),
                Observation {
                    value: *value,
                    timestamp: now,
                },
            )
        })
        .collect()
}
