//! Graph definitions handed to the host agent when it asks for them.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::schema::{Schema, Unit};

/// Set (non-empty) by the agent when it wants graph definitions, not values.
pub const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

const HEADER: &str = "# mackerel-agent-plugin";

#[derive(Serialize)]
struct GraphDefs<'a> {
    graphs: BTreeMap<String, GraphDef<'a>>,
}

#[derive(Serialize)]
struct GraphDef<'a> {
    label: &'a str,
    unit: Unit,
    metrics: Vec<MetricDefJson<'a>>,
}

#[derive(Serialize)]
struct MetricDefJson<'a> {
    name: &'a str,
    label: &'a str,
    stacked: bool,
}

pub fn requested() -> bool {
    std::env::var_os(META_ENV).is_some_and(|v| !v.is_empty())
}

pub fn format_definitions(prefix: &str, schema: &Schema) -> Result<String> {
    let graphs = schema
        .graphs
        .iter()
        .map(|g| {
            let key = if prefix.is_empty() {
                g.key.to_string()
            } else {
                format!("{prefix}.{}", g.key)
            };
            let def = GraphDef {
                label: &g.label,
                unit: g.unit,
                metrics: g
                    .metrics
                    .iter()
                    .map(|m| MetricDefJson {
                        name: m.name,
                        label: m.label,
                        stacked: m.stacked,
                    })
                    .collect(),
            };
            (key, def)
        })
        .collect();

    let json = serde_json::to_string(&GraphDefs { graphs }).map_err(std::io::Error::from)?;
    Ok(format!("{HEADER}\n{json}\n"))
}

pub fn write_definitions<W: Write>(out: &mut W, prefix: &str, schema: &Schema) -> Result<()> {
    out.write_all(format_definitions(prefix, schema)?.as_bytes())?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Graph, MetricDef};

    #[test]
    fn test_definitions_shape() {
        let schema = Schema::new(vec![Graph::new(
            "jvm.heap",
            "Elasticsearch JVM Heap Mem".into(),
            Unit::Bytes,
            &[MetricDef::gauge("heap_used", "Used").stacked(), MetricDef::gauge("heap_max", "Max")],
        )]);

        let text = format_definitions("elasticsearch", &schema).unwrap();
        let (header, body) = text.split_once('\n').unwrap();
        assert_eq!(header, HEADER);

        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        let graph = &json["graphs"]["elasticsearch.jvm.heap"];
        assert_eq!(graph["label"], "Elasticsearch JVM Heap Mem");
        assert_eq!(graph["unit"], "bytes");
        assert_eq!(graph["metrics"][0]["name"], "heap_used");
        assert_eq!(graph["metrics"][0]["stacked"], true);
        assert_eq!(graph["metrics"][1]["label"], "Max");
    }
}
