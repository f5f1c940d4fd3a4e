//! Prometheus text exposition format.
//!
//! Renders the registry contents into the text exposition format (0.0.4)
//! for scraping by a Prometheus server or compatible agent.

use crate::registry::{FamilyValue, MetricFamily, MetricRegistry};

/// Content type served alongside [`render_prometheus`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render every declared family in declaration order.
///
/// Gauges render as `gauge`. Enum metrics render one sample per declared
/// state, labelled with the metric name, valued 1 for the active state.
/// Info metrics render as a single `<name>_info` sample valued 1 whose labels
/// are the record entries.
pub fn render_prometheus(registry: &MetricRegistry) -> String {
    let mut out = String::new();
    for family in registry.snapshot() {
        render_family(&mut out, &family);
    }
    out
}

fn render_family(out: &mut String, family: &MetricFamily) {
    match &family.value {
        FamilyValue::Gauge(samples) => {
            header(out, &family.name, &family.help);
            for (values, value) in samples {
                let labels: Vec<(&str, &str)> = family
                    .label_names
                    .iter()
                    .map(String::as_str)
                    .zip(values.iter().map(String::as_str))
                    .collect();
                sample(out, &family.name, &labels, *value);
            }
        }
        FamilyValue::EnumState { states, current } => {
            header(out, &family.name, &family.help);
            for (i, state) in states.iter().enumerate() {
                let value = if *current == Some(i) { 1.0 } else { 0.0 };
                sample(out, &family.name, &[(family.name.as_str(), state.as_str())], value);
            }
        }
        FamilyValue::Info(record) => {
            let name = format!("{}_info", family.name);
            header(out, &name, &family.help);
            if let Some(record) = record {
                let labels: Vec<(&str, &str)> = record
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                sample(out, &name, &labels, 1.0);
            }
        }
    }
}

fn header(out: &mut String, name: &str, help: &str) {
    out.push_str(&format!("# HELP {name} {}\n", escape_help(help)));
    out.push_str(&format!("# TYPE {name} gauge\n"));
}

fn sample(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    out.push_str(name);
    if !labels.is_empty() {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect();
        out.push('{');
        out.push_str(&rendered.join(","));
        out.push('}');
    }
    out.push(' ');
    out.push_str(&format_value(value));
    out.push('\n');
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
