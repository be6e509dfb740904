//! JSON and Markdown output for evaluated charts.
//!
//! Series of one chart share the same ordered keys, so the Markdown form is
//! a single table per chart: one row per interval key, one column per
//! series.

use crate::models::{ChartSeries, ValueType};
use anyhow::Result;

/// Generate a JSON document holding every chart.
pub fn generate_json_report(charts: &[ChartSeries], pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(charts)?
    } else {
        serde_json::to_string(charts)?
    };
    Ok(json)
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(charts: &[ChartSeries], include_totals: bool) -> String {
    let mut output = String::new();

    output.push_str("# Chart Series\n\n");

    if charts.is_empty() {
        output.push_str("No charts were evaluated.\n");
        return output;
    }

    for (i, chart) in charts.iter().enumerate() {
        output.push_str(&generate_chart_section(i + 1, chart, include_totals));
    }

    output
}

/// Generate the section of a single chart.
fn generate_chart_section(index: usize, chart: &ChartSeries, include_totals: bool) -> String {
    let mut section = String::new();

    let title = chart
        .name
        .clone()
        .unwrap_or_else(|| format!("Chart {}", index));
    section.push_str(&format!("## {}\n\n", title));

    section.push_str(&format!("- **Interval:** {}\n", chart.interval));
    section.push_str(&format!("- **Value Type:** {}\n", chart.value_type));
    if let Some(ref chart_type) = chart.chart_type {
        section.push_str(&format!("- **Chart Type:** {}\n", chart_type));
    }
    if let Some(ref code) = chart.visualization_code {
        section.push_str(&format!("- **Visualization:** `{}`\n", code));
    }
    section.push('\n');

    if chart.series.is_empty() {
        section.push_str("*No series could be built for this chart.*\n\n");
        return section;
    }

    section.push_str(&generate_table(chart, include_totals));
    section.push('\n');

    section
}

/// Generate the key-by-series table.
fn generate_table(chart: &ChartSeries, include_totals: bool) -> String {
    let value_type = ValueType::from(chart.value_type.as_str());
    let mut table = String::new();

    table.push_str("| Interval |");
    for series in &chart.series {
        table.push_str(&format!(" {} |", escape_cell(&series.name)));
    }
    table.push('\n');

    table.push_str("|:---|");
    for _ in &chart.series {
        table.push_str("---:|");
    }
    table.push('\n');

    // Every series carries the same keys in the same order
    for (row, point) in chart.series[0].points.iter().enumerate() {
        table.push_str(&format!("| {} |", escape_cell(&point.key)));
        for series in &chart.series {
            let cell = series
                .points
                .get(row)
                .map(|p| format_value(p.value, &value_type))
                .unwrap_or_default();
            table.push_str(&format!(" {} |", cell));
        }
        table.push('\n');
    }

    if include_totals {
        table.push_str("| **Total** |");
        for series in &chart.series {
            table.push_str(&format!(" **{}** |", format_value(series.total, &value_type)));
        }
        table.push('\n');
    }

    table
}

/// Format a value for display according to the chart's value type.
pub fn format_value(value: f64, value_type: &ValueType) -> String {
    match value_type {
        ValueType::Amount => format!("{:.2}", value),
        ValueType::Percentage => format!("{:.2}%", value),
        _ if value.fract() == 0.0 => format!("{}", value as i64),
        _ => format!("{:.2}", value),
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
