//! Single-line text exposition format.
//!
//! `metric_name{chain="<escaped chain>"} <value>\n`

use shx_reconcile::MetricSample;

/// Escape a label value: backslash, double quote and line feed.
pub fn escape_label_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for ch in v.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// One sample line, newline terminated.
pub fn sample_line(sample: &MetricSample) -> String {
    format!(
        "{}{{chain=\"{}\"}} {}\n",
        sample.series.metric_name(),
        escape_label_value(&sample.chain),
        sample.value
    )
}

/// `# TYPE` header for the sample's metric. Every series is a gauge.
pub fn type_line(sample: &MetricSample) -> String {
    format!("# TYPE {} gauge\n", sample.series.metric_name())
}

/// Full body for a single-sample push: type header plus sample line.
pub fn render_sample(sample: &MetricSample) -> String {
    let mut body = type_line(sample);
    body.push_str(&sample_line(sample));
    body
}

/// Metric name a line refers to, for both sample and `# HELP`/`# TYPE`
/// lines. `None` for blank lines and other comments.
pub fn line_metric_name(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if let Some(rest) = line
        .strip_prefix("# TYPE ")
        .or_else(|| line.strip_prefix("# HELP "))
    {
        return rest.split_whitespace().next();
    }
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    Some(&line[..end])
}
