use std::str::FromStr;

use num_traits::Num;
use regex::{escape, Regex};

/// Parses a numeric metric value out of a Prometheus-rendered metrics string.
/// Returns `None` if the metric is absent or fails to parse as `T`.
pub fn parse_numeric_metric<T: Num + FromStr>(
    metrics_as_string: &str,
    metric_name: &str,
) -> Option<T> {
    // Matches a Prometheus sample line: "metric_name <number>".
    let pattern = format!(r"{}\s+(\d+)", escape(metric_name));
    let re = Regex::new(&pattern).expect("Invalid regex");
    re.captures(metrics_as_string)
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse().ok())
}
