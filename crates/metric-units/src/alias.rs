//! Metric alias handling.

/// Turn a counter alias such as `cpu.usage.average` into the canonical
/// metric name `cpu_usage_average`.
///
/// An empty alias yields an empty name; callers drop such samples.
pub fn transform_metric_alias(alias: &str) -> String {
    alias.replace('.', "_")
}
