//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is first parsed into `toml::Value`, its key tree compared
//! against the known field names, and a warning with a "did you mean?"
//! suggestion emitted for each unknown key. Normal serde deserialization
//! follows. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path of `HarvestConfig`.
///
/// Must be kept in step with the structs in harvest_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        "server.cors_origins",
        // [data]
        "data",
        "data.raw_dir",
        "data.historical_dir",
        "data.models_dir",
        "data.tracked_maps",
        // [source]
        "source",
        "source.base_url",
        "source.timeout_secs",
        "source.live_enabled",
        // [detection]
        "detection",
        "detection.min_votes",
        "detection.grouping_window",
        "detection.seasonal_period",
        "detection.iqr_multiplier",
        "detection.peak_distance",
        "detection.prominence_percentile",
        "detection.lof_neighbors",
        "detection.lof_contamination",
        "detection.min_samples",
        // [detection.scale]
        "detection.scale",
        "detection.scale.tiny_max_ccu",
        "detection.scale.tiny_floor",
        "detection.scale.tiny_mean_multiplier",
        "detection.scale.small_max_ccu",
        "detection.scale.small_floor",
        "detection.scale.small_mean_multiplier",
        "detection.scale.normal_floor",
        "detection.scale.normal_mean_multiplier",
        // [forecast]
        "forecast",
        "forecast.interval_multiplier",
        // [historical]
        "historical",
        "historical.enabled",
        "historical.max_days",
    ];
    keys.iter().copied().collect()
}

/// Recursively collect all dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Levenshtein edit distance, counted in characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, d)| d <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Warnings for every unknown key in a raw TOML string.
///
/// Parse errors yield no warnings; serde reports them afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
