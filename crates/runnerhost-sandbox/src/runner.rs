//! Runner identity as declared by the guest's `info` property.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerInfo {
    pub id: String,
    pub name: String,
    pub version: f64,
    /// Oldest host version the runner works with, e.g. `"0.2.0"`.
    #[serde(default, deserialize_with = "version_text")]
    pub min_supported_app_version: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub supported_languages: Vec<String>,
}

impl RunnerInfo {
    /// Whether a host at `host_version` satisfies `minSupportedAppVersion`.
    pub fn supports_host(&self, host_version: &str) -> bool {
        match &self.min_supported_app_version {
            Some(min) => compare_versions(host_version, min) != Ordering::Less,
            None => true,
        }
    }
}

/// Compare dotted numeric versions. Missing components count as zero and
/// non-numeric suffixes (`-beta`) are ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let (x, y) = (a.get(i).copied().unwrap_or(0), b.get(i).copied().unwrap_or(0));
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Accept the version as a string or a bare number.
fn version_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_info() {
        let info: RunnerInfo = serde_json::from_value(json!({ "id": "demo", "name": "Demo", "version": 1.5 })).unwrap();
        assert_eq!(info.id, "demo");
        assert_eq!(info.min_supported_app_version, None);
        assert!(info.supports_host("0.0.1"));
    }

    #[test]
    fn numeric_min_version_is_accepted() {
        let info: RunnerInfo = serde_json::from_value(json!({
            "id": "demo", "name": "Demo", "version": 1, "minSupportedAppVersion": 2
        }))
        .unwrap();
        assert_eq!(info.min_supported_app_version.as_deref(), Some("2"));
        assert!(!info.supports_host("1.9.9"));
        assert!(info.supports_host("2.0.0"));
    }

    #[test]
    fn version_ordering() {
        assert_eq!(compare_versions("0.10.0", "0.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.2.0-beta", "1.2.1"), Ordering::Less);
    }
}
