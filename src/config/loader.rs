//! Load resource declarations from JSON text or from a directory of JSON files.

use crate::config::ResourceConfig;
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Parse one declaration object or an array of them.
pub fn parse_resources(text: &str) -> Result<Vec<ResourceConfig>, ConfigError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(ConfigError::Load("expected a resource object or an array of them".into())),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let cfg: ResourceConfig = serde_json::from_value(item).map_err(|e| ConfigError::Load(e.to_string()))?;
        out.push(cfg);
    }
    Ok(out)
}

/// Every `*.json` file in `dir`, in file-name order.
pub async fn load_resources_from_dir(dir: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        tracing::debug!(path = %path.display(), "loading resource declarations");
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        out.extend(parse_resources(&text)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_or_array() {
        let one = r#"{ "name": "widget", "primary_key": "id", "fields": [{ "name": "id", "type": "identifier" }] }"#;
        assert_eq!(parse_resources(one).unwrap().len(), 1);
        let many = format!("[{one}, {one}]");
        assert_eq!(parse_resources(&many).unwrap().len(), 2);
        assert!(matches!(parse_resources("42"), Err(ConfigError::Load(_))));
        assert!(matches!(parse_resources("{ \"name\": 1 }"), Err(ConfigError::Load(_))));
    }
}
