use k3d_core::{K3dError, Result};
use k3d_runtime::HostConfig;
use serde_json::Value;

/// Deep merge JSON values recursively. Objects merge key by key, anything
/// else (arrays included) is replaced by the overlay.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => {
                        // Arrays are replaced, not merged
                        if matches!(overlay_value, Value::Array(_)) {
                            base_map.insert(key, overlay_value);
                        } else {
                            deep_merge(base_value, overlay_value);
                        }
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_val, overlay_val) => {
            *base_val = overlay_val;
        }
    }
}

/// Merge a user-supplied partial host configuration over the built-in one.
///
/// `overrides` must be a mapping; its fields win wherever they are set.
pub fn merge_host_config(baseline: HostConfig, overrides: Option<&Value>) -> Result<HostConfig> {
    let overrides = match overrides {
        None | Some(Value::Null) => return Ok(baseline),
        Some(value @ Value::Object(_)) => value.clone(),
        Some(other) => {
            return Err(K3dError::Config(format!(
                "Host config overrides must be a mapping, got: {}",
                other
            )))
        }
    };

    let mut merged = serde_json::to_value(&baseline)?;
    deep_merge(&mut merged, overrides);

    serde_json::from_value(merged)
        .map_err(|e| K3dError::Config(format!("Invalid host config overrides: {}", e)))
}
