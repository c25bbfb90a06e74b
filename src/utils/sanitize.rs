use serde_json::Value;

/// Masks all but the last four characters of an account identifier.
pub fn mask_account(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Sanitizes account-like fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "account" | "account_id" | "user_id" | "secret" | "token" | "authorization"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_account(s)),
        _ => Value::String("****".to_string()),
    }
}
