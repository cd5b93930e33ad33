//! Keep auth tokens out of logs, errors, and printed configuration.
//!
//! The remote API takes its token as a query parameter, so every request URL
//! is a secret until redacted.

pub const REDACTED: &str = "[REDACTED]";

pub fn is_sensitive_key(k: &str) -> bool {
    let k = k.to_ascii_lowercase();
    if k.ends_with("_env") {
        return false;
    }
    k == "auth"
        || k.contains("authorization")
        || k.contains("password")
        || k.contains("secret")
        || k.contains("token")
        || k.contains("api_key")
        || k.contains("apikey")
}

/// Replace the values of sensitive query parameters with `[REDACTED]`.
pub fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match query.split_once('#') {
        Some((q, f)) => (q, Some(f)),
        None => (query, None),
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if is_sensitive_key(k) => format!("{k}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect();

    let mut out = format!("{base}?{}", pairs.join("&"));
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

/// `abcd***wxyz`, or `***` for short values.
pub fn mask_secret(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}

/// Mask the values of sensitive keys anywhere in a JSON document.
pub fn redact_json(v: &mut serde_json::Value) {
    match v {
        serde_json::Value::Array(items) => {
            for item in items {
                redact_json(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if is_sensitive_key(k) {
                    if let serde_json::Value::String(s) = v {
                        if !s.is_empty() {
                            *s = mask_secret(s);
                        }
                    }
                } else {
                    redact_json(v);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_token_query_parameter() {
        let url = "https://acme.tpondemand.com/api/v2/bug?token=abc123&where=(true)&result=count";
        assert_eq!(
            redact_url(url),
            "https://acme.tpondemand.com/api/v2/bug?token=[REDACTED]&where=(true)&result=count"
        );
    }

    #[test]
    fn leaves_urls_without_query_alone() {
        assert_eq!(redact_url("https://acme/api"), "https://acme/api");
    }

    #[test]
    fn masks_long_and_short_secrets() {
        assert_eq!(mask_secret("abcdefghijkl"), "abcd***ijkl");
        assert_eq!(mask_secret("short"), "***");
    }

    #[test]
    fn redact_json_masks_nested_tokens_only() {
        let mut v = serde_json::json!({
            "targets": [{"host": "acme", "token": "0123456789abcdef", "token_env": "ACME_TOKEN"}]
        });
        redact_json(&mut v);
        assert_eq!(v["targets"][0]["token"], "0123***cdef");
        assert_eq!(v["targets"][0]["token_env"], "ACME_TOKEN");
        assert_eq!(v["targets"][0]["host"], "acme");
    }
}
