use tracing::debug;

/// Resolve a credential value. A value starting with `$` names an environment
/// variable; an unset variable leaves the literal in place.
pub fn resolve_credential(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        match std::env::var(var_name) {
            Ok(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                resolved
            }
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, using literal");
                value.to_string()
            }
        }
    } else {
        value.to_string()
    }
}

/// Mask every occurrence of `secret` in `text`. Secrets shorter than four
/// characters are left alone.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.len() >= 4 {
        text.replace(secret, "[REDACTED]")
    } else {
        text.to_string()
    }
}
