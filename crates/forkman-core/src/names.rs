use crate::ForkError;

/// Accepts `^[A-Za-z0-9_-]+$`.
pub fn validate_variant_name(name: &str) -> Result<(), ForkError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        return Err(ForkError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
