use base64::{Engine, prelude::BASE64_STANDARD};

use crate::error::FieldError;

/// Collects field errors so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trimmed text. A missing or blank value records an error and comes back
    /// empty, so results are only meaningful once `finish` has succeeded.
    pub fn required(&mut self, field: &str, value: Option<&str>) -> String {
        let value = value.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            self.reject(field, "is required");
        }
        value.to_string()
    }

    /// Normalized email; empty when rejected.
    pub fn required_email(&mut self, field: &str, value: Option<&str>) -> String {
        let value = self.required(field, value);
        if value.is_empty() {
            return value;
        }
        normalize_email(&value).unwrap_or_else(|| {
            self.reject(field, "must be a valid email address");
            String::new()
        })
    }

    /// Emails of a list, normalized and de-duplicated in order.
    pub fn email_list(&mut self, field: &str, values: Vec<String>) -> Vec<String> {
        let mut emails: Vec<String> = Vec::new();
        for (index, raw) in values.iter().enumerate() {
            match normalize_email(raw) {
                Some(email) if !emails.contains(&email) => emails.push(email),
                Some(_) => {}
                None => self.reject(format!("{}[{}]", field, index), "must be a valid email address"),
            }
        }
        emails
    }

    /// Signature data URL; empty when rejected.
    pub fn signature(&mut self, field: &str, value: Option<&str>) -> String {
        let value = self.required(field, value);
        if value.is_empty() || is_signature_data_url(&value) {
            return value;
        }
        self.reject(field, "must be a base64 image data URL");
        String::new()
    }

    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Trimmed, non-empty optional text.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace);
    valid.then_some(email)
}

/// `data:image/<type>;base64,<payload>` with a payload that actually decodes.
pub fn is_signature_data_url(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("data:image/") else {
        return false;
    };
    let Some((media_type, payload)) = rest.split_once(";base64,") else {
        return false;
    };
    if media_type.is_empty() || payload.is_empty() {
        return false;
    }
    BASE64_STANDARD
        .decode(payload.trim())
        .map(|bytes| !bytes.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.COM "),
            Some("ada@example.com".to_string())
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@nodot"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
    }

    #[test]
    fn test_signature_data_url() {
        assert!(is_signature_data_url("data:image/png;base64,iVBORw0KGgo="));
        assert!(!is_signature_data_url("data:image/png;base64,"));
        assert!(!is_signature_data_url("data:text/plain;base64,aGVsbG8="));
        assert!(!is_signature_data_url("data:image/png;base64,@@not-base64@@"));
        assert!(!is_signature_data_url("iVBORw0KGgo="));
    }

    #[test]
    fn test_validator_collects_every_error() {
        let mut validator = Validator::new();
        assert_eq!(validator.required("senderName", Some("  ")), "");
        assert_eq!(validator.required_email("senderEmail", Some("nope")), "");
        assert_eq!(validator.required("carrier", Some(" UPS ")), "UPS");
        assert_eq!(validator.signature("signature", Some("scribble")), "");
        let emails = validator.email_list(
            "notifyEmails",
            vec!["a@x.io".into(), "A@X.io".into(), "bad".into()],
        );
        assert_eq!(emails, vec!["a@x.io".to_string()]);

        let errors = validator.finish().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["senderName", "senderEmail", "signature", "notifyEmails[2]"]);
    }
}
