use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for sensitive data that masks its value in Debug and Display output.
///
/// Serialization passes the real value through: API responses need it, log
/// macros such as `tracing::info!("{}", email)` must not see it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Partially revealed form for log lines: `j***@example.com`.
    pub fn hint(&self) -> String {
        let value = self.0.as_ref();
        match value.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{}***@{}", first, domain)
            }
            None => "********".to_string(),
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_email_in_display_but_not_in_json() {
        let email = Masked("jane@example.com".to_string());
        assert_eq!(format!("{}", email), "j***@example.com");
        assert_eq!(format!("{:?}", email), "j***@example.com");
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"jane@example.com\"");
    }

    #[test]
    fn non_email_values_are_fully_hidden() {
        assert_eq!(Masked("secret").to_string(), "********");
    }
}
