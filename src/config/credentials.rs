//! Where the remote session's API credential comes from.
//!
//! The credential is resolved at connect time, not at startup, so a user can
//! export the variable and retry without restarting the host.

/// Source of the API credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Read the named process environment variable.
    Env(String),
    /// A fixed value (tests, or hosts that manage secrets themselves).
    Static(Option<String>),
}

impl CredentialSource {
    /// The configured credential, or `None` when it is missing or blank.
    pub fn resolve(&self) -> Option<String> {
        let value = match self {
            CredentialSource::Env(var) => std::env::var(var).ok(),
            CredentialSource::Static(value) => value.clone(),
        };
        value
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    /// Human-readable description of where the credential is expected,
    /// used in configuration error messages.
    pub fn describe(&self) -> String {
        match self {
            CredentialSource::Env(var) => format!("environment variable {var}"),
            CredentialSource::Static(_) => "static credential".into(),
        }
    }
}

impl Default for CredentialSource {
    fn default() -> Self {
        CredentialSource::Env("API_KEY".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_value_is_returned_trimmed() {
        let src = CredentialSource::Static(Some("  secret \n".into()));
        assert_eq!(src.resolve().as_deref(), Some("secret"));
    }

    #[test]
    fn blank_or_missing_static_value_is_none() {
        assert_eq!(CredentialSource::Static(None).resolve(), None);
        assert_eq!(CredentialSource::Static(Some("   ".into())).resolve(), None);
    }

    #[test]
    fn unset_env_var_is_none() {
        let src = CredentialSource::Env("VOICE_CONCIERGE_TEST_UNSET_VARIABLE".into());
        assert_eq!(src.resolve(), None);
    }

    #[test]
    fn set_env_var_is_read() {
        let var = "VOICE_CONCIERGE_TEST_CREDENTIAL";
        std::env::set_var(var, "abc123");
        assert_eq!(CredentialSource::Env(var.into()).resolve().as_deref(), Some("abc123"));
        std::env::remove_var(var);
    }

    #[test]
    fn describe_names_the_variable() {
        let src = CredentialSource::Env("MY_KEY".into());
        assert!(src.describe().contains("MY_KEY"));
    }
}
