use std::env;

use tracing::warn;

/// Default environment variable holding an API key.
pub const DEFAULT_API_KEY_ENV_VAR: &str = "SUBSTREAMS_API_KEY";

/// Default environment variable holding a JWT API token.
pub const DEFAULT_API_TOKEN_ENV_VAR: &str = "SUBSTREAMS_API_TOKEN";

/// Accepted for backward compatibility when the token variable is left at
/// its default.
const LEGACY_API_TOKEN_ENV_VAR: &str = "SF_API_TOKEN";

/// Which kind of credential was resolved; selects the request header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthKind {
    ApiKey,
    Jwt,
    None,
}

/// Resolves the endpoint credential from the environment.
///
/// The authenticator holds only the environment variable *names*. The value
/// is looked up again on every [`resolve`](Authenticator::resolve) call, so
/// rotating a credential externally takes effect on the next session without
/// restarting the process. An API key wins over a token when both are set.
#[derive(Clone, Debug)]
pub struct Authenticator {
    api_key_env_var: String,
    api_token_env_var: String,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_ENV_VAR, DEFAULT_API_TOKEN_ENV_VAR)
    }
}

impl Authenticator {
    pub fn new(api_key_env_var: impl Into<String>, api_token_env_var: impl Into<String>) -> Self {
        Self {
            api_key_env_var: api_key_env_var.into(),
            api_token_env_var: api_token_env_var.into(),
        }
    }

    pub fn api_key_env_var(&self) -> &str {
        &self.api_key_env_var
    }

    pub fn api_token_env_var(&self) -> &str {
        &self.api_token_env_var
    }

    /// Reads the environment and returns the credential with its kind.
    pub fn resolve(&self) -> (Option<String>, AuthKind) {
        if let Some(key) = non_empty_var(&self.api_key_env_var) {
            return (Some(key), AuthKind::ApiKey);
        }

        if let Some(token) = non_empty_var(&self.api_token_env_var) {
            return (Some(token), AuthKind::Jwt);
        }

        if self.api_token_env_var == DEFAULT_API_TOKEN_ENV_VAR {
            if let Some(token) = non_empty_var(LEGACY_API_TOKEN_ENV_VAR) {
                warn!(
                    "{LEGACY_API_TOKEN_ENV_VAR} is deprecated, set {DEFAULT_API_TOKEN_ENV_VAR} instead"
                );
                return (Some(token), AuthKind::Jwt);
            }
        }

        (None, AuthKind::None)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names, the environment is process
    // global.
    fn set(name: &str, value: &str) {
        unsafe { env::set_var(name, value) };
    }

    #[test]
    fn resolves_nothing_when_unset() {
        let auth = Authenticator::new("TEST_AUTH_UNSET_KEY", "TEST_AUTH_UNSET_TOKEN");

        assert_eq!(auth.resolve(), (None, AuthKind::None));
    }

    #[test]
    fn key_wins_over_token() {
        set("TEST_AUTH_BOTH_KEY", "the-key");
        set("TEST_AUTH_BOTH_TOKEN", "the-token");
        let auth = Authenticator::new("TEST_AUTH_BOTH_KEY", "TEST_AUTH_BOTH_TOKEN");

        assert_eq!(auth.resolve(), (Some("the-key".to_string()), AuthKind::ApiKey));
    }

    #[test]
    fn token_alone_resolves_as_jwt() {
        set("TEST_AUTH_JWT_TOKEN", "the-token");
        let auth = Authenticator::new("TEST_AUTH_JWT_KEY", "TEST_AUTH_JWT_TOKEN");

        assert_eq!(auth.resolve(), (Some("the-token".to_string()), AuthKind::Jwt));
    }

    #[test]
    fn empty_values_count_as_unset() {
        set("TEST_AUTH_EMPTY_KEY", "");
        set("TEST_AUTH_EMPTY_TOKEN", "");
        let auth = Authenticator::new("TEST_AUTH_EMPTY_KEY", "TEST_AUTH_EMPTY_TOKEN");

        assert_eq!(auth.resolve(), (None, AuthKind::None));
    }

    #[test]
    fn rotation_is_picked_up_between_calls() {
        set("TEST_AUTH_ROTATE_TOKEN", "before");
        let auth = Authenticator::new("TEST_AUTH_ROTATE_KEY", "TEST_AUTH_ROTATE_TOKEN");
        assert_eq!(auth.resolve().0.as_deref(), Some("before"));

        set("TEST_AUTH_ROTATE_TOKEN", "after");
        assert_eq!(auth.resolve().0.as_deref(), Some("after"));
    }
}
