//! Secure token manager with memory-safe handling and masking capabilities
//!
//! The publish token is read from `DEPUP_NPM_TOKEN`, falling back to
//! `NPM_TOKEN`, and kept in a `SecretString` so it never shows up in
//! `Debug` output or logs.

use crate::core::error::{DepupError, Result};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Environment variables checked for the publish token, in order
pub const TOKEN_ENV_VARS: &[&str] = &["DEPUP_NPM_TOKEN", "NPM_TOKEN"];

/// Secure token manager for registry authentication
///
/// # Examples
///
/// ```
/// use depup::security::SecureTokenManager;
/// use std::collections::HashMap;
///
/// let env = HashMap::from([("NPM_TOKEN".to_string(), "npm_abcdef123456".to_string())]);
/// let manager = SecureTokenManager::from_vars(&env);
///
/// assert_eq!(manager.token_source(), Some("NPM_TOKEN"));
/// assert_eq!(manager.mask_token("npm_abcdef123456"), "npm...456");
/// ```
#[derive(Debug, Default)]
pub struct SecureTokenManager {
    token: Option<(&'static str, SecretString)>,
}

impl SecureTokenManager {
    /// Read the token from the process environment
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self::from_vars(&vars)
    }

    /// Read the token from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let token = TOKEN_ENV_VARS.iter().find_map(|name| {
            vars.get(*name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (*name, SecretString::from(v.to_string())))
        });
        Self { token }
    }

    /// Use a token obtained elsewhere
    pub fn with_token(token: SecretString) -> Self {
        Self {
            token: Some(("explicit", token)),
        }
    }

    pub fn get_token(&self) -> Option<SecretString> {
        self.token.as_ref().map(|(_, token)| token.clone())
    }

    /// The token, or the configuration error a publish attempt reports
    pub fn require_token(&self) -> Result<SecretString> {
        self.get_token().ok_or_else(|| DepupError::TokenMissing {
            env_var: TOKEN_ENV_VARS[0].to_string(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Variable the token was read from
    pub fn token_source(&self) -> Option<&'static str> {
        self.token.as_ref().map(|(source, _)| *source)
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters. Tokens shorter than
    /// 10 characters are fully masked as "****".
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Masks the managed token wherever it appears in `text`
    pub fn mask_tokens_in_string(&self, text: &str) -> String {
        let Some((_, token)) = &self.token else {
            return text.to_string();
        };
        let token_str = token.expose_secret();
        match Regex::new(&regex::escape(token_str)) {
            Ok(regex) => regex
                .replace_all(text, self.mask_token(token_str).as_str())
                .into_owned(),
            Err(_) => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_depup_token_takes_precedence() {
        let manager = SecureTokenManager::from_vars(&vars(&[
            ("NPM_TOKEN", "fallback-token-000"),
            ("DEPUP_NPM_TOKEN", "primary-token-111"),
        ]));

        assert_eq!(manager.token_source(), Some("DEPUP_NPM_TOKEN"));
        assert_eq!(
            manager.get_token().unwrap().expose_secret(),
            "primary-token-111"
        );
    }

    #[test]
    fn test_fallback_and_blank_values() {
        let manager = SecureTokenManager::from_vars(&vars(&[
            ("DEPUP_NPM_TOKEN", "   "),
            ("NPM_TOKEN", "fallback-token-000"),
        ]));
        assert_eq!(manager.token_source(), Some("NPM_TOKEN"));
    }

    #[test]
    fn test_require_token_missing() {
        let manager = SecureTokenManager::from_vars(&HashMap::new());

        assert!(!manager.has_token());
        let error = manager.require_token().unwrap_err();
        assert_eq!(error.code(), "TOKEN_MISSING");
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let manager = SecureTokenManager::from_vars(&vars(&[("NPM_TOKEN", "super-secret-value")]));
        assert!(!format!("{:?}", manager).contains("super-secret-value"));
    }

    #[test]
    fn test_mask_token() {
        let manager = SecureTokenManager::default();
        assert_eq!(manager.mask_token("short"), "****");
        assert_eq!(manager.mask_token(""), "****");
        assert_eq!(manager.mask_token("abcdef123456"), "abc...456");
        assert_eq!(manager.mask_token("very-long-token-string"), "ver...ing");
    }

    #[test]
    fn test_mask_tokens_in_string() {
        let manager = SecureTokenManager::with_token(SecretString::from(
            "secret+npm.token-12345".to_string(),
        ));
        let output = manager.mask_tokens_in_string("//registry/:_authToken=secret+npm.token-12345");

        assert!(output.contains("sec...345"));
        assert!(!output.contains("secret+npm.token-12345"));
        assert_eq!(
            SecureTokenManager::default().mask_tokens_in_string("nothing here"),
            "nothing here"
        );
    }
}
