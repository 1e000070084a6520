//! Token Store.
//!
//! Holds the server-issued capability tokens for this installation. Token
//! values never leave the crate: callers only learn which types are present
//! and valid. Mutation happens only as a side effect of a server reply.

use crate::{PsiCashError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Capability carried by a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Earner,
    Spender,
    Indicator,
    Account,
}

impl TokenType {
    /// All token types, in stable order.
    pub const ALL: [TokenType; 4] = [
        TokenType::Earner,
        TokenType::Spender,
        TokenType::Indicator,
        TokenType::Account,
    ];

    /// Stable name used at the external interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earner => "earner",
            Self::Spender => "spender",
            Self::Indicator => "indicator",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = PsiCashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "earner" => Ok(Self::Earner),
            "spender" => Ok(Self::Spender),
            "indicator" => Ok(Self::Indicator),
            "account" => Ok(Self::Account),
            other => Err(PsiCashError::invalid_argument(
                "token type",
                format!("unknown token type '{}'", other),
            )),
        }
    }
}

/// A server-issued token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: TokenType,
    pub(crate) value: String,
    pub valid: bool,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("value", &"<redacted>")
            .field("valid", &self.valid)
            .finish()
    }
}

/// The set of tokens held by this installation, at most one per type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStore {
    tokens: Vec<Token>,
    is_account: bool,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Types of the tokens currently held and valid, in stable order.
    pub fn valid_token_types(&self) -> Vec<TokenType> {
        let mut types: Vec<TokenType> = self
            .tokens
            .iter()
            .filter(|t| t.valid)
            .map(|t| t.token_type)
            .collect();
        types.sort();
        types
    }

    pub fn is_account(&self) -> bool {
        self.is_account
    }

    /// True if at least one held token is still valid.
    pub fn any_valid(&self) -> bool {
        self.tokens.iter().any(|t| t.valid)
    }

    /// Value of a valid token of the given type.
    pub(crate) fn value(&self, token_type: TokenType) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.token_type == token_type && t.valid)
            .map(|t| t.value.as_str())
    }

    /// Comma-separated values of every valid token, for the auth header.
    pub(crate) fn auth_header_value(&self) -> Option<String> {
        let mut tokens: Vec<&Token> = self.tokens.iter().filter(|t| t.valid).collect();
        if tokens.is_empty() {
            return None;
        }
        tokens.sort_by_key(|t| t.token_type);
        Some(
            tokens
                .iter()
                .map(|t| t.value.as_str())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Replace every token with a freshly issued set.
    pub(crate) fn replace_all(&mut self, issued: HashMap<TokenType, String>, is_account: bool) {
        let mut tokens: Vec<Token> = issued
            .into_iter()
            .map(|(token_type, value)| Token {
                token_type,
                value,
                valid: true,
            })
            .collect();
        tokens.sort_by_key(|t| t.token_type);
        self.tokens = tokens;
        self.is_account = is_account;
    }

    /// Apply server-reported validity, keyed by token value.
    ///
    /// Tokens the server did not mention keep their current flag.
    pub(crate) fn apply_validity(&mut self, validity: &HashMap<String, bool>) {
        for token in &mut self.tokens {
            if let Some(valid) = validity.get(&token.value) {
                token.valid = *valid;
            }
        }
    }

    pub(crate) fn set_is_account(&mut self, is_account: bool) {
        self.is_account = is_account;
    }

    /// Mark every token invalid. A new acquisition round is needed afterwards.
    pub(crate) fn invalidate_all(&mut self) {
        for token in &mut self.tokens {
            token.valid = false;
        }
    }

    /// Types that were held but are no longer valid.
    pub fn invalid_token_types(&self) -> Vec<TokenType> {
        self.tokens
            .iter()
            .filter(|t| !t.valid)
            .map(|t| t.token_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_tokens() -> HashMap<TokenType, String> {
        HashMap::from([
            (TokenType::Spender, "s-tok".to_string()),
            (TokenType::Earner, "e-tok".to_string()),
            (TokenType::Indicator, "i-tok".to_string()),
        ])
    }

    #[test]
    fn test_token_type_names_round_trip() {
        for t in TokenType::ALL {
            assert_eq!(t.as_str().parse::<TokenType>().unwrap(), t);
        }
        assert!("banker".parse::<TokenType>().is_err());
    }

    #[test]
    fn test_empty_store() {
        let store = TokenStore::new();
        assert!(store.valid_token_types().is_empty());
        assert!(!store.is_account());
        assert!(store.auth_header_value().is_none());
    }

    #[test]
    fn test_replace_all_and_header_order() {
        let mut store = TokenStore::new();
        store.replace_all(tracker_tokens(), false);

        assert_eq!(
            store.valid_token_types(),
            vec![TokenType::Earner, TokenType::Spender, TokenType::Indicator]
        );
        assert_eq!(store.auth_header_value().unwrap(), "e-tok,s-tok,i-tok");
        assert_eq!(store.value(TokenType::Spender), Some("s-tok"));
    }

    #[test]
    fn test_apply_validity_by_value() {
        let mut store = TokenStore::new();
        store.replace_all(tracker_tokens(), false);
        store.apply_validity(&HashMap::from([("s-tok".to_string(), false)]));

        assert_eq!(
            store.valid_token_types(),
            vec![TokenType::Earner, TokenType::Indicator]
        );
        assert_eq!(store.value(TokenType::Spender), None);
        assert_eq!(store.invalid_token_types(), vec![TokenType::Spender]);
    }

    #[test]
    fn test_invalidate_all() {
        let mut store = TokenStore::new();
        store.replace_all(tracker_tokens(), false);
        store.invalidate_all();

        assert!(!store.any_valid());
        assert!(store.valid_token_types().is_empty());
        assert_eq!(store.invalid_token_types().len(), 3);
    }

    #[test]
    fn test_debug_redacts_values() {
        let mut store = TokenStore::new();
        store.replace_all(tracker_tokens(), false);
        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("s-tok"));
        assert!(rendered.contains("<redacted>"));
    }
}
