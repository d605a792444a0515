//! レジストリ認証のインターフェース

use std::fmt;
use thiserror::Error;

/// 認証情報取得のエラー
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("レジストリ認証情報が設定されていません: {0}")]
    Missing(String),

    #[error("レジストリ認証情報の取得に失敗しました: {0}")]
    Unavailable(String),
}

/// レジストリ認証情報
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub secret: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // secret はログに出さない
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// 認証情報の提供元
#[allow(async_fn_in_trait)]
pub trait CredentialSource {
    async fn registry_credentials(&self) -> Result<RegistryCredentials, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = RegistryCredentials {
            username: "builder".to_string(),
            secret: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("builder"));
        assert!(!debug.contains("hunter2"));
    }
}
