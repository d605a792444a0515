//! レジストリ認証情報の提供元
//!
//! 公開時に使う認証情報を [`CredentialSource`] として提供します。既定の
//! 実装は環境変数ベースで、テストや組み込み用に固定値の実装もあります。

use taleforge_core::{CredentialError, CredentialSource, RegistryCredentials};

/// 環境変数 `REGISTRY_USER` / `REGISTRY_PASS` から認証情報を読む
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn read_env() -> Result<RegistryCredentials, CredentialError> {
        let username = std::env::var("REGISTRY_USER")
            .map_err(|_| CredentialError::Missing("REGISTRY_USER".to_string()))?;
        let secret = std::env::var("REGISTRY_PASS")
            .map_err(|_| CredentialError::Missing("REGISTRY_PASS".to_string()))?;
        Ok(RegistryCredentials { username, secret })
    }
}

impl CredentialSource for EnvCredentials {
    async fn registry_credentials(&self) -> Result<RegistryCredentials, CredentialError> {
        Self::read_env()
    }
}

/// 固定の認証情報
///
/// ホスト側が認証情報を別の方法で取得している場合に使う。
#[derive(Debug, Clone)]
pub struct StaticCredentials(RegistryCredentials);

impl StaticCredentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self(RegistryCredentials {
            username: username.into(),
            secret: secret.into(),
        })
    }
}

impl CredentialSource for StaticCredentials {
    async fn registry_credentials(&self) -> Result<RegistryCredentials, CredentialError> {
        Ok(self.0.clone())
    }
}
