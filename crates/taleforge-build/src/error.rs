use taleforge_core::{CatalogError, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Buildpack resolution failed: {0}")]
    Buildpack(#[from] CoreError),

    #[error("Catalog operation failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Failed to prepare build context: {0}")]
    ContextPrepare(String),

    #[error("Failed to launch builder from image '{image}': {message}")]
    BuilderLaunch { image: String, message: String },

    #[error("Build failed: {reason}")]
    BuildFailed { reason: String },

    #[error("Failed to publish image '{image}': {message}")]
    Publish { image: String, message: String },

    #[error("Failed to record build outcome: {0}")]
    Record(#[source] CatalogError),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::Buildpack(e) => {
                format!(
                    "ビルドの前提条件を解決できません: {}\n\
                     \n\
                     Taleのビルドパック設定と環境変数を確認してください。",
                    e
                )
            }
            BuildError::BuilderLaunch { image, message } => {
                format!(
                    "ビルダーを起動できません: {}\n\
                     \n\
                     解決方法:\n\
                     1. ビルダーイメージ '{}' が取得可能か確認してください\n\
                     2. Dockerデーモンの状態を確認してください",
                    message, image
                )
            }
            BuildError::BuildFailed { reason } => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     ビルダーのログ末尾を確認してください。",
                    reason
                )
            }
            BuildError::Publish { image, message } => {
                format!(
                    "イメージ '{}' のプッシュに失敗しました: {}\n\
                     \n\
                     レジストリの認証情報（REGISTRY_USER / REGISTRY_PASS）を確認してください。",
                    image, message
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
