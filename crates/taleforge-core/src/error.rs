use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("不明なビルドパックです: '{0}'")]
    UnknownBuildpack(String),

    #[error(
        "シークレット '{name}' が設定されていません\nヒント: デプロイメント設定または環境変数 {name} を確認してください"
    )]
    MissingSecret { name: &'static str },

    #[error("ライセンスファイルを読み込めません: {path}\n理由: {message}")]
    LicenseUnreadable { path: PathBuf, message: String },

    #[error("環境変数 {name} の値が不正です: '{value}'")]
    InvalidSetting { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
