//! デプロイメント設定
//!
//! ビルドパイプラインが参照するデプロイメント固有の値。既定値を持ち、
//! 環境変数で上書きできます。

use crate::error::{CoreError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// ビルドパイプラインの設定
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// 公開先レジストリの URL
    pub registry_url: String,
    /// ビルダー（repo2docker）イメージ
    pub builder_image: String,
    /// ビルダーコンテナ内のユーザー名
    pub builder_user: String,
    /// ビルダーコンテナ内のユーザー ID
    pub builder_uid: u32,
    /// ビルドコンテキストを作成する一時ディレクトリのルート。
    /// ビルダーコンテナに read-only でマウントされる
    pub temp_root: PathBuf,
    /// ビルダープロセス全体の実行時間上限
    pub build_timeout: Duration,
    /// キャンセルのポーリング間隔（ログ無出力時のアイドルタイムアウト）
    pub cancel_poll_interval: Duration,
    /// Stata ライセンスファイルのパス
    pub stata_license_path: Option<PathBuf>,
    /// MATLAB インストールキー
    pub matlab_install_key: Option<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            registry_url: "https://registry.taleforge.dev".to_string(),
            builder_image: "taleforge/repo2docker:latest".to_string(),
            builder_user: "jovyan".to_string(),
            builder_uid: 1000,
            temp_root: PathBuf::from("/tmp"),
            build_timeout: Duration::from_secs(3600),
            cancel_poll_interval: Duration::from_secs(1),
            stata_license_path: None,
            matlab_install_key: None,
        }
    }
}

impl BuildSettings {
    /// 環境変数から設定を読み込む
    ///
    /// 未設定の項目は既定値のまま。数値項目のパース失敗はエラー。
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("TALEFORGE_REGISTRY_URL") {
            settings.registry_url = url;
        }
        if let Ok(image) = std::env::var("TALEFORGE_BUILDER_IMAGE") {
            settings.builder_image = image;
        }
        if let Ok(user) = std::env::var("TALEFORGE_BUILDER_USER") {
            settings.builder_user = user;
        }
        if let Ok(uid) = std::env::var("TALEFORGE_BUILDER_UID") {
            settings.builder_uid = parse_env("TALEFORGE_BUILDER_UID", &uid)?;
        }
        if let Ok(root) = std::env::var("TALEFORGE_TEMP_ROOT") {
            settings.temp_root = PathBuf::from(root);
        }
        if let Ok(secs) = std::env::var("TALEFORGE_BUILD_TIMEOUT") {
            settings.build_timeout =
                Duration::from_secs(parse_env("TALEFORGE_BUILD_TIMEOUT", &secs)?);
        }
        if let Ok(secs) = std::env::var("TALEFORGE_CANCEL_POLL_SECS") {
            settings.cancel_poll_interval =
                Duration::from_secs(parse_env("TALEFORGE_CANCEL_POLL_SECS", &secs)?);
        }
        if let Ok(path) = std::env::var("STATA_LICENSE_PATH") {
            settings.stata_license_path = Some(PathBuf::from(path));
        }
        if let Ok(key) = std::env::var("MATLAB_FILE_INSTALLATION_KEY") {
            settings.matlab_install_key = Some(key);
        }

        tracing::debug!(
            registry = %settings.registry_url,
            builder = %settings.builder_image,
            "loaded build settings"
        );

        Ok(settings)
    }

    /// イメージパスの先頭に付くレジストリホスト（スキームを除いた部分）
    pub fn registry_host(&self) -> String {
        let host = match self.registry_url.split_once("://") {
            Some((_, rest)) => rest,
            None => self.registry_url.as_str(),
        };
        host.trim_end_matches('/').to_string()
    }

    /// ビルド先イメージのフルパス
    ///
    /// `<registry-host>/<tale_id>/<start_time>`。start_time はセマンティック
    /// バージョンではなく一意性のための識別子。
    pub fn image_name(&self, tale_id: &str, start_time: i64) -> String {
        format!("{}/{}/{}", self.registry_host(), tale_id, start_time)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| CoreError::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
    })
}
