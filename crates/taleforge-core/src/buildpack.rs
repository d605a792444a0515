//! ビルドパックレジストリと引数解決
//!
//! ビルドパック識別子を (ベースビルダーイメージ, 追加ビルド引数列) に解決
//! します。ワークスペースをイメージ化する戦略はここに列挙された閉じた集合
//! だけで、未知の識別子は `CoreError::UnknownBuildpack` になります。
//!
//! シークレットの値は `BuildArg` の中に閉じ込め、`Debug` 出力では伏せます。
//! ログに出してよいのはキー（存在）だけです。

use crate::error::{CoreError, Result};
use crate::settings::BuildSettings;
use base64::Engine;
use std::fmt;
use std::path::Path;

/// 既知のビルドパック
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buildpack {
    /// 汎用 Jupyter 環境。追加引数なし
    Jupyter,
    /// Stata 環境。ライセンスファイルを base64 で埋め込む
    Stata,
    /// MATLAB 環境。インストールキーを埋め込む
    Matlab,
}

impl Buildpack {
    /// カタログの識別子からビルドパックを解決
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "jupyter" => Ok(Buildpack::Jupyter),
            "stata" => Ok(Buildpack::Stata),
            "matlab" => Ok(Buildpack::Matlab),
            other => Err(CoreError::UnknownBuildpack(other.to_string())),
        }
    }

    /// カタログ上の識別子
    pub fn name(&self) -> &'static str {
        match self {
            Buildpack::Jupyter => "jupyter",
            Buildpack::Stata => "stata",
            Buildpack::Matlab => "matlab",
        }
    }

    /// このビルドパックが使用するベースビルダーイメージ
    ///
    /// 現状は全ビルドパックが同一の repo2docker イメージを共有する。
    pub fn builder_image(&self, settings: &BuildSettings) -> String {
        settings.builder_image.clone()
    }

    /// ビルドパック固有の追加ビルド引数を宣言順に解決
    ///
    /// シークレットはここで初めて読み込まれる。
    pub fn build_args(&self, settings: &BuildSettings) -> Result<Vec<BuildArg>> {
        match self {
            Buildpack::Jupyter => Ok(Vec::new()),
            Buildpack::Stata => {
                let path = settings
                    .stata_license_path
                    .as_deref()
                    .ok_or(CoreError::MissingSecret {
                        name: "STATA_LICENSE_PATH",
                    })?;
                let license =
                    std::fs::read(path).map_err(|e| CoreError::LicenseUnreadable {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&license);
                Ok(vec![BuildArg::new("STATA_LICENSE_ENCODED", encoded)])
            }
            Buildpack::Matlab => {
                let key = settings
                    .matlab_install_key
                    .as_deref()
                    .ok_or(CoreError::MissingSecret {
                        name: "MATLAB_FILE_INSTALLATION_KEY",
                    })?;
                Ok(vec![BuildArg::new("FILE_INSTALLATION_KEY", key)])
            }
        }
    }
}

/// `--build-arg KEY=VALUE` の 1 エントリ
#[derive(Clone, PartialEq, Eq)]
pub struct BuildArg {
    key: String,
    value: String,
}

impl BuildArg {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// 引数のキー（ログ出力可）
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `KEY=VALUE` 形式に展開（コマンド組み立て専用）
    pub fn render(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl fmt::Debug for BuildArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 値はシークレット由来のことがあるため出さない
        f.debug_struct("BuildArg")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// ビルダープロセスのコマンドラインを組み立てる
///
/// 並び順は下流のログ/監査ツールとの互換性のため固定:
/// 基本フラグ → `--build-arg` 列（宣言順） → `--image-name` → コンテキストパス。
pub fn builder_command(
    settings: &BuildSettings,
    build_args: &[BuildArg],
    image_name: &str,
    context_path: &Path,
) -> Vec<String> {
    let mut cmd = vec![
        "jupyter-repo2docker".to_string(),
        "--config=/taleforge/repo2docker_config.py".to_string(),
        format!(
            "--target-repo-dir=/home/{}/work/workspace",
            settings.builder_user
        ),
        format!("--user-id={}", settings.builder_uid),
        format!("--user-name={}", settings.builder_user),
        "--no-clean".to_string(),
        "--no-run".to_string(),
        "--debug".to_string(),
    ];

    for arg in build_args {
        cmd.push("--build-arg".to_string());
        cmd.push(arg.render());
    }

    cmd.push("--image-name".to_string());
    cmd.push(image_name.to_string());
    cmd.push(context_path.display().to_string());

    cmd
}
