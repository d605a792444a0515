//! ビルドパイプラインが必要とするコンテナ操作の抽象
//!
//! 本番実装は [`crate::docker::DockerRuntime`]。テストではこのトレイトを
//! 実装したフェイクを注入する。

use std::fmt;
use std::path::PathBuf;

use futures_util::stream::BoxStream;
use taleforge_core::RegistryCredentials;

use crate::error::Result;

/// 自動削除されたコンテナの終了コードを観測できなかったときに報告する合成値
pub const VANISHED_EXIT_CODE: i64 = -123;

/// コンテナランタイムのトレイト
///
/// ビルダーコンテナのライフサイクルとイメージ操作をまとめる。
/// すべての削除系操作は冪等であること（対象が既に存在しなければ成功扱い）。
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// イメージをレジストリから取得する
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// イメージがローカルに存在するかを確認する
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// ビルダーコンテナをデタッチ起動し、コンテナIDを返す
    async fn run_builder(&self, spec: &BuilderSpec) -> Result<String>;

    /// ビルダーの標準出力・標準エラーを行単位でストリームする
    fn builder_logs(&self, container: &str) -> BoxStream<'_, Result<String>>;

    /// ビルダーの終了を待ち、終了コードを返す
    ///
    /// auto_remove により待機前にコンテナが消えていた場合は
    /// [`VANISHED_EXIT_CODE`] を返す。
    async fn wait_builder(&self, container: &str) -> Result<i64>;

    /// ビルダーコンテナを強制削除する（存在しなければ成功扱い）
    async fn remove_builder(&self, container: &str) -> Result<()>;

    /// ローカルイメージを認証付きでレジストリへプッシュする
    async fn push_image(&self, image: &str, credentials: &RegistryCredentials) -> Result<()>;

    /// プッシュ済みイメージのレジストリダイジェストを解決する
    ///
    /// RepoDigests のうち `registry_host` 配下のエントリを返す。
    /// 該当エントリがなければ `None`（エラーにはしない）。
    async fn image_digest(&self, image: &str, registry_host: &str) -> Result<Option<String>>;

    /// ローカルイメージタグを削除する（存在しなければ成功扱い）
    async fn remove_image(&self, image: &str) -> Result<()>;
}

/// ビルダーコンテナの起動仕様
///
/// コンテナ名は `taleforge-builder-<tale_id>-<start_time>` で決定的に導出され、
/// 起動前後いつでも同じ名前でクリーンアップできる。
#[derive(Clone)]
pub struct BuilderSpec {
    /// ビルダーイメージ（repo2docker 互換）
    pub image: String,
    /// コンテナ内で実行するコマンド一式
    pub command: Vec<String>,
    /// ビルド対象の Tale ID
    pub tale_id: String,
    /// ビルド開始時刻（UNIXエポック秒）
    pub start_time: i64,
    /// ホスト側の一時ディレクトリルート。`/host/tmp` として読み取り専用マウントされる
    pub temp_root: PathBuf,
}

impl BuilderSpec {
    /// 決定的なコンテナ名
    pub fn container_name(&self) -> String {
        format!("taleforge-builder-{}-{}", self.tale_id, self.start_time)
    }
}

// command にはシークレット由来の build-arg が含まれうるため、値は出力しない
impl fmt::Debug for BuilderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderSpec")
            .field("image", &self.image)
            .field("command", &format_args!("<{} args>", self.command.len()))
            .field("tale_id", &self.tale_id)
            .field("start_time", &self.start_time)
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_is_deterministic() {
        let spec = BuilderSpec {
            image: "taleforge/repo2docker:latest".to_string(),
            command: vec!["jupyter-repo2docker".to_string()],
            tale_id: "tale1".to_string(),
            start_time: 1624994605,
            temp_root: PathBuf::from("/tmp"),
        };

        assert_eq!(spec.container_name(), "taleforge-builder-tale1-1624994605");
        assert_eq!(spec.container_name(), spec.container_name());
    }

    #[test]
    fn test_debug_hides_command_contents() {
        let spec = BuilderSpec {
            image: "taleforge/repo2docker:latest".to_string(),
            command: vec![
                "jupyter-repo2docker".to_string(),
                "--build-arg".to_string(),
                "STATA_LICENSE_ENCODED=c2VjcmV0".to_string(),
            ],
            tale_id: "tale2".to_string(),
            start_time: 1624994605,
            temp_root: PathBuf::from("/tmp"),
        };

        let debug = format!("{:?}", spec);
        assert!(!debug.contains("c2VjcmV0"));
        assert!(debug.contains("<3 args>"));
    }
}
