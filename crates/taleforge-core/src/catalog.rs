//! 外部カタログクライアントのインターフェース
//!
//! Tale / Workspace レコードを所有する外部カタログへの操作面。実装は
//! パイプラインを呼び出すホストランタイム側にあり、テストではフェイクに
//! 差し替えます。

use crate::tale::{ImageInfo, Tale, Workspace};
use std::path::Path;
use thiserror::Error;

/// カタログ操作のエラー
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{kind} '{id}' がカタログに存在しません")]
    NotFound { kind: &'static str, id: String },

    #[error("カタログ API エラー: {0}")]
    Api(String),

    #[error("ワークスペース取得エラー: {0}")]
    Io(#[from] std::io::Error),
}

/// カタログ/メタデータクライアント
#[allow(async_fn_in_trait)]
pub trait CatalogClient {
    /// Tale レコードを取得
    async fn get_tale(&self, tale_id: &str) -> Result<Tale, CatalogError>;

    /// ワークスペースレコードを取得
    async fn get_workspace(&self, workspace_id: &str) -> Result<Workspace, CatalogError>;

    /// ワークスペースの内容を `dest` に再帰的にダウンロード
    async fn download_workspace(
        &self,
        workspace_id: &str,
        dest: &Path,
    ) -> Result<(), CatalogError>;

    /// Tale の `imageInfo` を置き換える
    ///
    /// 実装は単一の原子的な更新として適用すること。部分的な書き込み
    /// （status なしで digest だけ等）が観測されてはならない。
    async fn update_image_info(
        &self,
        tale_id: &str,
        info: &ImageInfo,
    ) -> Result<(), CatalogError>;
}
