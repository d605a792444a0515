//! ビルドコンテキストの準備
//!
//! ワークスペースの内容を、ビルダーだけが消費する一時スナップショットへ
//! 取得します。ディレクトリは 1 回のビルド試行が専有し、試行の終わりに
//! 必ず破棄されます。

use std::path::Path;

use taleforge_core::CatalogClient;
use tempfile::TempDir;

use crate::error::{BuildError, Result};

/// 1 回のビルド試行が専有するビルドコンテキスト
///
/// `temp_root` 直下に一意な名前のディレクトリを作り、ワークスペースの
/// 内容を再帰的に取得して保持する。Drop でもディレクトリは消えるが、
/// クリーンアップの失敗をログに残すため通常は [`BuildContext::discard`]
/// を明示的に呼ぶ。
#[derive(Debug)]
pub struct BuildContext {
    dir: TempDir,
}

impl BuildContext {
    /// ワークスペースのスナップショットを一時ディレクトリに準備する
    ///
    /// ダウンロードに失敗した場合は部分的な内容ごとディレクトリを破棄し、
    /// [`BuildError::ContextPrepare`] を返す。
    pub async fn prepare<C: CatalogClient>(
        catalog: &C,
        workspace_id: &str,
        temp_root: &Path,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("taleforge-build-")
            .tempdir_in(temp_root)
            .map_err(|e| BuildError::ContextPrepare(e.to_string()))?;

        tracing::debug!(
            workspace = workspace_id,
            path = %dir.path().display(),
            "ビルドコンテキストを準備中"
        );

        // 失敗時は dir の Drop が途中までの内容ごと片付ける
        catalog
            .download_workspace(workspace_id, dir.path())
            .await
            .map_err(|e| BuildError::ContextPrepare(e.to_string()))?;

        Ok(Self { dir })
    }

    /// コンテキストディレクトリのパス
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// コンテキストを破棄する
    ///
    /// 削除の失敗はログに残すのみで、呼び出し側へは伝播しない。
    pub fn discard(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(
                "ビルドコンテキストの削除に失敗しました: {}: {}",
                path.display(),
                e
            );
        }
    }
}
