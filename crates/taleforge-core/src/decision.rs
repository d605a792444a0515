//! 再ビルド判定エンジン
//!
//! カタログメタデータのみから BUILD / SKIP を決める純粋関数。
//! 高コストなビルドを省略できるかどうかの分岐ポリシーはここに隔離します。

use crate::tale::{ImageInfo, ImageStatus, Workspace};

/// 再ビルド判定の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildDecision {
    Build,
    Skip,
}

/// 再ビルドが必要かどうかを判定
///
/// 以下のいずれかに該当すれば `Build`:
/// 1. `force` が指定されている
/// 2. 一度もビルドされていない（`image_info` なし、または `last_build <= 0`）
/// 3. ワークスペースが前回ビルドより後に更新されている
/// 4. 前回のビルドが失敗として記録されている
///
/// それ以外は `Skip`。副作用なし。staleness の比較述語を差し替える場合も
/// この関数の中だけで完結する。
pub fn should_rebuild(
    force: bool,
    workspace: &Workspace,
    image_info: Option<&ImageInfo>,
) -> RebuildDecision {
    if force {
        return RebuildDecision::Build;
    }

    let Some(info) = image_info else {
        return RebuildDecision::Build;
    };

    if info.last_build <= 0 {
        return RebuildDecision::Build;
    }

    if workspace.updated.timestamp() > info.last_build {
        return RebuildDecision::Build;
    }

    if info.status == ImageStatus::Failure {
        return RebuildDecision::Build;
    }

    RebuildDecision::Skip
}
