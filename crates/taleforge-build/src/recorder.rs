//! ビルド結果のカタログ記録
//!
//! 試行の終端状態から Tale に書き込む `imageInfo` を構築します。書き込み
//! 自体はカタログクライアントの単一更新で行われ、部分的な書き込みが
//! 観測されることはありません。

use taleforge_core::{ImageInfo, ImageStatus};

/// 試行の結果から `imageInfo` レコードを構築する
///
/// 成功時は `last_build` をこのビルドの開始時刻に進め、新しいダイジェスト
/// を記録する。失敗・キャンセル時は `last_build` とダイジェストを前回の
/// 記録から据え置く（直前に公開されたイメージが引き続き有効なため）。
/// `builder_version` はどの結果でも今回試行したビルダーイメージを刻む。
pub fn outcome_record(
    status: ImageStatus,
    prior: Option<&ImageInfo>,
    image_id: &str,
    builder_version: &str,
    start_time: i64,
    digest: Option<String>,
) -> ImageInfo {
    match status {
        ImageStatus::Success => ImageInfo {
            last_build: start_time,
            image_id: image_id.to_string(),
            digest,
            builder_version: builder_version.to_string(),
            status,
        },
        ImageStatus::Failure | ImageStatus::Cancelled => ImageInfo {
            last_build: prior.map(|p| p.last_build).unwrap_or(0),
            image_id: image_id.to_string(),
            digest: prior.and_then(|p| p.digest.clone()),
            builder_version: builder_version.to_string(),
            status,
        },
    }
}
