//! Tale カタログレコード
//!
//! 外部カタログが所有する Tale / Workspace / ImageInfo レコードの表現。
//! フィールド名はカタログのワイヤフォーマットに合わせます（`last_build` と
//! `imageId` のように snake_case と camelCase が混在するのはカタログ側の
//! 契約そのまま）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tale レコード（外部カタログ所有、本パイプラインは read-modify-write）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tale {
    /// Tale の一意な識別子
    pub id: String,
    /// ワークスペース（コード/データ）への参照。
    /// ユーザーが本パイプラインと無関係に変更しうる
    pub workspace_id: String,
    /// 環境レシピ（ビルドパック）の識別子
    pub image_id: String,
    /// 直近のビルド記録。一度もビルドされていなければ None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
}

/// ワークスペースレコード（本パイプラインからは読み取り専用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// ワークスペースの一意な識別子
    pub id: String,
    /// 最終更新時刻。ユーザーの変更ごとに厳密に増加する
    pub updated: DateTime<Utc>,
}

/// ビルド記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// ビルド開始時刻（unix 秒）。完了したビルドでのみ更新され、
    /// 決して巻き戻らない。未成功なら 0
    pub last_build: i64,
    /// ビルドに使用した環境レシピの識別子
    #[serde(rename = "imageId")]
    pub image_id: String,
    /// レジストリ上のコンテンツダイジェスト
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// 使用したビルダーイメージ（バージョン込み）
    pub builder_version: String,
    /// 記録されたビルドステータス
    pub status: ImageStatus,
}

/// カタログに記録されるビルドステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Success,
    Failure,
    Cancelled,
}
