//! ビルドパイプラインのオーケストレーター
//!
//! 再ビルド判定 → コンテキスト準備 → ビルダー起動 → 公開 → 記録を
//! 順に実行し、どの経路でも無条件クリーンアップを通してから終端
//! ステータスを返します。エラーはすべて [`BuildResult`] に畳み込まれ、
//! パイプラインの外へ生のまま伝播することはありません。
//!
//! コラボレーター（カタログ・コンテナランタイム・認証情報）はコンストラクタ
//! で注入され、テストではフェイクに差し替えられます。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use taleforge_container::{BuilderSpec, ContainerRuntime};
use taleforge_core::{
    BuildArg, BuildSettings, Buildpack, CatalogClient, CredentialSource, ImageInfo, ImageStatus,
    RebuildDecision, Tale, builder_command, should_rebuild,
};

use crate::builder::{BuildOutcome, BuildVerdict, BuilderRunner, LogSink};
use crate::cancel::CancelToken;
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::pusher::ImagePusher;
use crate::recorder::outcome_record;

/// `build()` の終端ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Skipped,
    Succeeded,
    Failed,
    Cancelled,
}

/// `build()` の結果
///
/// 呼び出し側は必ずこの終端ステータスと有界な診断情報を受け取る。
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub status: BuildStatus,
    /// ビルドに使った（またはスキップ時は既存の）環境レシピの識別子
    #[serde(rename = "imageId", skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 診断用に保持したログ末尾（上限あり）
    pub log_tail: Vec<String>,
}

impl BuildResult {
    /// 判定ゲートが SKIP を返したときの結果。既存の記録をそのまま返す
    fn skipped(info: Option<&ImageInfo>) -> Self {
        Self {
            status: BuildStatus::Skipped,
            image_id: info.map(|i| i.image_id.clone()),
            digest: info.and_then(|i| i.digest.clone()),
            error: None,
            log_tail: Vec::new(),
        }
    }

    /// 記録対象にならない前段の失敗（カタログ読み取り・引数解決）
    fn rejected(error: &BuildError) -> Self {
        Self {
            status: BuildStatus::Failed,
            image_id: None,
            digest: None,
            error: Some(error.to_string()),
            log_tail: Vec::new(),
        }
    }
}

/// 実行部の終端状態（記録前の中間表現）
enum Attempt {
    Succeeded {
        digest: Option<String>,
        log_tail: Vec<String>,
    },
    Failed {
        error: BuildError,
        log_tail: Vec<String>,
    },
    Cancelled {
        log_tail: Vec<String>,
    },
}

/// Tale イメージのビルドパイプライン
pub struct BuildPipeline<C, R, K> {
    catalog: C,
    runtime: R,
    credentials: K,
    settings: BuildSettings,
    /// Tale ごとの排他ロック。同一 Tale のビルドは常に単一飛行
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C, R, K> BuildPipeline<C, R, K>
where
    C: CatalogClient,
    R: ContainerRuntime,
    K: CredentialSource,
{
    pub fn new(catalog: C, runtime: R, credentials: K, settings: BuildSettings) -> Self {
        Self {
            catalog,
            runtime,
            credentials,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Tale のイメージをビルドする
    ///
    /// 再ビルド判定で不要とされれば既存の記録を返すだけで副作用はない。
    /// キャンセルは `cancel` 経由の協調方式で、ポーリング間隔以内に
    /// ビルダーが停止する。ビルダーの出力行は `sink` へ到着順にそのまま
    /// 中継される。
    ///
    /// 同じ Tale への並行呼び出しは先行ビルドの完了までブロックし、その
    /// 結果を判定ゲート越しに観測する（先行が成功していれば通常 `skipped`）。
    pub async fn build(
        &self,
        tale_id: &str,
        force: bool,
        cancel: &CancelToken,
        sink: &mut dyn LogSink,
    ) -> BuildResult {
        let _flight = self.tale_lock(tale_id).await;

        // カタログ読み取りの失敗は記録なしで返す
        let tale = match self.catalog.get_tale(tale_id).await {
            Ok(tale) => tale,
            Err(e) => return BuildResult::rejected(&BuildError::Catalog(e)),
        };
        let workspace = match self.catalog.get_workspace(&tale.workspace_id).await {
            Ok(workspace) => workspace,
            Err(e) => return BuildResult::rejected(&BuildError::Catalog(e)),
        };

        if should_rebuild(force, &workspace, tale.image_info.as_ref()) == RebuildDecision::Skip {
            tracing::info!(tale = %tale.id, "ワークスペースに変更がないためビルドをスキップ");
            return BuildResult::skipped(tale.image_info.as_ref());
        }

        // ビルドパックと引数の解決。ここでの失敗は記録しない
        // （以前の正常なイメージに対する無意味な再ビルドを強制しないため）
        let pack = match Buildpack::from_name(&tale.image_id) {
            Ok(pack) => pack,
            Err(e) => return BuildResult::rejected(&BuildError::Buildpack(e)),
        };
        let build_args = match pack.build_args(&self.settings) {
            Ok(args) => args,
            Err(e) => return BuildResult::rejected(&BuildError::Buildpack(e)),
        };

        let start_time = Utc::now().timestamp();
        let builder_image = pack.builder_image(&self.settings);
        let image_name = self.settings.image_name(tale_id, start_time);

        tracing::info!(
            tale = %tale.id,
            buildpack = pack.name(),
            image = %image_name,
            "ビルド開始"
        );

        // ここから先の失敗はすべて記録対象
        let attempt = self
            .execute(
                &tale,
                &build_args,
                &builder_image,
                &image_name,
                start_time,
                cancel,
                sink,
            )
            .await;

        self.record_and_report(&tale, &builder_image, start_time, attempt)
            .await
    }

    /// コンテキスト準備からビルダー実行・公開までの実行部
    ///
    /// コンテキストが作られた後は、結果にかかわらずコンテキスト・
    /// ビルダーコンテナ・ローカルイメージを必ず片付ける。
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        tale: &Tale,
        build_args: &[BuildArg],
        builder_image: &str,
        image_name: &str,
        start_time: i64,
        cancel: &CancelToken,
        sink: &mut dyn LogSink,
    ) -> Attempt {
        let context = match BuildContext::prepare(
            &self.catalog,
            &tale.workspace_id,
            &self.settings.temp_root,
        )
        .await
        {
            Ok(context) => context,
            Err(error) => {
                return Attempt::Failed {
                    error,
                    log_tail: Vec::new(),
                };
            }
        };

        let spec = BuilderSpec {
            image: builder_image.to_string(),
            command: builder_command(&self.settings, build_args, image_name, context.path()),
            tale_id: tale.id.clone(),
            start_time,
            temp_root: self.settings.temp_root.clone(),
        };

        let runner = BuilderRunner::new(
            &self.runtime,
            self.settings.cancel_poll_interval,
            self.settings.build_timeout,
        );

        let attempt = match runner.run(&spec, cancel, sink).await {
            Err(error) => Attempt::Failed {
                error,
                log_tail: Vec::new(),
            },
            Ok(BuildOutcome {
                verdict: BuildVerdict::Cancelled,
                log_tail,
            }) => Attempt::Cancelled { log_tail },
            Ok(BuildOutcome {
                verdict: BuildVerdict::Failed { reason, .. },
                log_tail,
            }) => Attempt::Failed {
                error: BuildError::BuildFailed { reason },
                log_tail,
            },
            Ok(BuildOutcome {
                verdict: BuildVerdict::Succeeded,
                log_tail,
            }) => {
                let pusher = ImagePusher::new(&self.runtime, &self.credentials);
                match pusher
                    .publish(image_name, &self.settings.registry_host())
                    .await
                {
                    Ok(digest) => Attempt::Succeeded { digest, log_tail },
                    Err(error) => Attempt::Failed { error, log_tail },
                }
            }
        };

        self.cleanup(context, &spec.container_name(), image_name)
            .await;

        attempt
    }

    /// ビルド試行が作ったリソースを片付ける
    ///
    /// どの終端状態でも実行される。失敗はログに残すのみで、主結果を
    /// 覆い隠さない。
    async fn cleanup(&self, context: BuildContext, container_name: &str, image_name: &str) {
        context.discard();

        // ランナーが落とし損ねていてもここで必ず回収する（冪等）
        if let Err(e) = self.runtime.remove_builder(container_name).await {
            tracing::warn!(
                "クリーンアップ: ビルダー削除に失敗しました: {}: {}",
                container_name,
                e
            );
        }

        // ローカルタグは公開後は不要。失敗時もホストに蓄積させない
        if let Err(e) = self.runtime.remove_image(image_name).await {
            tracing::warn!(
                "クリーンアップ: ローカルイメージ削除に失敗しました: {}: {}",
                image_name,
                e
            );
        }
    }

    /// 試行の終端状態をカタログへ記録し、呼び出し側への結果を組み立てる
    async fn record_and_report(
        &self,
        tale: &Tale,
        builder_image: &str,
        start_time: i64,
        attempt: Attempt,
    ) -> BuildResult {
        let prior = tale.image_info.as_ref();

        match attempt {
            Attempt::Succeeded { digest, log_tail } => {
                let record = outcome_record(
                    ImageStatus::Success,
                    prior,
                    &tale.image_id,
                    builder_image,
                    start_time,
                    digest.clone(),
                );
                match self.catalog.update_image_info(&tale.id, &record).await {
                    Ok(()) => {
                        tracing::info!(tale = %tale.id, digest = ?digest, "ビルド成功を記録しました");
                        BuildResult {
                            status: BuildStatus::Succeeded,
                            image_id: Some(tale.image_id.clone()),
                            digest,
                            error: None,
                            log_tail,
                        }
                    }
                    Err(e) => {
                        // ビルド自体は成功していてもカタログから観測できなければ
                        // failed として返す。ダイジェストは照合用に結果へ残す
                        let error = BuildError::Record(e);
                        tracing::error!(tale = %tale.id, "ビルド結果を記録できません: {}", error);
                        BuildResult {
                            status: BuildStatus::Failed,
                            image_id: Some(tale.image_id.clone()),
                            digest,
                            error: Some(error.to_string()),
                            log_tail,
                        }
                    }
                }
            }
            Attempt::Failed { error, log_tail } => {
                let record = outcome_record(
                    ImageStatus::Failure,
                    prior,
                    &tale.image_id,
                    builder_image,
                    start_time,
                    None,
                );
                if let Err(e) = self.catalog.update_image_info(&tale.id, &record).await {
                    tracing::error!(tale = %tale.id, "失敗の記録に失敗しました: {}", e);
                }
                tracing::warn!(tale = %tale.id, "ビルド失敗: {}", error);
                BuildResult {
                    status: BuildStatus::Failed,
                    image_id: Some(tale.image_id.clone()),
                    digest: None,
                    error: Some(error.to_string()),
                    log_tail,
                }
            }
            Attempt::Cancelled { log_tail } => {
                let record = outcome_record(
                    ImageStatus::Cancelled,
                    prior,
                    &tale.image_id,
                    builder_image,
                    start_time,
                    None,
                );
                if let Err(e) = self.catalog.update_image_info(&tale.id, &record).await {
                    tracing::error!(tale = %tale.id, "キャンセルの記録に失敗しました: {}", e);
                }
                tracing::info!(tale = %tale.id, "ビルドはキャンセルされました");
                BuildResult {
                    status: BuildStatus::Cancelled,
                    image_id: Some(tale.image_id.clone()),
                    digest: None,
                    error: None,
                    log_tail,
                }
            }
        }
    }

    /// Tale ごとの排他ロックを取得する
    ///
    /// 同じ Tale のビルドが進行中なら、その完了までここで待つ。
    async fn tale_lock(&self, tale_id: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(tale_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        cell.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_field_names() {
        let result = BuildResult {
            status: BuildStatus::Succeeded,
            image_id: Some("jupyter".to_string()),
            digest: Some("sha256:abc".to_string()),
            error: None,
            log_tail: vec!["Successfully built".to_string()],
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value.get("status").unwrap(), "succeeded");
        assert_eq!(value.get("imageId").unwrap(), "jupyter");
        assert_eq!(value.get("digest").unwrap(), "sha256:abc");
        // 省略可能なフィールドは None のとき出力しない
        assert!(value.get("error").is_none());
        assert_eq!(value.get("log_tail").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_string(&BuildStatus::Skipped).unwrap(),
            "\"skipped\""
        );
        assert_eq!(
            serde_json::to_string(&BuildStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_skipped_result_carries_existing_record() {
        let info = ImageInfo {
            last_build: 1624994605,
            image_id: "jupyter".to_string(),
            digest: Some("sha256:abc".to_string()),
            builder_version: "taleforge/repo2docker:latest".to_string(),
            status: ImageStatus::Success,
        };

        let result = BuildResult::skipped(Some(&info));
        assert_eq!(result.status, BuildStatus::Skipped);
        assert_eq!(result.image_id.as_deref(), Some("jupyter"));
        assert_eq!(result.digest.as_deref(), Some("sha256:abc"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_skipped_result_without_record() {
        let result = BuildResult::skipped(None);
        assert_eq!(result.status, BuildStatus::Skipped);
        assert!(result.image_id.is_none());
        assert!(result.digest.is_none());
    }
}
