//! ビルダー起動プロトコル
//!
//! 外部ビルダーを特権・自動削除のデタッチコンテナとして起動し、出力を
//! 行単位でライブ中継しながらキャンセルフラグと実行期限を監視します。
//! 状態遷移は `Created → Running → (Succeeded | Failed | Cancelled)` で、
//! 起動確認後はどの経路でもビルダープロセスを残しません。

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::StreamExt;
use taleforge_container::{BuilderSpec, ContainerRuntime};
use tokio::time::{Instant, timeout};

use crate::cancel::CancelToken;
use crate::error::{BuildError, Result};

/// 診断用に保持するログ末尾の行数上限
///
/// ログは別途シンクへライブ中継されるため、ここでの保持は失敗診断の
/// ための控えにすぎない。
pub const LOG_TAIL_LIMIT: usize = 200;

/// ビルダー実行の終端状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildVerdict {
    Succeeded,
    Failed {
        /// ビルダーの終了コード。プロセス終了以外の失敗では None
        exit_code: Option<i64>,
        reason: String,
    },
    Cancelled,
}

/// ビルダー実行の結果と診断用ログ末尾
#[derive(Debug)]
pub struct BuildOutcome {
    pub verdict: BuildVerdict,
    pub log_tail: Vec<String>,
}

impl BuildOutcome {
    fn succeeded(log_tail: Vec<String>) -> Self {
        Self {
            verdict: BuildVerdict::Succeeded,
            log_tail,
        }
    }

    fn failed(exit_code: Option<i64>, reason: String, log_tail: Vec<String>) -> Self {
        Self {
            verdict: BuildVerdict::Failed { exit_code, reason },
            log_tail,
        }
    }

    fn cancelled(log_tail: Vec<String>) -> Self {
        Self {
            verdict: BuildVerdict::Cancelled,
            log_tail,
        }
    }
}

/// ビルダーのログ行の送り先
///
/// 行は到着順にそのまま渡される。ホストランタイムのジョブログ等へ
/// 中継する実装を呼び出し側が注入する。
pub trait LogSink: Send {
    fn line(&mut self, line: &str);
}

/// 行を溜めるだけのシンク。テストや後処理向け
impl LogSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// ビルダーコンテナを起動して終端状態まで監視するランナー
pub struct BuilderRunner<'a, R> {
    runtime: &'a R,
    poll_interval: Duration,
    build_timeout: Duration,
}

impl<'a, R: ContainerRuntime> BuilderRunner<'a, R> {
    pub fn new(runtime: &'a R, poll_interval: Duration, build_timeout: Duration) -> Self {
        Self {
            runtime,
            poll_interval,
            build_timeout,
        }
    }

    /// ビルダーを起動し、終端状態になるまで監視する
    ///
    /// 起動前の失敗（イメージ取得不能・コンテナ作成失敗）だけが
    /// [`BuildError::BuilderLaunch`] になる。起動確認後の異常はすべて
    /// `Failed` の結果に畳み込まれ、コンテナは強制削除される。
    pub async fn run(
        &self,
        spec: &BuilderSpec,
        cancel: &CancelToken,
        sink: &mut dyn LogSink,
    ) -> Result<BuildOutcome> {
        if cancel.is_cancelled() {
            return Ok(BuildOutcome::cancelled(Vec::new()));
        }

        self.ensure_builder_image(&spec.image).await?;

        // イメージ取得中にキャンセルされていればコンテナを作らない
        if cancel.is_cancelled() {
            return Ok(BuildOutcome::cancelled(Vec::new()));
        }

        let container =
            self.runtime
                .run_builder(spec)
                .await
                .map_err(|e| BuildError::BuilderLaunch {
                    image: spec.image.clone(),
                    message: e.to_string(),
                })?;

        tracing::info!("ビルダー起動: {} ({})", spec.container_name(), container);

        Ok(self.watch(&container, cancel, sink).await)
    }

    /// ビルダーイメージを取得する
    ///
    /// 取得に失敗してもローカルコピーがあればそれで続行する。
    async fn ensure_builder_image(&self, image: &str) -> Result<()> {
        match self.runtime.pull_image(image).await {
            Ok(()) => Ok(()),
            Err(pull_err) => match self.runtime.image_exists(image).await {
                Ok(true) => {
                    tracing::warn!(
                        "イメージ取得に失敗しましたがローカルコピーを使用します: {}: {}",
                        image,
                        pull_err
                    );
                    Ok(())
                }
                _ => Err(BuildError::BuilderLaunch {
                    image: image.to_string(),
                    message: pull_err.to_string(),
                }),
            },
        }
    }

    /// 起動済みビルダーを終端状態まで監視する
    ///
    /// ログ 1 行ごと、出力がなければポーリング間隔ごとにキャンセルと
    /// 期限を確認する。ログの消費自体が生存確認を兼ねる。
    async fn watch(
        &self,
        container: &str,
        cancel: &CancelToken,
        sink: &mut dyn LogSink,
    ) -> BuildOutcome {
        let deadline = Instant::now() + self.build_timeout;
        let mut tail = LogTail::new(LOG_TAIL_LIMIT);
        let mut stream = self.runtime.builder_logs(container);
        let mut stream_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                drop(stream);
                self.force_stop(container).await;
                tracing::info!("キャンセル要求によりビルダーを停止しました: {}", container);
                return BuildOutcome::cancelled(tail.into_lines());
            }

            if Instant::now() >= deadline {
                drop(stream);
                self.force_stop(container).await;
                return BuildOutcome::failed(
                    None,
                    format!(
                        "ビルドが制限時間 {} 秒を超えました",
                        self.build_timeout.as_secs()
                    ),
                    tail.into_lines(),
                );
            }

            match timeout(self.poll_interval, stream.next()).await {
                // アイドルタイムアウト: フラグと期限を見直してから待ち直す
                Err(_) => continue,
                // 出力終端
                Ok(None) => break,
                Ok(Some(Ok(line))) => {
                    sink.line(&line);
                    tail.push(line);
                }
                Ok(Some(Err(e))) => {
                    stream_error = Some(e.to_string());
                    break;
                }
            }
        }

        drop(stream);

        // 起動確認後のストリーム異常は Failed 扱い。コンテナは必ず落とす
        if let Some(message) = stream_error {
            self.force_stop(container).await;
            return BuildOutcome::failed(
                None,
                format!("ログストリームが中断しました: {}", message),
                tail.into_lines(),
            );
        }

        // 出力終端後、残り時間の範囲で終了コードを待つ
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, self.runtime.wait_builder(container)).await {
            Ok(Ok(0)) => BuildOutcome::succeeded(tail.into_lines()),
            Ok(Ok(code)) => BuildOutcome::failed(
                Some(code),
                format!("ビルダーが終了コード {} で終了しました", code),
                tail.into_lines(),
            ),
            Ok(Err(e)) => {
                self.force_stop(container).await;
                BuildOutcome::failed(
                    None,
                    format!("ビルダーの終了待機に失敗しました: {}", e),
                    tail.into_lines(),
                )
            }
            Err(_) => {
                self.force_stop(container).await;
                BuildOutcome::failed(
                    None,
                    format!(
                        "ビルドが制限時間 {} 秒を超えました",
                        self.build_timeout.as_secs()
                    ),
                    tail.into_lines(),
                )
            }
        }
    }

    /// ビルダーコンテナを強制削除する
    ///
    /// 冪等。失敗してもログに残すのみで結果には影響させない。
    async fn force_stop(&self, container: &str) {
        if let Err(e) = self.runtime.remove_builder(container).await {
            tracing::warn!(
                "ビルダーコンテナの強制削除に失敗しました: {}: {}",
                container,
                e
            );
        }
    }
}

/// 直近 N 行だけを保持するログバッファ
struct LogTail {
    lines: VecDeque<String>,
    limit: usize,
}

impl LogTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}
