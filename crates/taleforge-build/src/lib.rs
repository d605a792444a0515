//! Tale イメージのビルドパイプライン
//!
//! 再ビルド判定、ビルドコンテキストの準備、特権ビルダーコンテナの実行と
//! 監視、レジストリへの公開、カタログへの記録までを一つのパイプラインと
//! して提供します。どの経路でも一時リソースは必ず片付けられます。

pub mod auth;
pub mod builder;
pub mod cancel;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod pusher;
pub mod recorder;

pub use auth::{EnvCredentials, StaticCredentials};
pub use builder::{BuildOutcome, BuildVerdict, BuilderRunner, LOG_TAIL_LIMIT, LogSink};
pub use cancel::CancelToken;
pub use context::BuildContext;
pub use error::{BuildError, Result};
pub use pipeline::{BuildPipeline, BuildResult, BuildStatus};
pub use pusher::ImagePusher;
pub use recorder::outcome_record;
