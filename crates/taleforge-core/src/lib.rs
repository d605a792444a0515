//! TaleForge のコアドメインモデル
//!
//! Tale カタログレコード、ビルドパックレジストリ、再ビルド判定、
//! デプロイメント設定、および外部コラボレーターのインターフェースを提供します。

pub mod auth;
pub mod buildpack;
pub mod catalog;
pub mod decision;
pub mod error;
pub mod settings;
pub mod tale;

pub use auth::{CredentialError, CredentialSource, RegistryCredentials};
pub use buildpack::{BuildArg, Buildpack, builder_command};
pub use catalog::{CatalogClient, CatalogError};
pub use decision::{RebuildDecision, should_rebuild};
pub use error::{CoreError, Result};
pub use settings::BuildSettings;
pub use tale::{ImageInfo, ImageStatus, Tale, Workspace};
