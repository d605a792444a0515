//! イメージ公開処理
//!
//! ビルド済みイメージをレジストリへプッシュし、コンテンツダイジェストを
//! 解決します。イメージ名はビルダーが既に `registry/<tale>/<start_time>`
//! 形式で付けているため、ここではタグ付けは行いません。

use taleforge_container::ContainerRuntime;
use taleforge_core::CredentialSource;

use crate::error::{BuildError, Result};

/// イメージ公開を実行するハンドラ
pub struct ImagePusher<'a, R, K> {
    runtime: &'a R,
    credentials: &'a K,
}

impl<'a, R: ContainerRuntime, K: CredentialSource> ImagePusher<'a, R, K> {
    pub fn new(runtime: &'a R, credentials: &'a K) -> Self {
        Self {
            runtime,
            credentials,
        }
    }

    /// イメージをプッシュし、レジストリ上のダイジェストを返す
    ///
    /// 認証情報の取得失敗・転送失敗は [`BuildError::Publish`]。プッシュ後に
    /// 該当レジストリのダイジェストが見つからない場合はビルドを失敗に
    /// せず `None` を返す。
    pub async fn publish(&self, image: &str, registry_host: &str) -> Result<Option<String>> {
        let credentials = self.credentials.registry_credentials().await.map_err(|e| {
            BuildError::Publish {
                image: image.to_string(),
                message: e.to_string(),
            }
        })?;

        tracing::info!("イメージを公開中: {}", image);

        self.runtime
            .push_image(image, &credentials)
            .await
            .map_err(|e| BuildError::Publish {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        let digest = match self.runtime.image_digest(image, registry_host).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::warn!("ダイジェストの解決に失敗しました: {}: {}", image, e);
                None
            }
        };

        match &digest {
            Some(digest) => tracing::debug!("公開完了: {} ({})", image, digest),
            None => tracing::warn!(
                "レジストリ {} のダイジェストが見つかりません: {}",
                registry_host,
                image
            ),
        }

        Ok(digest)
    }
}
