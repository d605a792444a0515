//! Bollard による [`ContainerRuntime`] の本番実装

// Bollard 0.19.4 の非推奨APIを一時的に使用
#![allow(deprecated)]

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::CreateImageInfo;
use futures_util::stream::{self, BoxStream, StreamExt};
use taleforge_core::RegistryCredentials;

use crate::converter::builder_to_container_config;
use crate::error::{ContainerError, Result};
use crate::runtime::{BuilderSpec, ContainerRuntime, VANISHED_EXIT_CODE};

/// ローカルの Docker デーモンを使うランタイム
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// ローカルデフォルト（unixソケット等）で接続し、疎通を確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;

        Ok(Self { docker })
    }

    /// 既存の接続からランタイムを作成
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        let (image_name, tag) = parse_image_tag(image);

        tracing::info!("イメージを取得中: {}", image);

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(info) = stream.next().await {
            match info {
                Ok(CreateImageInfo {
                    status: Some(status),
                    ..
                }) => {
                    tracing::trace!("pull: {}", status);
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("イメージ取得完了: {}", image);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_builder(&self, spec: &BuilderSpec) -> Result<String> {
        let (config, options) = builder_to_container_config(spec);

        let response = match self.docker.create_container(Some(options), config).await {
            Ok(response) => response,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                return Err(ContainerError::ImageNotFound {
                    image: spec.image.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.docker
            .start_container(
                &response.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await?;

        tracing::debug!("ビルダー起動: {} ({})", spec.container_name(), response.id);
        Ok(response.id)
    }

    fn builder_logs(&self, container: &str) -> BoxStream<'_, Result<String>> {
        let options = bollard::query_parameters::LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        self.docker
            .logs(container, Some(options))
            .flat_map(|item| {
                stream::iter(match item {
                    Ok(output) => log_lines(output),
                    Err(e) => vec![Err(ContainerError::from(e))],
                })
            })
            .boxed()
    }

    async fn wait_builder(&self, container: &str) -> Result<i64> {
        let mut stream = self.docker.wait_container(
            container,
            None::<bollard::query_parameters::WaitContainerOptions>,
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // 非ゼロ終了コードは bollard がエラーとして通知してくる
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            // auto_remove により待機前に回収された
            Some(Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }))
            | None => Ok(VANISHED_EXIT_CODE),
            Some(Err(e)) => Err(e.into()),
        }
    }

    async fn remove_builder(&self, container: &str) -> Result<()> {
        match self
            .docker
            .remove_container(
                container,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(_) => Ok(()),
            // 既に存在しない・既に削除中なら成功扱い
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            })
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn push_image(&self, image: &str, credentials: &RegistryCredentials) -> Result<()> {
        let docker_credentials = bollard::auth::DockerCredentials {
            username: Some(credentials.username.clone()),
            password: Some(credentials.secret.clone()),
            serveraddress: extract_registry(image).map(String::from),
            ..Default::default()
        };

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: "latest".to_string(),
        };

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(image, Some(options), Some(docker_credentials));

        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else if let Some(status) = info.status {
                        tracing::trace!("push: {}", status);
                    }
                }
                Err(e) => {
                    return Err(ContainerError::PushFailed {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(message) = error_message {
            return Err(ContainerError::PushFailed {
                image: image.to_string(),
                message,
            });
        }

        tracing::debug!("プッシュ完了: {}", image);
        Ok(())
    }

    async fn image_digest(&self, image: &str, registry_host: &str) -> Result<Option<String>> {
        let inspect = match self.docker.inspect_image(image).await {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}/", registry_host);
        let digest = inspect
            .repo_digests
            .unwrap_or_default()
            .into_iter()
            .find(|entry| entry.starts_with(&prefix));

        Ok(digest)
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        match self
            .docker
            .remove_image(
                image,
                Some(bollard::query_parameters::RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// ログチャンクを行に分割する
///
/// Docker のログフレームは行単位とは限らないため、改行で分割して空行を除く。
fn log_lines(output: LogOutput) -> Vec<Result<String>> {
    let message = match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message } => message,
        LogOutput::StdIn { .. } => return Vec::new(),
    };

    String::from_utf8_lossy(&message)
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| Ok(line.to_string()))
        .collect()
}

/// イメージ名とタグを分離
/// 例: "taleforge/repo2docker:latest" -> ("taleforge/repo2docker", "latest")
///     "alpine" -> ("alpine", "latest")
fn parse_image_tag(image: &str) -> (&str, &str) {
    if let Some((name, tag)) = image.rsplit_once(':') {
        // ポート付きレジストリ（localhost:5000/app）との混同を避ける
        if !tag.contains('/') {
            return (name, tag);
        }
    }
    (image, "latest")
}

/// イメージ名からレジストリホストを抽出
///
/// 最初のセグメントが . または : を含む場合のみレジストリとみなす。
fn extract_registry(image: &str) -> Option<&str> {
    let first = image.split('/').next()?;
    if image.contains('/') && (first.contains('.') || first.contains(':')) {
        Some(first)
    } else {
        None
    }
}
