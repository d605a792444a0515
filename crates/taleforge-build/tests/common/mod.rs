use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use taleforge_container::{BuilderSpec, ContainerError, ContainerRuntime};
use taleforge_core::{
    BuildSettings, CatalogClient, CatalogError, ImageInfo, ImageStatus, RegistryCredentials, Tale,
    Workspace,
};

/// 操作ごとに失敗を注入できるコンテナランタイムのフェイク
///
/// 呼び出しの記録は `calls` に溜まる。フェイクをパイプラインへ渡す前に
/// `calls` のハンドルを取っておけば、あとから検証できる。
pub struct FakeRuntime {
    /// ビルダーが出力するログ行
    pub log_lines: Vec<String>,
    /// ビルダーの終了コード
    pub exit_code: i64,
    /// ログ終端を返さず出力が止まったままになる（ハングの再現）
    pub hang_logs: bool,
    /// 終了コードを返すまでの遅延（ビルド所要時間の再現）
    pub wait_delay: Duration,
    pub fail_pull: bool,
    /// pull 失敗時にローカルコピーが存在するか
    pub local_image_present: bool,
    pub fail_run: bool,
    pub fail_push: bool,
    /// image_digest が返す RepoDigests エントリ
    pub digest: Option<String>,
    pub calls: Arc<RuntimeCalls>,
}

#[derive(Default)]
pub struct RuntimeCalls {
    pub pulled: Mutex<Vec<String>>,
    pub run_specs: Mutex<Vec<BuilderSpec>>,
    pub pushed: Mutex<Vec<String>>,
    pub removed_builders: Mutex<Vec<String>>,
    pub removed_images: Mutex<Vec<String>>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            log_lines: vec![
                "Picked Local content provider.".to_string(),
                "Step 1/10 : FROM buildpack-deps:jammy".to_string(),
                "Successfully built 9a1b2c3d".to_string(),
            ],
            exit_code: 0,
            hang_logs: false,
            wait_delay: Duration::ZERO,
            fail_pull: false,
            local_image_present: false,
            fail_run: false,
            fail_push: false,
            digest: Some("registry.test.taleforge.org/tale1@sha256:0123abcd".to_string()),
            calls: Arc::new(RuntimeCalls::default()),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        self.calls.pulled.lock().unwrap().push(image.to_string());
        if self.fail_pull {
            return Err(ContainerError::DockerApiError("pull denied".to_string()));
        }
        Ok(())
    }

    async fn image_exists(&self, _image: &str) -> Result<bool, ContainerError> {
        Ok(self.local_image_present)
    }

    async fn run_builder(&self, spec: &BuilderSpec) -> Result<String, ContainerError> {
        if self.fail_run {
            return Err(ContainerError::DockerApiError(
                "cannot create container".to_string(),
            ));
        }
        self.calls.run_specs.lock().unwrap().push(spec.clone());
        Ok(format!("{}-cid", spec.container_name()))
    }

    fn builder_logs(&self, _container: &str) -> BoxStream<'_, Result<String, ContainerError>> {
        let lines: Vec<Result<String, ContainerError>> =
            self.log_lines.iter().cloned().map(Ok).collect();
        if self.hang_logs {
            stream::iter(lines).chain(stream::pending()).boxed()
        } else {
            stream::iter(lines).boxed()
        }
    }

    async fn wait_builder(&self, _container: &str) -> Result<i64, ContainerError> {
        if !self.wait_delay.is_zero() {
            tokio::time::sleep(self.wait_delay).await;
        }
        Ok(self.exit_code)
    }

    async fn remove_builder(&self, container: &str) -> Result<(), ContainerError> {
        self.calls
            .removed_builders
            .lock()
            .unwrap()
            .push(container.to_string());
        Ok(())
    }

    async fn push_image(
        &self,
        image: &str,
        _credentials: &RegistryCredentials,
    ) -> Result<(), ContainerError> {
        if self.fail_push {
            return Err(ContainerError::PushFailed {
                image: image.to_string(),
                message: "unauthorized: authentication required".to_string(),
            });
        }
        self.calls.pushed.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn image_digest(
        &self,
        _image: &str,
        _registry_host: &str,
    ) -> Result<Option<String>, ContainerError> {
        Ok(self.digest.clone())
    }

    async fn remove_image(&self, image: &str) -> Result<(), ContainerError> {
        self.calls
            .removed_images
            .lock()
            .unwrap()
            .push(image.to_string());
        Ok(())
    }
}

/// カタログのフェイク
///
/// `update_image_info` は記録を `updates` へ残しつつ Tale 本体も書き換える
/// ので、後続のビルドは最新の記録を観測する。
pub struct FakeCatalog {
    pub fail_tale: bool,
    pub fail_download: bool,
    pub fail_update: bool,
    pub state: Arc<CatalogState>,
}

pub struct CatalogState {
    pub tale: Mutex<Tale>,
    pub workspace: Workspace,
    pub download_dests: Mutex<Vec<PathBuf>>,
    pub updates: Mutex<Vec<ImageInfo>>,
}

impl FakeCatalog {
    pub fn new(tale: Tale, workspace: Workspace) -> Self {
        Self {
            fail_tale: false,
            fail_download: false,
            fail_update: false,
            state: Arc::new(CatalogState {
                tale: Mutex::new(tale),
                workspace,
                download_dests: Mutex::new(Vec::new()),
                updates: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl CatalogClient for FakeCatalog {
    async fn get_tale(&self, tale_id: &str) -> Result<Tale, CatalogError> {
        if self.fail_tale {
            return Err(CatalogError::NotFound {
                kind: "tale",
                id: tale_id.to_string(),
            });
        }
        Ok(self.state.tale.lock().unwrap().clone())
    }

    async fn get_workspace(&self, _workspace_id: &str) -> Result<Workspace, CatalogError> {
        Ok(self.state.workspace.clone())
    }

    async fn download_workspace(
        &self,
        _workspace_id: &str,
        dest: &Path,
    ) -> Result<(), CatalogError> {
        self.state
            .download_dests
            .lock()
            .unwrap()
            .push(dest.to_path_buf());
        if self.fail_download {
            return Err(CatalogError::Api("connection reset".to_string()));
        }
        std::fs::write(dest.join("notebook.ipynb"), "{}")?;
        Ok(())
    }

    async fn update_image_info(
        &self,
        _tale_id: &str,
        info: &ImageInfo,
    ) -> Result<(), CatalogError> {
        if self.fail_update {
            return Err(CatalogError::Api("write denied".to_string()));
        }
        self.state.updates.lock().unwrap().push(info.clone());
        self.state.tale.lock().unwrap().image_info = Some(info.clone());
        Ok(())
    }
}

pub fn tale(image_id: &str, image_info: Option<ImageInfo>) -> Tale {
    Tale {
        id: "tale1".to_string(),
        workspace_id: "ws1".to_string(),
        image_id: image_id.to_string(),
        image_info,
    }
}

pub fn workspace_updated_at(timestamp: i64) -> Workspace {
    Workspace {
        id: "ws1".to_string(),
        updated: chrono::DateTime::from_timestamp(timestamp, 0).unwrap(),
    }
}

pub fn success_record(last_build: i64) -> ImageInfo {
    ImageInfo {
        last_build,
        image_id: "jupyter".to_string(),
        digest: Some("sha256:prior".to_string()),
        builder_version: "taleforge/repo2docker:latest".to_string(),
        status: ImageStatus::Success,
    }
}

/// テスト向けに間隔を詰めた設定
pub fn test_settings(temp_root: &Path) -> BuildSettings {
    BuildSettings {
        registry_url: "https://registry.test.taleforge.org".to_string(),
        temp_root: temp_root.to_path_buf(),
        build_timeout: Duration::from_secs(30),
        cancel_poll_interval: Duration::from_millis(50),
        ..Default::default()
    }
}
