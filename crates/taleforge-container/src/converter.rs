//! BuilderSpec から Docker API パラメータへの変換

// Bollard 0.19.4 の非推奨APIを一時的に使用
#![allow(deprecated)]

use bollard::container::{Config, CreateContainerOptions};
use bollard::models::HostConfig;
use std::collections::HashMap;

use crate::runtime::BuilderSpec;

/// ホスト側 Docker ソケットのパス
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// 一時ディレクトリルートのコンテナ内マウント先
pub const HOST_TMP_MOUNT: &str = "/host/tmp";

/// BuilderSpec をビルダーコンテナの作成設定に変換
///
/// ビルダーは同居する Docker デーモンを直接使ってイメージを組み立てるため、
/// ソケットを読み書き可能でマウントした特権コンテナとして起動する。
/// auto_remove により正常終了後はデーモン側で回収される。
pub fn builder_to_container_config(
    spec: &BuilderSpec,
) -> (Config<String>, CreateContainerOptions<String>) {
    // ビルダーはホストのデーモンに直接つなぐ
    let env = vec![format!("DOCKER_HOST=unix://{}", DOCKER_SOCKET)];

    // ソケットは読み書き、一時ディレクトリは読み取り専用
    let binds = vec![
        format!("{}:{}:rw", DOCKER_SOCKET, DOCKER_SOCKET),
        format!("{}:{}:ro", spec.temp_root.display(), HOST_TMP_MOUNT),
    ];

    let host_config = Some(HostConfig {
        binds: Some(binds),
        privileged: Some(true),
        auto_remove: Some(true),
        ..Default::default()
    });

    // 後から一覧・回収できるようにメタデータラベルを付与
    let mut labels = HashMap::new();
    labels.insert("taleforge.tale".to_string(), spec.tale_id.clone());
    labels.insert(
        "taleforge.start-time".to_string(),
        spec.start_time.to_string(),
    );

    let config = Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        env: Some(env),
        labels: Some(labels),
        host_config,
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: spec.container_name(),
        platform: None,
    };

    (config, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_spec() -> BuilderSpec {
        BuilderSpec {
            image: "taleforge/repo2docker:latest".to_string(),
            command: vec![
                "jupyter-repo2docker".to_string(),
                "--no-run".to_string(),
                "--image-name".to_string(),
                "registry.taleforge.dev/tale1/1624994605".to_string(),
                "/tmp/xxx".to_string(),
            ],
            tale_id: "tale1".to_string(),
            start_time: 1624994605,
            temp_root: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_builder_config_basic() {
        let (config, options) = builder_to_container_config(&sample_spec());

        assert_eq!(config.image, Some("taleforge/repo2docker:latest".to_string()));
        assert_eq!(options.name, "taleforge-builder-tale1-1624994605");
    }

    #[test]
    fn test_builder_config_command_passthrough() {
        let spec = sample_spec();
        let (config, _) = builder_to_container_config(&spec);

        // コマンドは分割も加工もせずそのまま渡す
        assert_eq!(config.cmd, Some(spec.command));
    }

    #[test]
    fn test_builder_config_docker_host_env() {
        let (config, _) = builder_to_container_config(&sample_spec());

        let env = config.env.unwrap();
        assert_eq!(env, vec!["DOCKER_HOST=unix:///var/run/docker.sock"]);
    }

    #[test]
    fn test_builder_config_binds() {
        let (config, _) = builder_to_container_config(&sample_spec());

        let host_config = config.host_config.unwrap();
        let binds = host_config.binds.unwrap();

        assert_eq!(binds.len(), 2);
        // ソケットは読み書き可能
        assert_eq!(binds[0], "/var/run/docker.sock:/var/run/docker.sock:rw");
        // 一時ディレクトリルートは読み取り専用
        assert_eq!(binds[1], "/tmp:/host/tmp:ro");
    }

    #[test]
    fn test_builder_config_privileged_and_auto_remove() {
        let (config, _) = builder_to_container_config(&sample_spec());

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.privileged, Some(true));
        assert_eq!(host_config.auto_remove, Some(true));
    }

    #[test]
    fn test_builder_config_labels() {
        let (config, _) = builder_to_container_config(&sample_spec());

        let labels = config.labels.unwrap();
        assert_eq!(labels.get("taleforge.tale"), Some(&"tale1".to_string()));
        assert_eq!(
            labels.get("taleforge.start-time"),
            Some(&"1624994605".to_string())
        );
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_builder_config_custom_temp_root() {
        let mut spec = sample_spec();
        spec.temp_root = PathBuf::from("/var/taleforge/tmp");

        let (config, _) = builder_to_container_config(&spec);

        let binds = config.host_config.unwrap().binds.unwrap();
        assert_eq!(binds[1], "/var/taleforge/tmp:/host/tmp:ro");
    }
}
