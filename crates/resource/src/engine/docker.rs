// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DockerEngine`: the production [`super::ContainerEngine`], backed by the
//! local Docker daemon via `bollard`.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{DeviceRequest, HostConfig, PortBinding};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;

use super::{ContainerEngine, EngineError, ExecStream, InspectResult, RunSpec, UnitState};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local Docker daemon over its default socket.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
        Ok(Self { docker })
    }

    fn host_config(spec: &RunSpec) -> HostConfig {
        let binds = spec.mounts.clone();
        let device_requests = if spec.gpus.is_empty() {
            None
        } else {
            Some(vec![DeviceRequest {
                driver: Some("nvidia".to_string()),
                device_ids: Some(spec.gpus.iter().map(|g| g.0.to_string()).collect()),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }])
        };
        // `required_cores == 0` / no `required_memory_bytes` means "auto" /
        // unset — leave the quota unset rather than pin the
        // container to a zero-CPU, zero-memory limit.
        let nano_cpus = if spec.cores > 0.0 {
            Some((spec.cores * 1_000_000_000.0) as i64)
        } else {
            None
        };
        let memory = if spec.memory_bytes > 0 { Some(spec.memory_bytes as i64) } else { None };
        HostConfig {
            binds: Some(binds),
            nano_cpus,
            memory,
            privileged: Some(spec.privileged),
            device_requests,
            auto_remove: Some(true),
            ..Default::default()
        }
    }

    async fn create_and_start(
        &self,
        spec: &RunSpec,
        extra_host_config: impl FnOnce(HostConfig) -> HostConfig,
        extra_config: impl FnOnce(Config<String>) -> Config<String>,
    ) -> Result<(), EngineError> {
        // An empty `cmd` (the vps path, where `spec.cmd` carries no
        // executable) leaves the image's own entrypoint/cmd in place
        // instead of overriding it with an empty argv.
        let cmd = if spec.cmd.is_empty() {
            None
        } else {
            let mut cmd = vec![spec.cmd.clone()];
            cmd.extend(spec.args.iter().cloned());
            Some(cmd)
        };

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd,
            env: Some(env),
            working_dir: spec.workdir.clone(),
            host_config: Some(extra_host_config(Self::host_config(spec))),
            ..Default::default()
        };
        let config = extra_config(config);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(_) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => return Err(EngineError::NameConflict(spec.name.clone())),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(EngineError::ImageMissing(spec.image.clone())),
            Err(e) => return Err(EngineError::DaemonUnreachable(e.to_string())),
        }

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn run_ephemeral(&self, spec: RunSpec) -> Result<String, EngineError> {
        self.create_and_start(&spec, |hc| hc, |c| c).await?;
        Ok(spec.name)
    }

    async fn run_persistent_ssh(
        &self,
        spec: RunSpec,
        ssh_pubkey: &str,
    ) -> Result<(String, u16), EngineError> {
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            "22/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("0".to_string()),
            }]),
        );
        let authorized_keys_env = format!("HAKU_AUTHORIZED_KEY={ssh_pubkey}");

        self.create_and_start(
            &spec,
            |hc| HostConfig {
                port_bindings: Some(port_bindings),
                auto_remove: Some(false),
                ..hc
            },
            |c| Config {
                exposed_ports: Some({
                    let mut m = HashMap::new();
                    m.insert("22/tcp".to_string(), HashMap::new());
                    m
                }),
                env: c.env.map(|mut e| {
                    e.push(authorized_keys_env);
                    e
                }),
                ..c
            },
        )
        .await?;

        let inspected = self
            .docker
            .inspect_container(&spec.name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;

        let host_port = inspected
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .and_then(|ports| ports.get("22/tcp"))
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.first())
            .and_then(|b| b.host_port.as_ref())
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| EngineError::DaemonUnreachable("no ssh port mapping".into()))?;

        Ok((spec.name, host_port))
    }

    async fn stop(&self, unit_id: &str) -> Result<(), EngineError> {
        self.docker
            .kill_container(unit_id, None::<KillContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
        let _ = self
            .docker
            .remove_container(
                unit_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        Ok(())
    }

    async fn pause(&self, unit_id: &str) -> Result<(), EngineError> {
        self.docker
            .pause_container(unit_id)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))
    }

    async fn unpause(&self, unit_id: &str) -> Result<(), EngineError> {
        self.docker
            .unpause_container(unit_id)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))
    }

    async fn exec(&self, unit_id: &str, cmd: &str) -> Result<ExecStream, EngineError> {
        let exec = self
            .docker
            .create_exec(
                unit_id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/sh".to_string(), "-c".to_string(), cmd.to_string()]),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?
        {
            StartExecResults::Attached { input, mut output } => {
                // `output` is a `Stream<LogOutput>`, not an `AsyncRead`; pump
                // it into one end of a duplex pipe and hand back the other
                // end, so callers see a plain `AsyncRead` regardless of the
                // underlying client's framing.
                let (mut writer, reader) = tokio::io::duplex(64 * 1024);
                tokio::spawn(async move {
                    use tokio::io::AsyncWriteExt;
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(log) => {
                                if writer.write_all(&log.into_bytes()).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                });
                Ok(ExecStream {
                    stdin: Box::new(input),
                    stdout: Box::new(reader),
                })
            }
            StartExecResults::Detached => {
                Err(EngineError::DaemonUnreachable("exec detached unexpectedly".into()))
            }
        }
    }

    async fn load_image(&self, archive_path: &str) -> Result<(), EngineError> {
        let file = tokio::fs::read(archive_path)
            .await
            .map_err(|e| EngineError::ImageMissing(format!("{archive_path}: {e}")))?;
        let mut stream = self.docker.import_image(
            bollard::image::ImportImageOptions { quiet: true },
            file.into(),
            None,
        );
        while let Some(result) = stream.next().await {
            result.map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn commit_and_save(
        &self,
        unit_id: &str,
        name: &str,
        archive_path: &str,
    ) -> Result<(), EngineError> {
        self.docker
            .commit_container(
                bollard::container::CommitContainerOptions {
                    container: unit_id.to_string(),
                    repo: name.to_string(),
                    ..Default::default()
                },
                Config::<String>::default(),
            )
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;

        let mut stream = self.docker.export_image(name);
        let mut out = tokio::fs::File::create(archive_path)
            .await
            .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
        use tokio::io::AsyncWriteExt;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
            out.write_all(&bytes)
                .await
                .map_err(|e| EngineError::DaemonUnreachable(e.to_string()))?;
        }
        Ok(())
    }

    async fn inspect(&self, unit_id: &str) -> Result<InspectResult, EngineError> {
        match self
            .docker
            .inspect_container(unit_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspected) => {
                let state = inspected.state.unwrap_or_default();
                let running = state.running.unwrap_or(false);
                Ok(InspectResult {
                    state: if running {
                        UnitState::Running
                    } else {
                        UnitState::Exited
                    },
                    exit_code: state.exit_code.map(|c| c as i32),
                    oom_killed: state.oom_killed.unwrap_or(false),
                })
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(InspectResult {
                state: UnitState::NotFound,
                exit_code: None,
                oom_killed: false,
            }),
            Err(e) => Err(EngineError::DaemonUnreachable(e.to_string())),
        }
    }
}
