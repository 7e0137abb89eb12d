//! Keycloak dev container: server start configuration plus hot redeploy.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use testcontainers::core::ContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use tokio::io::AsyncBufRead;

use super::{ContainerError, ContainerSpec, DockerHandle};
use crate::config::{ContainerConfig, ExtensionConfig, PortMapping, Settings, WatcherConfig};
use crate::error::HarnessError;
use crate::mount::{MountError, MountPlan};
use crate::trigger::RedeployTrigger;
use crate::watcher::{FilenamePolicy, RecursiveWatcher, WatchError, WatchHandle};

/// Realm export location inside the container.
pub const REALM_IMPORT_PATH: &str = "/tmp/realm-import.json";

/// HTTP port of the server inside the container.
pub const HTTP_PORT: u16 = 8080;

/// Remote debugger port inside the container.
pub const DEBUG_PORT: u16 = 8787;

/// Configures and starts a Keycloak container with an optional extension mount.
#[derive(Debug, Clone, Default)]
pub struct DevContainer {
    container: ContainerConfig,
    extension: ExtensionConfig,
    watcher: WatcherConfig,
}

impl DevContainer {
    /// Dev container on the default image.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.container.image = image.into();
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            container: settings.container.clone(),
            extension: settings.extension.clone(),
            watcher: settings.watcher.clone(),
        }
    }

    /// Mount `<classpath-root>/../<artifact_name>.jar` as the extension archive.
    pub fn with_extension(mut self, artifact_name: impl Into<String>) -> Self {
        self.extension.artifact_name = Some(artifact_name.into());
        self
    }

    pub fn with_classpath_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extension.classpath_root = root.into();
        self
    }

    pub fn with_class_folder_change_tracking(mut self, enabled: bool) -> Self {
        self.extension.class_folder_change_tracking = enabled;
        self
    }

    pub fn with_fixed_exposed_port(mut self, host: u16, container: u16) -> Self {
        self.container
            .fixed_ports
            .retain(|mapping| mapping.container != container);
        self.container.fixed_ports.push(PortMapping { host, container });
        self
    }

    pub fn with_realm_import_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.container.realm_import_file = Some(path.into());
        self
    }

    /// Reuse a running container with the same configuration across runs.
    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.container.reuse = reuse;
        self
    }

    pub fn with_watcher_config(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn is_class_folder_change_tracking_enabled(&self) -> bool {
        self.extension.class_folder_change_tracking
    }

    /// Mount plan for the configured extension, if any.
    pub fn plan(&self) -> Result<Option<MountPlan>, MountError> {
        MountPlan::with_deployment(
            &self.extension.classpath_root,
            self.extension.artifact_name.as_deref(),
            &self.extension.deployment_path,
        )
    }

    /// Full start configuration for the given mount plan.
    pub fn spec(&self, plan: Option<&MountPlan>) -> Result<ContainerSpec, ContainerError> {
        let config = &self.container;
        let mut spec = ContainerSpec::new(config.image.clone());

        spec.exposed_ports(config.exposed_ports.iter().copied())
            .command(config.command.iter().cloned())
            .env("KEYCLOAK_USER", config.admin_username.clone())
            .env("KEYCLOAK_PASSWORD", config.admin_password.clone())
            .wait_for_message(config.wait_message.clone())
            .startup_timeout(config.startup_timeout())
            .reuse(config.reuse);

        for mapping in &config.fixed_ports {
            spec.fixed_port(mapping.host, mapping.container);
        }

        if let Some(realm_file) = &config.realm_import_file {
            if !realm_file.is_file() {
                return Err(ContainerError::RealmFileMissing {
                    path: realm_file.clone(),
                });
            }
            spec.copy_file(realm_file.clone(), REALM_IMPORT_PATH)
                .env("KEYCLOAK_IMPORT", REALM_IMPORT_PATH);
        }

        if let Some(plan) = plan {
            spec.bind_mount(
                plan.artifact.host_path.clone(),
                plan.artifact.container_path.clone(),
                plan.artifact.mode,
            )
            .seed_bytes(plan.sentinel.seed.clone(), plan.sentinel.container_path.clone());
        }

        Ok(spec)
    }

    /// Start the container and, if enabled, the class folder watcher.
    ///
    /// A broken extension setup is logged and the server starts without hot
    /// redeploy. Use a multi-threaded runtime: the watcher blocks on it to
    /// write the trigger file.
    pub async fn start(self) -> Result<RunningDevContainer, HarnessError> {
        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("[container] hot redeploy disabled: {e}");
                None
            }
        };

        let request = self.spec(plan.as_ref())?.to_request()?;
        crate::log_event!("container", "starting", "{}", self.container.image);
        let container = Arc::new(request.start().await.map_err(ContainerError::from)?);

        let watcher = match &plan {
            Some(plan) if self.extension.class_folder_change_tracking => {
                self.start_watcher(plan, DockerHandle::new(Arc::clone(&container))?)
            }
            _ => None,
        };

        Ok(RunningDevContainer {
            container,
            plan,
            watcher,
            reuse: self.container.reuse,
            admin_username: self.container.admin_username,
            admin_password: self.container.admin_password,
        })
    }

    fn start_watcher(&self, plan: &MountPlan, handle: DockerHandle) -> Option<WatchHandle> {
        let root = plan.watch_root();
        if !root.is_dir() {
            tracing::warn!(
                "[container] {} does not exist, class folder tracking disabled",
                root.display()
            );
            return None;
        }

        let policy = FilenamePolicy::new(&self.watcher.extensions)
            .exclude(plan.sentinel.file_name())
            .with_key_mode(self.watcher.key);
        let trigger = RedeployTrigger::new(handle, plan.sentinel.container_path.clone());

        match RecursiveWatcher::new(root, policy)
            .coalesce(self.watcher.coalesce())
            .spawn(trigger)
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("[container] class folder tracking disabled: {e}");
                None
            }
        }
    }
}

/// A started dev container. Dropping it stops the watcher and, unless reuse is
/// on, removes the container.
pub struct RunningDevContainer {
    container: Arc<ContainerAsync<GenericImage>>,
    plan: Option<MountPlan>,
    watcher: Option<WatchHandle>,
    reuse: bool,
    admin_username: String,
    admin_password: String,
}

impl RunningDevContainer {
    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn plan(&self) -> Option<&MountPlan> {
        self.plan.as_ref()
    }

    pub fn watcher(&self) -> Option<&WatchHandle> {
        self.watcher.as_ref()
    }

    pub fn watch_root(&self) -> Option<&Path> {
        self.watcher.as_ref().map(WatchHandle::root)
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    /// Host port mapped to `container_port`.
    pub async fn host_port(&self, container_port: u16) -> Result<u16, ContainerError> {
        self.container
            .get_host_port_ipv4(ContainerPort::Tcp(container_port))
            .await
            .map_err(|_| ContainerError::PortNotExposed {
                port: container_port,
            })
    }

    pub async fn http_port(&self) -> Result<u16, ContainerError> {
        self.host_port(HTTP_PORT).await
    }

    /// Base URL of the server, e.g. `http://localhost:32768/auth`.
    pub async fn auth_server_url(&self) -> Result<String, ContainerError> {
        let host = self.container.get_host().await?;
        let port = self.http_port().await?;
        Ok(format!("http://{host}:{port}/auth"))
    }

    /// Container stdout, following new output until the container stops.
    pub fn stdout(&self) -> Pin<Box<dyn AsyncBufRead + Send>> {
        self.container.stdout(true)
    }

    /// Handle for writing into the container. Call from within the runtime
    /// that started it.
    pub fn handle(&self) -> Result<DockerHandle, ContainerError> {
        DockerHandle::new(Arc::clone(&self.container))
    }

    /// Stop the watcher and remove the container.
    ///
    /// The watcher may be blocked on this runtime writing the trigger file,
    /// so it is joined off the executor.
    pub async fn shutdown(mut self) -> Result<(), HarnessError> {
        if let Some(watcher) = self.watcher.take() {
            join_watcher(watcher).await?;
        }
        if self.reuse {
            crate::log_event!("container", "kept for reuse", "{}", self.container.id());
            return Ok(());
        }
        // A clone may still be held by a handle given out earlier.
        match Arc::try_unwrap(self.container) {
            Ok(container) => container.rm().await.map_err(ContainerError::from)?,
            Err(_) => crate::debug_event!("container", "still referenced, removed on last drop"),
        }
        Ok(())
    }
}

/// Stop `watcher` and wait for its thread without blocking an executor thread.
async fn join_watcher(mut watcher: WatchHandle) -> Result<(), WatchError> {
    watcher.stop();
    tokio::task::spawn_blocking(move || watcher.join())
        .await
        .map_err(|_| WatchError::WorkerPanicked)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::MountMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_spec_without_extension() {
        let spec = DevContainer::new().spec(None).unwrap();

        assert_eq!(spec.image(), "quay.io/keycloak/keycloak:12.0.2");
        assert_eq!(spec.ports(), &[8080, 8443, 8787]);
        assert!(spec.binds().is_empty());
        assert_eq!(spec.env_vars()["KEYCLOAK_USER"], "admin");
        assert!(spec.argv().contains(&"--debug *:8787".to_string()));
    }

    #[test]
    fn test_spec_with_extension_binds_artifact_and_seeds_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let classes = temp_dir.path().join("target/test-classes");
        fs::create_dir_all(&classes).unwrap();

        let dev = DevContainer::new()
            .with_extension("my-extension")
            .with_classpath_root(&classes)
            .with_fixed_exposed_port(8787, 8787);
        let plan = dev.plan().unwrap().unwrap();
        let spec = dev.spec(Some(&plan)).unwrap();

        assert_eq!(spec.binds().len(), 1);
        assert_eq!(
            spec.binds()[0].host_path,
            temp_dir.path().join("target/my-extension.jar")
        );
        assert_eq!(spec.binds()[0].mode, MountMode::ReadWrite);
        assert_eq!(
            spec.files()[0].container_path,
            "/opt/jboss/keycloak/standalone/deployments/extensions.jar.dodeploy"
        );
        assert_eq!(spec.fixed_ports(), &[(8787, 8787)]);
    }

    #[test]
    fn test_reuse_setting_reaches_spec() {
        assert!(!DevContainer::new().spec(None).unwrap().is_reused());

        let mut settings = Settings::default();
        settings.container.reuse = true;
        let spec = DevContainer::from_settings(&settings).spec(None).unwrap();
        assert!(spec.is_reused());
        assert!(DevContainer::new().with_reuse(true).spec(None).unwrap().is_reused());
    }

    #[test]
    fn test_realm_import_file_is_copied_and_referenced() {
        let temp_dir = TempDir::new().unwrap();
        let realm = temp_dir.path().join("realm-export.json");
        fs::write(&realm, r#"{"realm":"test-realm"}"#).unwrap();

        let spec = DevContainer::new()
            .with_realm_import_file(&realm)
            .spec(None)
            .unwrap();

        assert_eq!(spec.env_vars()["KEYCLOAK_IMPORT"], REALM_IMPORT_PATH);
        assert_eq!(spec.files()[0].container_path, REALM_IMPORT_PATH);
    }

    #[test]
    fn test_missing_realm_file_is_an_error() {
        let err = DevContainer::new()
            .with_realm_import_file("/definitely/not/here.json")
            .spec(None)
            .unwrap_err();

        assert!(matches!(err, ContainerError::RealmFileMissing { .. }));
    }

    #[tokio::test]
    async fn test_watcher_join_lets_runtime_finish_a_pending_write() {
        use crate::watcher::{ChangeEvent, watch};
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let temp_dir = TempDir::new().unwrap();
        let runtime = tokio::runtime::Handle::current();
        let writing = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&writing);
        let watcher = watch(
            temp_dir.path(),
            FilenamePolicy::default(),
            move |_: &ChangeEvent| -> Result<(), WatchError> {
                flag.store(true, Ordering::SeqCst);
                // Same shape as DockerHandle: the timer is driven by the test's runtime thread.
                runtime.block_on(tokio::time::sleep(Duration::from_millis(200)));
                Ok(())
            },
        )
        .unwrap();

        fs::write(temp_dir.path().join("Foo.class"), b"x").unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !writing.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), join_watcher(watcher))
            .await
            .expect("join must not block the runtime")
            .unwrap();
    }

    #[test]
    fn test_no_plan_without_extension_name() {
        let dev = DevContainer::new().with_class_folder_change_tracking(true);

        assert!(dev.is_class_folder_change_tracking_enabled());
        assert!(dev.plan().unwrap().is_none());
    }
}
