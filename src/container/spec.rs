//! Container start configuration.
//!
//! `ContainerSpec` collects everything the harness decides before start-up
//! and converts it into a `testcontainers` request in one place.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use testcontainers::core::{AccessMode, ContainerPort, Mount, WaitFor};
use testcontainers::{ContainerRequest, GenericImage, ImageExt, ReuseDirective};

use super::ContainerError;
use crate::mount::{BindMount, MountMode};

/// Content copied into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Host(PathBuf),
    Bytes(Vec<u8>),
}

/// File placed into the container filesystem at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub container_path: String,
    pub source: FileSource,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    image: String,
    exposed_ports: Vec<u16>,
    fixed_ports: Vec<(u16, u16)>,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    binds: Vec<BindMount>,
    files: Vec<ContainerFile>,
    wait_message: Option<String>,
    startup_timeout: Option<Duration>,
    reuse: bool,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            exposed_ports: Vec::new(),
            fixed_ports: Vec::new(),
            command: Vec::new(),
            env: BTreeMap::new(),
            binds: Vec::new(),
            files: Vec::new(),
            wait_message: None,
            startup_timeout: None,
            reuse: false,
        }
    }

    pub fn bind_mount(
        &mut self,
        host_path: impl Into<PathBuf>,
        container_path: impl Into<String>,
        mode: MountMode,
    ) -> &mut Self {
        self.binds.push(BindMount {
            host_path: host_path.into(),
            container_path: container_path.into(),
            mode,
        });
        self
    }

    /// Copy a host file into the container at creation.
    pub fn copy_file(
        &mut self,
        host_path: impl Into<PathBuf>,
        container_path: impl Into<String>,
    ) -> &mut Self {
        self.files.push(ContainerFile {
            container_path: container_path.into(),
            source: FileSource::Host(host_path.into()),
        });
        self
    }

    /// Create a file with fixed contents at creation.
    pub fn seed_bytes(&mut self, bytes: impl Into<Vec<u8>>, container_path: impl Into<String>) -> &mut Self {
        self.files.push(ContainerFile {
            container_path: container_path.into(),
            source: FileSource::Bytes(bytes.into()),
        });
        self
    }

    /// Map `container_port` to a fixed `host_port`. The port is exposed as well.
    pub fn fixed_port(&mut self, host_port: u16, container_port: u16) -> &mut Self {
        self.fixed_ports.retain(|(_, container)| *container != container_port);
        self.fixed_ports.push((host_port, container_port));
        self.expose(container_port)
    }

    pub fn exposed_ports(&mut self, ports: impl IntoIterator<Item = u16>) -> &mut Self {
        for port in ports {
            self.expose(port);
        }
        self
    }

    fn expose(&mut self, port: u16) -> &mut Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    pub fn command<I, S>(&mut self, argv: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Consider the container ready once `message` shows up on stdout.
    pub fn wait_for_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.wait_message = Some(message.into());
        self
    }

    pub fn startup_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Keep the container alive after the handle is dropped and attach to a
    /// matching one on the next start.
    pub fn reuse(&mut self, reuse: bool) -> &mut Self {
        self.reuse = reuse;
        self
    }

    pub fn is_reused(&self) -> bool {
        self.reuse
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn binds(&self) -> &[BindMount] {
        &self.binds
    }

    pub fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    pub fn ports(&self) -> &[u16] {
        &self.exposed_ports
    }

    pub fn fixed_ports(&self) -> &[(u16, u16)] {
        &self.fixed_ports
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn argv(&self) -> &[String] {
        &self.command
    }

    /// Split the image reference into name and tag. The tag defaults to `latest`.
    pub fn image_parts(&self) -> Result<(String, String), ContainerError> {
        split_image(&self.image)
    }

    /// Build the `testcontainers` request.
    pub fn to_request(&self) -> Result<ContainerRequest<GenericImage>, ContainerError> {
        let (name, tag) = self.image_parts()?;

        let mut image = GenericImage::new(name, tag);
        for port in &self.exposed_ports {
            image = image.with_exposed_port(ContainerPort::Tcp(*port));
        }
        if let Some(message) = &self.wait_message {
            image = image.with_wait_for(WaitFor::message_on_stdout(message.clone()));
        }

        let mut request = image.with_cmd(self.command.clone());
        for (key, value) in &self.env {
            request = request.with_env_var(key.clone(), value.clone());
        }
        for (host, container) in &self.fixed_ports {
            request = request.with_mapped_port(*host, ContainerPort::Tcp(*container));
        }
        for bind in &self.binds {
            let access = match bind.mode {
                MountMode::ReadOnly => AccessMode::ReadOnly,
                MountMode::ReadWrite => AccessMode::ReadWrite,
            };
            let mount = Mount::bind_mount(
                bind.host_path.to_string_lossy().into_owned(),
                bind.container_path.clone(),
            )
            .with_access_mode(access);
            request = request.with_mount(mount);
        }
        for file in &self.files {
            request = match &file.source {
                FileSource::Host(path) => request.with_copy_to(file.container_path.clone(), path.clone()),
                FileSource::Bytes(bytes) => {
                    request.with_copy_to(file.container_path.clone(), bytes.clone())
                }
            };
        }
        if let Some(timeout) = self.startup_timeout {
            request = request.with_startup_timeout(timeout);
        }
        if self.reuse {
            request = request.with_reuse(ReuseDirective::Always);
        }

        Ok(request)
    }
}

fn split_image(image: &str) -> Result<(String, String), ContainerError> {
    let invalid = |reason: &str| ContainerError::InvalidImage {
        image: image.to_string(),
        reason: reason.to_string(),
    };

    let image = image.trim();
    if image.is_empty() {
        return Err(invalid("empty reference"));
    }
    if image.contains('@') {
        return Err(invalid("digest references are not supported"));
    }

    // A colon before the last slash belongs to a registry port, not a tag.
    let name_start = image.rfind('/').map_or(0, |idx| idx + 1);
    match image[name_start..].rfind(':') {
        Some(idx) => {
            let split = name_start + idx;
            let (name, tag) = (&image[..split], &image[split + 1..]);
            if tag.is_empty() {
                return Err(invalid("empty tag"));
            }
            Ok((name.to_string(), tag.to_string()))
        }
        None => Ok((image.to_string(), "latest".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_parts() {
        let spec = ContainerSpec::new("quay.io/keycloak/keycloak:12.0.2");
        assert_eq!(
            spec.image_parts().unwrap(),
            ("quay.io/keycloak/keycloak".to_string(), "12.0.2".to_string())
        );
    }

    #[test]
    fn test_image_without_tag_defaults_to_latest() {
        let (name, tag) = split_image("localhost:5000/keycloak").unwrap();
        assert_eq!(name, "localhost:5000/keycloak");
        assert_eq!(tag, "latest");
    }

    #[test]
    fn test_invalid_images() {
        assert!(split_image("").is_err());
        assert!(split_image("keycloak:").is_err());
        assert!(split_image("keycloak@sha256:abc").is_err());
    }

    #[test]
    fn test_fixed_port_exposes_and_replaces() {
        let mut spec = ContainerSpec::new("keycloak:12");
        spec.exposed_ports([8080, 8443])
            .fixed_port(18787, 8787)
            .fixed_port(8787, 8787);

        assert_eq!(spec.ports(), &[8080, 8443, 8787]);
        assert_eq!(spec.fixed_ports(), &[(8787, 8787)]);
    }

    #[test]
    fn test_reuse_is_carried_into_request() {
        let mut spec = ContainerSpec::new("keycloak:12");
        assert_eq!(spec.to_request().unwrap().reuse(), ReuseDirective::Never);

        spec.reuse(true);
        assert!(spec.is_reused());
        assert_eq!(spec.to_request().unwrap().reuse(), ReuseDirective::Always);
    }

    #[test]
    fn test_builder_collects_mounts_and_files() {
        let mut spec = ContainerSpec::new("keycloak:12");
        spec.bind_mount("/host/ext.jar", "/deploy/extensions.jar", MountMode::ReadWrite)
            .seed_bytes(b"true".to_vec(), "/deploy/extensions.jar.dodeploy")
            .copy_file("/host/realm.json", "/tmp/realm-import.json")
            .env("KEYCLOAK_USER", "admin")
            .command(["-c standalone.xml"]);

        assert_eq!(spec.binds().len(), 1);
        assert_eq!(spec.binds()[0].mode, MountMode::ReadWrite);
        assert_eq!(
            spec.files()[0].source,
            FileSource::Bytes(b"true".to_vec())
        );
        assert_eq!(spec.env_vars()["KEYCLOAK_USER"], "admin");
        assert_eq!(spec.argv(), &["-c standalone.xml".to_string()]);
        assert!(spec.to_request().is_ok());
    }
}
