//! `ContainerHandle` backed by a running testcontainers container.

use std::sync::Arc;

use testcontainers::core::{CmdWaitFor, ExecCommand};
use testcontainers::{ContainerAsync, GenericImage};
use tokio::runtime::Handle;

use super::{ContainerError, ContainerHandle};

/// Writes into the container with `docker exec`.
///
/// Blocks on the runtime it was created in. Call it from a plain thread (the
/// watcher thread), never from inside an async task.
#[derive(Clone)]
pub struct DockerHandle {
    container: Arc<ContainerAsync<GenericImage>>,
    runtime: Handle,
}

impl DockerHandle {
    /// Bind to the Tokio runtime of the caller. Fails outside a runtime.
    pub fn new(container: Arc<ContainerAsync<GenericImage>>) -> Result<Self, ContainerError> {
        Ok(Self {
            container,
            runtime: current_runtime()?,
        })
    }
}

fn current_runtime() -> Result<Handle, ContainerError> {
    Ok(Handle::try_current()?)
}

impl ContainerHandle for DockerHandle {
    fn copy_bytes_into(&self, bytes: &[u8], container_path: &str) -> Result<(), ContainerError> {
        let command = ExecCommand::new(atomic_write_argv(bytes, container_path))
            .with_cmd_ready_condition(CmdWaitFor::exit());

        self.runtime.block_on(async {
            let result = self.container.exec(command).await?;
            match result.exit_code().await? {
                Some(0) => Ok(()),
                code => Err(ContainerError::CopyFailed {
                    path: container_path.to_string(),
                    reason: format!("write exited with {code:?}"),
                }),
            }
        })
    }
}

/// Shell command that writes `bytes` to a temporary sibling and renames it
/// over `path`. The payload travels as printf octal escapes so any byte
/// survives argument passing.
pub fn atomic_write_argv(bytes: &[u8], path: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"printf "$1" > "$2.tmp" && mv -f "$2.tmp" "$2""#.to_string(),
        "kcdev-write".to_string(),
        printf_escape(bytes),
        path.to_string(),
    ]
}

fn printf_escape(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("\\{byte:03o}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_lookup_fails_outside_tokio() {
        assert!(matches!(current_runtime(), Err(ContainerError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_runtime_lookup_inside_tokio() {
        assert!(current_runtime().is_ok());
    }

    #[test]
    fn test_printf_escape_is_octal_per_byte() {
        assert_eq!(printf_escape(b"true"), r"\164\162\165\145");
        assert_eq!(printf_escape(&[0, 0xff, b'%']), r"\000\377\045");
    }

    #[test]
    fn test_atomic_write_argv_passes_path_and_payload_as_arguments() {
        let argv = atomic_write_argv(b"true", "/deploy/extensions.jar.dodeploy");

        assert_eq!(argv[0], "sh");
        assert!(argv[2].contains("mv -f"));
        assert_eq!(argv[4], r"\164\162\165\145");
        assert_eq!(argv[5], "/deploy/extensions.jar.dodeploy");
    }
}
