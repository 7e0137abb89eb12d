//! Mount planning for the exploded extension archive.
//!
//! The build writes classes to `<classpath-root>/../<artifact>.jar`. That
//! directory is bind-mounted over the server's deployment archive and a
//! `.dodeploy` sentinel next to it tells the deployment scanner to (re)deploy.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// Deployment archive inside the container.
pub const DEPLOYMENT_PATH: &str = "/opt/jboss/keycloak/standalone/deployments/extensions.jar";

/// Suffix that turns a deployment path into its trigger file.
pub const DODEPLOY_SUFFIX: &str = ".dodeploy";

/// Sentinel contents. The scanner only cares that the file exists and changed.
pub const SENTINEL_PAYLOAD: &[u8] = b"true";

#[derive(Error, Debug)]
pub enum MountError {
    #[error("Classpath root {path} is not a readable directory")]
    ClasspathRoot { path: PathBuf },

    #[error("Invalid artifact name '{name}': {reason}")]
    InvalidArtifactName { name: String, reason: String },

    #[error("Cannot resolve current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

/// Host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub mode: MountMode,
}

/// Trigger file placed next to the deployment, seeded at container creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentinelFile {
    pub container_path: String,
    #[serde(skip)]
    pub seed: Vec<u8>,
}

impl SentinelFile {
    /// Bare file name, e.g. `extensions.jar.dodeploy`.
    pub fn file_name(&self) -> &str {
        self.container_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.container_path)
    }
}

/// The two mounts needed for hot deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPlan {
    pub artifact: BindMount,
    pub sentinel: SentinelFile,
}

impl MountPlan {
    /// Plan mounts for the default deployment path.
    ///
    /// Returns `Ok(None)` when no artifact name is given: dev mode is off.
    pub fn for_artifact(
        classpath_root: &Path,
        artifact_name: Option<&str>,
    ) -> Result<Option<Self>, MountError> {
        Self::with_deployment(classpath_root, artifact_name, DEPLOYMENT_PATH)
    }

    pub fn with_deployment(
        classpath_root: &Path,
        artifact_name: Option<&str>,
        deployment_path: &str,
    ) -> Result<Option<Self>, MountError> {
        let Some(name) = artifact_name.map(str::trim).filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        validate_artifact_name(name)?;

        if !classpath_root.is_dir() {
            return Err(MountError::ClasspathRoot {
                path: classpath_root.to_path_buf(),
            });
        }

        let root = if classpath_root.is_absolute() {
            classpath_root.to_path_buf()
        } else {
            std::env::current_dir()?.join(classpath_root)
        };
        let host_path = normalize(&root.join("..").join(format!("{name}.jar")));

        Ok(Some(Self {
            artifact: BindMount {
                host_path,
                container_path: deployment_path.to_string(),
                mode: MountMode::ReadWrite,
            },
            sentinel: SentinelFile {
                container_path: format!("{deployment_path}{DODEPLOY_SUFFIX}"),
                seed: SENTINEL_PAYLOAD.to_vec(),
            },
        }))
    }

    /// Directory whose changes should trigger a redeploy.
    pub fn watch_root(&self) -> &Path {
        &self.artifact.host_path
    }
}

fn validate_artifact_name(name: &str) -> Result<(), MountError> {
    let invalid = |reason: &str| MountError::InvalidArtifactName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.contains(['/', '\\']) {
        return Err(invalid("must be a base name without separators"));
    }
    if name == "." || name == ".." {
        return Err(invalid("must not be a relative directory"));
    }
    Ok(())
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_no_artifact_name_means_no_plan() {
        let temp_dir = TempDir::new().unwrap();

        assert!(MountPlan::for_artifact(temp_dir.path(), None).unwrap().is_none());
        assert!(
            MountPlan::for_artifact(temp_dir.path(), Some("  "))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_plan_points_at_sibling_jar_directory() {
        let temp_dir = TempDir::new().unwrap();
        let classes = temp_dir.path().join("target/test-classes");
        fs::create_dir_all(&classes).unwrap();

        let plan = MountPlan::for_artifact(&classes, Some("my-extension"))
            .unwrap()
            .unwrap();

        assert_eq!(
            plan.artifact.host_path,
            temp_dir.path().join("target/my-extension.jar")
        );
        assert_eq!(plan.artifact.container_path, DEPLOYMENT_PATH);
        assert_eq!(plan.artifact.mode, MountMode::ReadWrite);
        assert_eq!(
            plan.sentinel.container_path,
            "/opt/jboss/keycloak/standalone/deployments/extensions.jar.dodeploy"
        );
        assert_eq!(plan.sentinel.file_name(), "extensions.jar.dodeploy");
        assert_eq!(plan.sentinel.seed, b"true");
        assert_eq!(plan.watch_root(), plan.artifact.host_path.as_path());
    }

    #[test]
    fn test_custom_deployment_path() {
        let temp_dir = TempDir::new().unwrap();

        let plan = MountPlan::with_deployment(temp_dir.path(), Some("ext"), "/deploy/custom.jar")
            .unwrap()
            .unwrap();

        assert_eq!(plan.sentinel.container_path, "/deploy/custom.jar.dodeploy");
        assert_eq!(plan.sentinel.file_name(), "custom.jar.dodeploy");
    }

    #[test]
    fn test_missing_classpath_root_is_a_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let err = MountPlan::for_artifact(&missing, Some("ext")).unwrap_err();
        assert!(matches!(err, MountError::ClasspathRoot { .. }));
    }

    #[test]
    fn test_artifact_name_with_separator_is_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let err = MountPlan::for_artifact(temp_dir.path(), Some("../evil")).unwrap_err();
        assert!(matches!(err, MountError::InvalidArtifactName { .. }));
    }

    #[test]
    fn test_normalize_is_lexical() {
        assert_eq!(
            normalize(Path::new("/a/b/./c/../../d.jar")),
            PathBuf::from("/a/d.jar")
        );
        assert_eq!(normalize(Path::new("x/../../y")), PathBuf::from("../y"));
    }
}
