pub mod client;
pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod mount;
pub mod output;
pub mod trigger;
pub mod watcher;

pub use client::{ClientError, KeycloakClient, TEST_REALM, UserRepresentation};
pub use config::Settings;
pub use container::{
    ContainerError, ContainerHandle, ContainerSpec, DevContainer, DockerHandle,
    RunningDevContainer,
};
pub use error::{HarnessError, Result};
pub use mount::{BindMount, MountError, MountMode, MountPlan, SentinelFile};
pub use trigger::RedeployTrigger;
pub use watcher::{
    ChangeEvent, ChangeKind, ChangeSink, FilenamePolicy, KeyMode, RecursiveWatcher, WatchError,
    WatchHandle, watch,
};
