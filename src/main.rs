use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use tokio::io::AsyncReadExt;

use kcdev::config::{CONFIG_FILE, PortMapping, Settings};
use kcdev::container::{DEBUG_PORT, DevContainer};
use kcdev::output::follow_output;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(name = "kcdev")]
#[command(version)]
#[command(about = "Run a Keycloak dev container with hot redeploy of a locally built extension")]
#[command(styles = clap_cargo_style())]
struct Cli {
    /// Settings file (defaults to the nearest kcdev.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extension artifact base name, mounted from <classpath-root>/../<NAME>.jar
    #[arg(short, long, global = true)]
    artifact: Option<String>,

    /// Directory the artifact directory is a sibling of
    #[arg(long, global = true)]
    classpath_root: Option<PathBuf>,

    /// Redeploy when compiled classes change
    #[arg(short = 't', long, global = true)]
    track_changes: bool,

    /// Container image, name:tag
    #[arg(long, global = true)]
    image: Option<String>,

    /// Fixed port mapping HOST:CONTAINER (repeatable)
    #[arg(short, long = "port", global = true, value_parser = parse_port_mapping)]
    ports: Vec<PortMapping>,

    /// Realm export imported at startup
    #[arg(long, global = true)]
    realm: Option<PathBuf>,

    /// Keep the container for the next run
    #[arg(long, global = true)]
    reuse: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the container and follow its output until a key is pressed
    Run,

    /// Display effective settings as TOML
    Config {
        /// Also write them to the settings file
        #[arg(short, long)]
        write: bool,
    },

    /// Show the mount plan without starting anything
    Plan,
}

fn parse_port_mapping(value: &str) -> Result<PortMapping, String> {
    let (host, container) = value
        .split_once(':')
        .ok_or_else(|| format!("expected HOST:CONTAINER, got '{value}'"))?;
    let parse = |port: &str| {
        port.trim()
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{port}': {e}"))
    };
    Ok(PortMapping {
        host: parse(host)?,
        container: parse(container)?,
    })
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
        .context("failed to load settings")?;

        if let Some(artifact) = &self.artifact {
            settings.extension.artifact_name = Some(artifact.clone());
        }
        if let Some(root) = &self.classpath_root {
            settings.extension.classpath_root = root.clone();
        }
        if self.track_changes {
            settings.extension.class_folder_change_tracking = true;
        }
        if let Some(image) = &self.image {
            settings.container.image = image.clone();
        }
        for mapping in &self.ports {
            settings
                .container
                .fixed_ports
                .retain(|existing| existing.container != mapping.container);
            settings.container.fixed_ports.push(*mapping);
        }
        if let Some(realm) = &self.realm {
            settings.container.realm_import_file = Some(realm.clone());
        }
        if self.reuse {
            settings.container.reuse = true;
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    kcdev::logging::init_with_config(&settings.logging);

    let result = match cli.command {
        Commands::Run => run(&settings).await,
        Commands::Config { write } => {
            let target = write.then(|| {
                cli.config
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
            });
            show_config(&settings, target.as_deref())
        }
        Commands::Plan => show_plan(&settings),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: &Settings) -> anyhow::Result<()> {
    let running = DevContainer::from_settings(settings)
        .start()
        .await
        .context("failed to start container")?;

    let output = tokio::spawn(follow_output(running.stdout(), tokio::io::stdout()));

    let url = running.auth_server_url().await?;
    println!("Keycloak ready at {url}");
    match running.host_port(DEBUG_PORT).await {
        Ok(port) => println!("Remote debugger on port {port}"),
        Err(_) => tracing::debug!("[runner] debug port {DEBUG_PORT} not exposed"),
    }
    if let Some(root) = running.watch_root() {
        println!("Watching {} for changes", root.display());
    }
    println!("Press ENTER to stop");

    // Any byte or EOF
    let mut byte = [0u8; 1];
    let _ = tokio::io::stdin().read(&mut byte).await?;

    output.abort();
    running.shutdown().await.context("failed to stop container")?;
    Ok(())
}

fn show_config(settings: &Settings, write_to: Option<&Path>) -> anyhow::Result<()> {
    print!("{}", settings.to_toml()?);
    if let Some(path) = write_to {
        settings
            .save(path)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        eprintln!("Settings written to {}", path.display());
    }
    Ok(())
}

fn show_plan(settings: &Settings) -> anyhow::Result<()> {
    let dev = DevContainer::from_settings(settings);
    match dev.plan()? {
        Some(plan) => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            if !dev.is_class_folder_change_tracking_enabled() {
                println!("Class folder change tracking is off");
            }
        }
        None => println!("No extension configured, hot deploy disabled"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_mapping() {
        assert_eq!(
            parse_port_mapping("8787:8787").unwrap(),
            PortMapping {
                host: 8787,
                container: 8787
            }
        );
        assert!(parse_port_mapping("8787").is_err());
        assert!(parse_port_mapping("x:8080").is_err());
    }

    #[test]
    fn test_cli_overrides_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = temp_dir.path().join("kcdev.toml");
        std::fs::write(&config, "[container]\nfixed_ports = [{ host = 1, container = 8787 }]\n")
            .unwrap();

        let cli = Cli::parse_from([
            "kcdev",
            "plan",
            "--config",
            config.to_str().unwrap(),
            "--artifact",
            "my-extension",
            "-t",
            "--reuse",
            "--port",
            "8787:8787",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.extension.artifact_name.as_deref(), Some("my-extension"));
        assert!(settings.extension.class_folder_change_tracking);
        assert!(settings.container.reuse);
        assert_eq!(
            settings.container.fixed_ports,
            vec![PortMapping {
                host: 8787,
                container: 8787
            }]
        );
    }

    #[test]
    fn test_config_write_saves_effective_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/kcdev.toml");
        let cli = Cli::parse_from(["kcdev", "config", "--write", "--artifact", "my-extension"]);
        assert!(matches!(cli.command, Commands::Config { write: true }));

        show_config(&cli.settings().unwrap(), Some(&path)).unwrap();

        let saved = Settings::load_from(&path).unwrap();
        assert_eq!(saved.extension.artifact_name.as_deref(), Some("my-extension"));
    }
}
