//! replctl - replica-set control plane CLI
//!
//! Manages containerized MongoDB instances and their replica-set membership
//! through the local Docker CLI and the `mongo` shell.
//!
//! ## Usage
//!
//! ```sh
//! replctl create [name]              # start a standalone data node
//! replctl cluster                    # start a node and initiate a replica set on it
//! replctl grow --primary <address>   # start a node and join it to the set
//! replctl list                       # tracked instances
//! replctl rescan                     # runtime container listing
//! replctl inspect <name>
//! ```
//!
//! Every command rescans the runtime first. Results are printed as JSON on
//! stdout; logs go to stderr.
//!
//! ## Environment
//!
//! | Variable              | Default            |
//! |-----------------------|--------------------|
//! | `REPLCTL_DOCKER`      | `docker`           |
//! | `REPLCTL_MONGO`       | `mongo`            |
//! | `REPLCTL_IMAGE`       | `asangpet/mongodb` |
//! | `REPLCTL_SCRATCH_DIR` | system temp dir    |
//! | `REPLCTL_POLICY`      | `advisory`         |
//! | `REPLCTL_LOG`         | `info`             |

use replctl::{
    AdminPolicy, ContainerTemplate, Controller, ControllerConfig, DockerCli, MongoShell,
    RandomNames, ScriptChannel,
};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Create { name: Option<String> },
    Cluster,
    Grow { primary: Option<String> },
    List,
    Rescan,
    Inspect { name: String },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "create" => Ok(Command::Create {
            name: args.get(2).cloned(),
        }),
        "cluster" => Ok(Command::Cluster),
        "grow" => {
            let mut primary = None;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--primary" | "-p" => {
                        primary = Some(
                            args.get(i + 1)
                                .cloned()
                                .ok_or_else(|| "--primary requires an address".to_string())?,
                        );
                        i += 2;
                    }
                    other => return Err(format!("unexpected argument: {other}")),
                }
            }
            Ok(Command::Grow { primary })
        }
        "list" | "instances" => Ok(Command::List),
        "rescan" => Ok(Command::Rescan),
        "inspect" => {
            let name = args
                .get(2)
                .cloned()
                .ok_or_else(|| "inspect requires <name>".to_string())?;
            Ok(Command::Inspect { name })
        }
        "version" | "--version" | "-v" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        unknown => Err(format!("unknown command: {unknown}")),
    }
}

fn print_help() {
    eprintln!(
        "replctl {}\n\n\
         USAGE:\n    replctl <command> [args]\n\n\
         COMMANDS:\n    \
         create [name]             Start a standalone data node\n    \
         cluster                   Start a node and initiate a replica set\n    \
         grow --primary <address>  Start a node and join the replica set\n    \
         list                      List tracked instances\n    \
         rescan                    List runtime containers\n    \
         inspect <name>            Show container state\n    \
         version                   Print version",
        env!("CARGO_PKG_VERSION")
    );
}

// =============================================================================
// Setup
// =============================================================================

fn log_level() -> Level {
    match std::env::var("REPLCTL_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_controller() -> Result<Controller, String> {
    let docker = match std::env::var("REPLCTL_DOCKER") {
        Ok(path) => DockerCli::new().with_binary(path),
        Err(_) => DockerCli::new(),
    };

    let shell = match std::env::var("REPLCTL_MONGO") {
        Ok(path) => MongoShell::new().with_binary(path),
        Err(_) => MongoShell::new(),
    };
    let channel = match std::env::var("REPLCTL_SCRATCH_DIR") {
        Ok(dir) => ScriptChannel::new(shell).with_scratch_dir(dir),
        Err(_) => ScriptChannel::new(shell),
    };

    let mut config = ControllerConfig::default();
    if let Ok(image) = std::env::var("REPLCTL_IMAGE") {
        config = config.with_template(ContainerTemplate::with_image(image));
    }
    if let Ok(policy) = std::env::var("REPLCTL_POLICY") {
        config = config.with_admin_policy(policy.parse::<AdminPolicy>()?);
    }

    Ok(Controller::new(
        config,
        Arc::new(docker),
        Arc::new(channel),
        Arc::new(RandomNames),
    ))
}

fn emit<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("serialize: {e}"))?;
    println!("{json}");
    Ok(())
}

// =============================================================================
// Command Implementations
// =============================================================================

async fn run(command: Command) -> Result<(), String> {
    let controller = build_controller()?;
    let containers = controller.rescan().await.map_err(|e| e.to_string())?;

    match command {
        Command::Create { name } => {
            let record = controller
                .create_instance(name.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            emit(&record)
        }
        Command::Cluster => {
            let report = controller.bootstrap().await.map_err(|e| e.to_string())?;
            emit(&report)
        }
        Command::Grow { primary } => {
            if let Some(primary) = primary {
                controller
                    .seed_primary(primary)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            let report = controller
                .grow()
                .await
                .map_err(|e| format!("{e} (pass --primary <address>)"))?;
            emit(&report)
        }
        Command::List => emit(&controller.list_instances().await),
        Command::Rescan => emit(&serde_json::json!({ "containers": containers })),
        Command::Inspect { name } => {
            let info = controller.inspect(&name).await.map_err(|e| e.to_string())?;
            emit(&info)
        }
        Command::Version | Command::Help => Ok(()),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}");
            print_help();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match command {
        Command::Help => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Command::Version => {
            println!("replctl {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
        return ExitCode::from(EXIT_FAILURE);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match runtime.block_on(run(command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
