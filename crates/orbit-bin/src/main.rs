use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use orbit_core::config::OrbitConfig;
use orbit_core::console::Console;
use orbit_core::format::summary_line;
use orbit_platform::command::ActionOutcome;
use orbit_platform::error::{command_error, Fault};
use orbit_platform::logs::Priority;
use orbit_platform::network::{FirewallAction, RouteSpec};
use orbit_platform::packages::AptAction;
use orbit_platform::services::ServiceAction;
use orbit_platform::users::NewUserOptions;

#[derive(Parser, Debug)]
#[command(name = "orbit")]
#[command(about = "Administration console for a single Ubuntu host")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "ORBIT_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "ORBIT_LOG_LEVEL", global = true)]
    log_level: String,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// One metrics snapshot (rates are zero on the first sample)
    Summary,
    /// Repeated metrics snapshots
    Watch {
        /// Seconds between samples (default from config)
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many samples
        #[arg(long)]
        count: Option<u64>,
        /// Emit one JSON document per sample instead of a text line
        #[arg(long)]
        json: bool,
    },
    /// apt/dpkg packages
    Packages {
        #[command(subcommand)]
        command: PackageCommand,
    },
    /// systemd services
    Services {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Interfaces, gateway and routes
    Network {
        #[command(subcommand)]
        command: NetworkCommand,
    },
    /// ufw firewall
    Firewall {
        #[command(subcommand)]
        command: FirewallCommand,
    },
    /// Local user accounts
    Users {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Query the systemd journal
    Logs {
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        lines: Option<u32>,
        /// emerg, alert, crit, err, warning, notice, info or debug
        #[arg(long)]
        priority: Option<Priority>,
        /// Anything journalctl --since accepts
        #[arg(long)]
        since: Option<String>,
    },
    /// Managed configuration files
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Write a config file holding the defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PackageCommand {
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    Search {
        term: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the apt-cache record of a package
    Info { name: String },
    Install { name: String },
    Remove { name: String },
    Purge { name: String },
    Update,
    Upgrade,
}

#[derive(Subcommand, Debug)]
enum ServiceCommand {
    List,
    Status { unit: String },
    /// start, stop, restart, reload, enable or disable a unit
    Act { action: ServiceAction, unit: String },
}

#[derive(Subcommand, Debug)]
enum NetworkCommand {
    Overview,
    Routes,
    /// Bring an interface up or down
    Link { interface: String, state: LinkState },
    /// Add or remove interface addresses
    Address {
        #[command(subcommand)]
        command: AddressCommand,
    },
    /// Add or remove static routes
    Route {
        #[command(subcommand)]
        command: RouteCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AddressCommand {
    /// e.g. `add eth0 10.0.0.5/24`
    Add { interface: String, cidr: String },
    Del { interface: String, cidr: String },
}

#[derive(Subcommand, Debug)]
enum RouteCommand {
    Add {
        destination: String,
        /// Gateway address
        #[arg(long)]
        via: Option<String>,
        /// Outgoing interface
        #[arg(long)]
        dev: Option<String>,
    },
    Del { destination: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LinkState {
    Up,
    Down,
}

#[derive(Subcommand, Debug)]
enum FirewallCommand {
    Status,
    Enable,
    Disable,
    Allow { rule: String },
    Deny { rule: String },
    /// Delete a rule by its number in `ufw status numbered`
    Delete { number: String },
    Reload,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    List,
    Create {
        username: String,
        #[arg(long)]
        shell: Option<String>,
        #[arg(long)]
        home: Option<String>,
    },
    Delete { username: String },
    Lock { username: String },
    Unlock { username: String },
    /// Set a password read from the first line of stdin
    Passwd { username: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    List,
    /// Print the file content
    Read { id: String },
    /// Replace the file content with stdin
    Write { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(
        "orbit v{} (os={}, arch={})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config_path
        .map(PathBuf::from)
        .unwrap_or_else(OrbitConfig::default_path);

    let compact = cli.compact;

    // A broken config file must not stop init-config from replacing it
    let config = if matches!(cli.command, Commands::InitConfig { .. }) {
        OrbitConfig::default()
    } else {
        OrbitConfig::load_or_default(&config_path)?
    };
    let console = Console::for_host(config)?;

    match cli.command {
        Commands::Summary => emit(&console.summary().await?, compact),
        Commands::Watch {
            interval,
            count,
            json,
        } => {
            let interval = interval
                .map(|secs| std::time::Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| console.config().watch_interval());
            console
                .watch(interval, count, |summary| {
                    let mut stdout = std::io::stdout().lock();
                    if json {
                        serde_json::to_writer(&mut stdout, summary)?;
                        writeln!(stdout)?;
                    } else {
                        writeln!(stdout, "{}", summary_line(summary))?;
                    }
                    stdout.flush()?;
                    Ok(())
                })
                .await
        }
        Commands::Packages { command } => run_packages(&console, command, compact).await,
        Commands::Services { command } => run_services(&console, command, compact).await,
        Commands::Network { command } => match command {
            NetworkCommand::Overview => emit(&console.network.overview().await?, compact),
            NetworkCommand::Routes => emit(&console.network.routes().await?, compact),
            NetworkCommand::Link { interface, state } => {
                let up = matches!(state, LinkState::Up);
                emit(&console.network.set_link(&interface, up).await?, compact)
            }
            NetworkCommand::Address { command } => {
                let outcome = match command {
                    AddressCommand::Add { interface, cidr } => {
                        console.network.add_address(&interface, &cidr).await?
                    }
                    AddressCommand::Del { interface, cidr } => {
                        console.network.delete_address(&interface, &cidr).await?
                    }
                };
                emit(&outcome, compact)
            }
            NetworkCommand::Route { command } => {
                let outcome = match command {
                    RouteCommand::Add {
                        destination,
                        via,
                        dev,
                    } => {
                        let route = RouteSpec {
                            destination,
                            gateway: via,
                            interface: dev,
                        };
                        console.network.add_route(&route).await?
                    }
                    RouteCommand::Del { destination } => console.network.delete_route(&destination).await?,
                };
                emit(&outcome, compact)
            }
        },
        Commands::Firewall { command } => run_firewall(&console, command, compact).await,
        Commands::Users { command } => run_users(&console, command, compact).await,
        Commands::Logs {
            unit,
            lines,
            priority,
            since,
        } => emit(&console.journal(unit, lines, priority, since).await?, compact),
        Commands::Config { command } => run_config(&console, command, compact).await,
        Commands::InitConfig { force } => init_config(&config_path, force, compact),
    }
}

async fn run_packages(console: &Console, command: PackageCommand, compact: bool) -> Result<()> {
    let (action, name) = match command {
        PackageCommand::List { limit } => return emit(&console.installed_packages(limit).await?, compact),
        PackageCommand::Search { term, limit } => {
            return emit(&console.search_packages(&term, limit).await?, compact)
        }
        PackageCommand::Info { name } => {
            print!("{}", console.packages.info(&name).await?);
            return Ok(());
        }
        PackageCommand::Install { name } => (AptAction::Install, Some(name)),
        PackageCommand::Remove { name } => (AptAction::Remove, Some(name)),
        PackageCommand::Purge { name } => (AptAction::Purge, Some(name)),
        PackageCommand::Update => (AptAction::Update, None),
        PackageCommand::Upgrade => (AptAction::Upgrade, None),
    };
    emit(&console.packages.execute(action, name.as_deref()).await?, compact)
}

async fn run_services(console: &Console, command: ServiceCommand, compact: bool) -> Result<()> {
    match command {
        ServiceCommand::List => emit(&console.services.list().await?, compact),
        ServiceCommand::Status { unit } => {
            let text = console.services.status(&unit).await?;
            print!("{}", text);
            Ok(())
        }
        ServiceCommand::Act { action, unit } => {
            emit(&console.services.act(&unit, action).await?, compact)
        }
    }
}

async fn run_firewall(console: &Console, command: FirewallCommand, compact: bool) -> Result<()> {
    let action = match command {
        FirewallCommand::Status => return emit(&console.network.firewall_status().await?, compact),
        FirewallCommand::Enable => FirewallAction::Enable,
        FirewallCommand::Disable => FirewallAction::Disable,
        FirewallCommand::Allow { rule } => FirewallAction::Allow(rule),
        FirewallCommand::Deny { rule } => FirewallAction::Deny(rule),
        FirewallCommand::Delete { number } => FirewallAction::Delete(number),
        FirewallCommand::Reload => FirewallAction::Reload,
    };
    emit(&console.network.firewall(action).await?, compact)
}

async fn run_users(console: &Console, command: UserCommand, compact: bool) -> Result<()> {
    let message = match command {
        UserCommand::List => return emit(&console.users.list().await?, compact),
        UserCommand::Create {
            username,
            shell,
            home,
        } => {
            console
                .users
                .create(&username, &NewUserOptions { shell, home })
                .await?;
            format!("user {} created", username)
        }
        UserCommand::Delete { username } => {
            console.users.delete(&username).await?;
            format!("user {} deleted", username)
        }
        UserCommand::Lock { username } => {
            console.users.set_locked(&username, true).await?;
            format!("user {} locked", username)
        }
        UserCommand::Unlock { username } => {
            console.users.set_locked(&username, false).await?;
            format!("user {} unlocked", username)
        }
        UserCommand::Passwd { username } => {
            let password = read_password().await?;
            console.users.change_password(&username, &password).await?;
            format!("password for {} changed", username)
        }
    };
    emit(&outcome(message), compact)
}

async fn read_password() -> Result<String> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read password from stdin")?;
    Ok(first_line(&input).to_string())
}

fn first_line(input: &str) -> &str {
    input.lines().next().unwrap_or("")
}

async fn run_config(console: &Console, command: ConfigCommand, compact: bool) -> Result<()> {
    match command {
        ConfigCommand::List => emit(&console.configs.list().await?, compact),
        ConfigCommand::Read { id } => {
            print!("{}", console.configs.read(&id).await?);
            Ok(())
        }
        ConfigCommand::Write { id } => {
            let mut content = String::new();
            tokio::io::stdin()
                .read_to_string(&mut content)
                .await
                .context("failed to read new content from stdin")?;
            console.configs.write(&id, &content).await?;
            emit(&outcome(format!("{} saved", id)), compact)
        }
    }
}

fn init_config(path: &Path, force: bool, compact: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    OrbitConfig::default().save(path)?;
    info!("config saved to {}", path.display());
    emit(&outcome(format!("wrote {}", path.display())), compact)
}

fn outcome(message: String) -> ActionOutcome {
    ActionOutcome { message }
}

fn emit<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

/// Print the failure and map it to the process exit code: 2 for rejected
/// input, 1 for host-side failures.
fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("error: {:#}", err);
    if let Some(cmd) = command_error(err) {
        if let Some(code) = cmd.code() {
            eprintln!("{} exited with status {}", cmd.program(), code);
        }
    }
    ExitCode::from(exit_code(err))
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match Fault::classify(err) {
        Fault::Client => 2,
        Fault::Server => 1,
    }
}
