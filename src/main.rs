use std::{io, path::Path, time::Duration};

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::ProgressBar;

use repost::batch;
use repost::definition::RequestId;
use repost::engine::{print_response, Engine, ExecutionOptions};
use repost::env::{EnvStore, Environment};
use repost::interactive::run_new;
use repost::project::Project;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "repost",
    version,
    long_version = LONG_VERSION,
    about = "File-first HTTP client with persistent environments",
    disable_help_subcommand = true
)]
struct Cli {
    /// Switch the active environment before running the command
    #[arg(short = 'e', long = "env", global = true, value_name = "NAME")]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold a repost/ project in the current directory
    Init,
    /// Interactively create a request definition
    New,
    /// Execute one request definition
    Run {
        /// Request identifier, e.g. users/GET_profile
        #[arg(value_name = "REQUEST")]
        request: String,

        /// Print request and response details plus the full body
        #[arg(short, long)]
        verbose: bool,

        /// Infer and store a schema from the JSON response
        #[arg(long)]
        infer_schema: bool,
    },
    /// Run every request and validate responses against stored schemas
    Test,
    /// List request definitions with file metadata
    List,
    /// Inspect or modify the environment store
    #[command(subcommand)]
    Env(EnvCommands),
    /// Emit a shell completion script
    Completions {
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum EnvCommands {
    /// Switch the active environment
    Use {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Set a variable in the active environment
    Set {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Show the active environment
    Show {
        /// Print the raw store file instead
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init => {
            let (_, report) = Project::init(&cwd)?;
            for path in &report.created {
                println!("{} {}", "created".green(), display_under(&cwd, path));
            }
            for path in &report.existing {
                println!("{} {}", "exists ".dimmed(), display_under(&cwd, path));
            }
        }
        Commands::New => {
            let project = Project::locate(&cwd)?;
            run_new(&project)?;
        }
        Commands::Run {
            request,
            verbose,
            infer_schema,
        } => {
            let project = Project::locate(&cwd)?;
            let engine = Engine::new(
                project,
                ExecutionOptions {
                    infer_schema,
                    login_retry: true,
                },
            );
            apply_env_flag(engine.store(), cli.env.as_deref())?;

            let id = RequestId::parse(&request)?;
            let spinner = ProgressBar::new_spinner();
            spinner.set_message(id.to_string());
            spinner.enable_steady_tick(Duration::from_millis(80));
            let result = engine.execute(&id).await;
            spinner.finish_and_clear();

            print_response(&result?, verbose);
        }
        Commands::Test => {
            let project = Project::locate(&cwd)?;
            let engine = Engine::new(
                project,
                ExecutionOptions {
                    infer_schema: false,
                    login_retry: false,
                },
            );
            apply_env_flag(engine.store(), cli.env.as_deref())?;

            let report = batch::run_all(&engine).await?;
            batch::print_report(&report);
            if !report.all_passed() {
                bail!(
                    "{} of {} requests failed",
                    report.failed(),
                    report.outcomes.len()
                );
            }
        }
        Commands::List => {
            let project = Project::locate(&cwd)?;
            let discovered = project.discover()?;
            if discovered.is_empty() {
                println!(
                    "No request definitions under {}",
                    project.requests_dir().display()
                );
            }
            for request in &discovered {
                println!("{request}");
            }
        }
        Commands::Env(command) => {
            let project = Project::locate(&cwd)?;
            let store = EnvStore::new(project.store_path());
            apply_env_flag(&store, cli.env.as_deref())?;
            match command {
                EnvCommands::Use { name } => {
                    let env = store.set_active(&name)?;
                    println!("Active environment is now {}", env.name.bold());
                }
                EnvCommands::Set { key, value } => {
                    let env = store.set_variable(&key, &value)?;
                    println!("{} set in {}", key.bold(), env.name);
                }
                EnvCommands::Show { all } => {
                    if all {
                        print!("{}", store.read_raw()?);
                    } else {
                        print_environment(&store.load_active()?);
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut io::stdout());
        }
    }

    Ok(())
}

fn apply_env_flag(store: &EnvStore, name: Option<&str>) -> Result<()> {
    if let Some(name) = name {
        store.set_active(name)?;
    }
    Ok(())
}

fn print_environment(env: &Environment) {
    println!("{} {}", "Environment:".bold(), env.name.cyan());
    if env.variables.is_empty() {
        println!("  {}", "(no variables)".dimmed());
    }
    for (key, value) in &env.variables {
        println!("  {key} = {value}");
    }
    if let Some(login) = &env.login {
        let codes: Vec<String> = login.triggered_by.iter().map(u16::to_string).collect();
        println!(
            "  {} {} {}",
            "login:".bold(),
            login.request,
            format!("(on {})", codes.join(", ")).dimmed()
        );
    }
    if !env.cookies.is_empty() {
        let names: Vec<&str> = env.cookies.keys().map(String::as_str).collect();
        println!("  {} {}", "cookies:".bold(), names.join(", ").dimmed());
    }
}

fn display_under(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
