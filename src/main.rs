use anyhow::Result;
use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
use client::{Backend as _, OllamaClient};
use companion::Companion;
use config::Config;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use storage::{FileStore, KeyValueStore, MemoryStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use types::{CompanionEvent, ReplyOrigin, Role};

mod cache;
mod client;
mod companion;
mod config;
mod emotion;
mod error;
mod history;
mod storage;
mod stream;
mod transport;
mod types;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.streaming-companion/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    Chat,
    /// Send a single message and exit
    Ask { message: Vec<String> },
    /// Check whether the backend is reachable
    Probe,
}

mod world {
    use clap::{Parser, Subcommand};

    #[derive(Subcommand)]
    pub(crate) enum Mem {
        Clear,
        Dump,
        Log,
    }

    #[derive(Subcommand)]
    pub(crate) enum Cache {
        Clear,
        Stats,
    }

    #[derive(Parser)]
    #[command(version, about, long_about = None)]
    pub(crate) enum Command {
        #[command(subcommand)]
        Mem(Mem),
        #[command(subcommand)]
        Cache(Cache),
        Probe,
        Exit,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path.or_else(config::default_config_path) {
        Some(path) => Ok(Config::load(&path)?),
        None => Ok(Config::default()),
    }
}

fn open_companion(config: Config) -> Companion<OllamaClient> {
    let store: Arc<dyn KeyValueStore> = match config::data_dir() {
        Ok(dir) => Arc::new(FileStore::new(dir)),
        Err(err) => {
            warn!("{}, history will not outlive this session", err);
            Arc::new(MemoryStore::default())
        }
    };
    let client = OllamaClient::from_config(&config);
    Companion::new(client, store, config)
}

async fn print_events(mut events: mpsc::UnboundedReceiver<CompanionEvent>) {
    while let Some(event) = events.recv().await {
        if let CompanionEvent::Fragment(text) = event {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
    }
}

async fn respond(companion: &mut Companion<OllamaClient>, message: &str) {
    print!("{}: ", companion.persona());
    let _ = std::io::stdout().flush();

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));
    let reply = companion.generate(message, &tx).await;
    drop(tx);
    let _ = printer.await;
    debug!("reply finished in {:?}", companion.phase());

    match (reply.origin, reply.tokens) {
        (ReplyOrigin::Backend, Some(tokens)) => {
            println!(" (t: {}, e: {})", tokens, reply.emotion)
        }
        (ReplyOrigin::Cache, _) => println!(" (cached, e: {})", reply.emotion),
        _ => println!(" (e: {})", reply.emotion),
    }
}

async fn run_command(
    companion: &mut Companion<OllamaClient>,
    command: world::Command,
    user_name: &str,
) {
    match command {
        world::Command::Mem(mem) => match mem {
            world::Mem::Clear => {
                let drained_count = companion.clear_history();
                println!("world: {} messages cleared", drained_count);
            }
            world::Mem::Dump => {
                println!("world: Messages: {:#?}", companion.history());
            }
            world::Mem::Log => {
                for turn in companion.history().iter() {
                    match turn.role {
                        Role::User => println!("{}: {}", user_name, turn.content),
                        Role::Agent => println!("{}: {}", companion.persona(), turn.content),
                    }
                }
            }
        },
        world::Command::Cache(cache) => match cache {
            world::Cache::Clear => {
                companion.clear_cache();
                println!("world: cache cleared");
            }
            world::Cache::Stats => {
                println!("world: {} cached answers", companion.cache().len());
            }
        },
        world::Command::Probe => {
            let available = companion.backend().probe().await;
            println!(
                "world: {} is {}",
                companion.backend().endpoint(),
                if available { "available" } else { "unavailable" }
            );
        }
        world::Command::Exit => {
            println!("world: Exiting.");
            exit(0)
        }
    }
}

async fn exec_chat(config: Config) -> Result<()> {
    let user_name = whoami::username();
    let mut companion = open_companion(config);

    ctrlc::set_handler(move || {
        println!("\nworld: Exiting.");
        exit(0);
    })?;

    chat_loop(&mut companion, BufReader::new(tokio::io::stdin()), &user_name).await
}

async fn chat_loop<R>(
    companion: &mut Companion<OllamaClient>,
    input: R,
    user_name: &str,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        print!("{}: ", user_name);
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            return Ok(());
        };

        if let Some(command) = input.strip_prefix('#') {
            let mut sw = vec!["#".to_string()];
            match shellwords::split(command.trim()) {
                Ok(mut words) => sw.append(&mut words),
                Err(err) => {
                    println!("world: {}", err);
                    continue;
                }
            }

            match <world::Command as CommandFactory>::command().try_get_matches_from(sw) {
                Ok(mut matches) => match world::Command::from_arg_matches_mut(&mut matches) {
                    Ok(command) => run_command(companion, command, user_name).await,
                    Err(err) => println!("world: {}", err),
                },
                Err(err) => println!("world: {}", err),
            }
        } else {
            let input = input.trim();
            respond(companion, input).await;
        }
    }
}

async fn exec_ask(config: Config, message: Vec<String>) -> Result<()> {
    let mut companion = open_companion(config);
    respond(&mut companion, message.join(" ").trim()).await;
    Ok(())
}

async fn exec_probe(config: Config) -> Result<()> {
    let client = OllamaClient::from_config(&config);
    if client.probe().await {
        println!("{} is available", client.endpoint());
        Ok(())
    } else {
        println!("{} is unavailable", client.endpoint());
        exit(1)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config)?;

    match args.command {
        Command::Chat => exec_chat(config).await,
        Command::Ask { message } => exec_ask(config, message).await,
        Command::Probe => exec_probe(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_companion() -> Companion<OllamaClient> {
        let config = Config::default();
        let client = OllamaClient::from_config(&config);
        Companion::new(client, Arc::new(MemoryStore::default()), config)
    }

    #[tokio::test]
    async fn chat_loop_reads_commands_until_eof() {
        let mut companion = offline_companion();
        let input: &[u8] = b"#mem clear\n#cache stats\n#mem log\n#bogus\n";

        chat_loop(&mut companion, input, "tester").await.unwrap();

        assert_eq!(companion.history().len(), 0);
        assert_eq!(companion.cache().len(), 0);
    }
}
