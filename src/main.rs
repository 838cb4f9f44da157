//! agentbus - in-process agent container
//!
//! Main entry point for the agentbus CLI.

use agentbus::agent::{Agent, Behaviour, BehaviourContext, BehaviourResult, Schedule};
use agentbus::config::{validate_config_result, AgentBusConfig, RemoteConfig};
use agentbus::mail::{
    Address, HttpTransport, Message, Registry, RelayServer, RemoteTransport, Template,
    UnroutableTransport,
};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// agentbus - agent registry and message router
#[derive(Parser, Debug)]
#[command(name = "agentbus")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/agentbus/config.yaml)
    #[arg(short, long, env = "AGENTBUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the relay server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Register an echo agent under this address (repeatable)
        #[arg(long)]
        echo: Vec<String>,
    },

    /// Hand a message to a remote relay
    Send {
        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Sender address
        #[arg(short, long, default_value = "cli@localhost")]
        from: String,

        /// Message body
        #[arg(short, long)]
        body: String,

        /// Thread id
        #[arg(long)]
        thread: Option<String>,

        /// Relay endpoint (overrides config)
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// Exchange messages between two in-process agents
    Ping {
        /// Number of round trips
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

fn main() {
    if let Err(e) = agentbus::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> agentbus::Result<()> {
    if let Commands::Init = cli.command {
        return handle_init_command(cli.config.as_deref());
    }

    let config = AgentBusConfig::load_or_default(cli.config.as_deref())?;
    validate_config_result(&config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Init => Ok(()),
        Commands::Serve { bind, echo } => {
            runtime.block_on(handle_serve_command(&config, bind, echo))
        }
        Commands::Send {
            to,
            from,
            body,
            thread,
            endpoint,
        } => runtime.block_on(handle_send_command(
            &config, &to, &from, body, thread, endpoint,
        )),
        Commands::Ping { count } => runtime.block_on(handle_ping_command(&config, count)),
    }
}

fn handle_init_command(config_path: Option<&Path>) -> agentbus::Result<()> {
    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AgentBusConfig::default_path);

    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    AgentBusConfig::new().save(&config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Start a relay with an echo agent:");
    println!("     agentbus serve --echo echo@localhost");
    println!();
    println!("  2. Send it a message:");
    println!(
        "     agentbus send --to echo@localhost --body hello --endpoint http://127.0.0.1:7400"
    );

    Ok(())
}

fn remote_transport(remote: Option<&RemoteConfig>) -> Arc<dyn RemoteTransport> {
    match remote {
        Some(remote) => Arc::new(HttpTransport::from_config(remote)),
        None => Arc::new(UnroutableTransport),
    }
}

/// Replies to every message with the same body
struct Echo;

#[async_trait]
impl Behaviour for Echo {
    async fn run(&mut self, ctx: &BehaviourContext) -> BehaviourResult {
        let Some(message) = ctx.receive(None).await else {
            return Ok(());
        };
        tracing::info!(agent = %ctx.address(), from = ?message.from, "Echoing message");

        if let Some(reply) = message.make_reply() {
            let body = message.body.clone().unwrap_or_default();
            if let Err(e) = ctx.send(reply.with_body(body)).await {
                tracing::warn!(error = %e, "Echo reply failed");
            }
        }
        Ok(())
    }
}

async fn handle_serve_command(
    config: &AgentBusConfig,
    bind: Option<String>,
    echo: Vec<String>,
) -> agentbus::Result<()> {
    let registry = Arc::new(Registry::new());
    let transport = remote_transport(config.remote.as_ref());

    let mut agents = Vec::new();
    for address in echo {
        let agent = Agent::builder(address.parse::<Address>()?)
            .registry(registry.clone())
            .transport(transport.clone())
            .from_config(&config.agents)
            .build();
        agent.add_behaviour(Echo, Schedule::Cyclic, None);
        agent.start()?;
        println!("Echo agent registered at {}", agent.address());
        agents.push(agent);
    }

    let bind = bind.unwrap_or_else(|| config.relay.bind.clone());
    println!("Relay listening on {}", bind);

    let result = RelayServer::from_config(registry, &config.relay)
        .run(&bind)
        .await;

    for agent in &agents {
        agent.stop().await;
    }
    result.map_err(Into::into)
}

async fn handle_send_command(
    config: &AgentBusConfig,
    to: &str,
    from: &str,
    body: String,
    thread: Option<String>,
    endpoint: Option<String>,
) -> agentbus::Result<()> {
    let transport: Arc<dyn RemoteTransport> = match endpoint {
        Some(endpoint) => Arc::new(HttpTransport::new(endpoint)),
        None => match &config.remote {
            Some(remote) => Arc::new(HttpTransport::from_config(remote)),
            None => {
                return Err(agentbus::AgentBusError::Config(
                    "No remote endpoint configured. Pass --endpoint or set remote.endpoint"
                        .to_string(),
                ))
            }
        },
    };

    // Not registered anywhere, so the message always goes to the relay.
    let agent = Agent::builder(from.parse()?).transport(transport).build();

    let mut message = Message::parse_to(to)?.with_body(body);
    if let Some(thread) = thread {
        message = message.with_thread(thread);
    }
    let id = message.id.clone();

    agent.send(message).await?;
    println!("✓ Message {} handed to relay for {}", id.as_str(), to);
    Ok(())
}

/// Answers every `ping` with a `pong` on the same thread
struct Ponger;

#[async_trait]
impl Behaviour for Ponger {
    async fn run(&mut self, ctx: &BehaviourContext) -> BehaviourResult {
        if let Some(reply) = ctx.receive(None).await.and_then(|m| m.make_reply()) {
            ctx.send(reply.with_body("pong")).await?;
        }
        Ok(())
    }
}

/// Sends `count` pings and reports each round trip
struct Pinger {
    peer: Address,
    count: usize,
    report: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Behaviour for Pinger {
    async fn run(&mut self, ctx: &BehaviourContext) -> BehaviourResult {
        for seq in 1..=self.count {
            let thread = format!("ping-{}", seq);
            let started = Instant::now();
            ctx.send(
                Message::new(self.peer.clone())
                    .with_body("ping")
                    .with_thread(&thread),
            )
            .await?;

            let pong = Template::new().with_thread(&thread).with_body("pong");
            let line = match ctx
                .receive_matching(&pong, Some(Duration::from_secs(1)))
                .await
            {
                Some(_) => format!("pong {} from {} in {:?}", seq, self.peer, started.elapsed()),
                None => format!("ping {} to {} timed out", seq, self.peer),
            };
            let _ = self.report.send(line);
        }
        Ok(())
    }
}

async fn handle_ping_command(config: &AgentBusConfig, count: usize) -> agentbus::Result<()> {
    let registry = Arc::new(Registry::new());
    let pinger_address: Address = "pinger@localhost".parse()?;
    let ponger_address: Address = "ponger@localhost".parse()?;

    let ponger = Agent::builder(ponger_address.clone())
        .registry(registry.clone())
        .mailbox_capacity(config.agents.mailbox_capacity)
        .build();
    ponger.add_behaviour(Ponger, Schedule::Cyclic, None);

    let pinger = Agent::builder(pinger_address)
        .registry(registry.clone())
        .mailbox_capacity(config.agents.mailbox_capacity)
        .build();
    let (report, mut lines) = mpsc::unbounded_channel();
    let handle = pinger.add_behaviour(
        Pinger {
            peer: ponger_address,
            count,
            report,
        },
        Schedule::OneShot,
        None,
    );

    ponger.start()?;
    pinger.start()?;

    handle.join().await;
    while let Ok(line) = lines.try_recv() {
        println!("{}", line);
    }
    if let Some(error) = handle.last_error() {
        println!("Pinger failed: {}", error);
    }

    pinger.stop().await;
    ponger.stop().await;
    Ok(())
}
