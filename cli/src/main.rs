use anyhow::{Context, Result};
use baton_core::agent::{Orchestrator, Response, RunStatus};
use baton_core::environment::{self, LocalEnv, PortLease, TcpSandbox};
use baton_core::{Agent, ChatMessage, ContextVariables, Registry, SandboxEnv, agents, config, providers, registry};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod logging;
mod onboard;

#[derive(Parser)]
#[command(name = "baton")]
#[command(about = "baton - multi-agent orchestration runtime", long_about = None)]
struct Cli {
    /// Log every turn and tool call.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Onboard,
    /// Run one query to completion.
    Agent {
        #[command(flatten)]
        run: RunArgs,

        #[arg(short, long)]
        query: String,
    },
    /// Interactive session; history and context carry over between queries.
    Chat {
        #[command(flatten)]
        run: RunArgs,
    },
    /// List registered tools.
    Tools,
    /// List registered agents.
    Agents,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    model: Option<String>,

    /// Agent name or lookup key.
    #[arg(long, default_value = "get_system_triage_agent")]
    agent: String,

    #[arg(long)]
    max_turns: Option<usize>,

    #[arg(long, value_enum, default_value_t = SandboxKind::Local)]
    sandbox: SandboxKind,

    /// Write the message sequence of the run to this file.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Initial context variables as key=value.
    bindings: Vec<String>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            model: None,
            agent: "get_system_triage_agent".to_string(),
            max_turns: None,
            sandbox: SandboxKind::Local,
            transcript: None,
            bindings: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SandboxKind {
    /// Run commands directly on this machine.
    Local,
    /// Talk to a sandbox listening on an allocated local port.
    Tcp,
}

struct Session {
    orchestrator: Orchestrator,
    registry: Arc<Registry>,
    model: String,
    context: ContextVariables,
    lease: Option<PortLease>,
}

impl Session {
    fn start(config: &config::Config, registry: Arc<Registry>, run: &RunArgs) -> Result<Self> {
        let provider = providers::create_provider(config)?;
        let orchestrator = Orchestrator::new(provider)
            .with_registry(Arc::clone(&registry))
            .with_max_turns(run.max_turns.unwrap_or(config.max_turns));

        let (env, lease): (Arc<dyn SandboxEnv>, Option<PortLease>) = match run.sandbox {
            SandboxKind::Local => {
                let workspace = config.local_root().join(&config.sandbox.workspace_name);
                (Arc::new(LocalEnv::new(&workspace)?), None)
            }
            SandboxKind::Tcp => {
                let lease = PortLease::acquire(
                    &config::ensure_baton_dir()?,
                    config.sandbox.port,
                    &config.sandbox.container_name,
                )?;
                let port = lease.port();
                tracing::debug!(port, container = %config.sandbox.container_name, "Sandbox port allocated");
                let sandbox = TcpSandbox::new(config.sandbox_config(port));
                std::fs::create_dir_all(sandbox.config().host_workspace())?;
                (Arc::new(sandbox), Some(lease))
            }
        };

        let mut context = ContextVariables::new()
            .with("working_dir", env.workspace().trim_start_matches('/'));
        environment::attach_code_env(&mut context, env);
        context.merge(ContextVariables::from_bindings(&run.bindings));

        Ok(Self {
            orchestrator,
            registry,
            model: run.model.clone().unwrap_or_else(|| config.model.clone()),
            context,
            lease,
        })
    }

    fn finish(self) -> Result<()> {
        match self.lease {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }
}

fn report(response: &Response, transcript: Option<&Path>) -> Result<()> {
    if let Some(path) = transcript {
        response.transcript().save(path)?;
    }

    let sender = response
        .last_message()
        .and_then(|m| m.sender.as_deref())
        .unwrap_or(response.agent.name());
    println!("{} {}", style(format!("[{sender}]")).cyan().bold(), response.output());

    if let Some(err) = response.error() {
        eprintln!("{} {}", style("Run aborted:").red().bold(), err);
    }
    Ok(())
}

async fn run_agent(config: &config::Config, registry: Arc<Registry>, run: RunArgs, query: String) -> Result<()> {
    let session = Session::start(config, registry, &run)?;
    let agent = session.registry.agent(&run.agent, &session.model)?;

    let response = session
        .orchestrator
        .run(agent, vec![ChatMessage::user(query)], session.context.clone())
        .await;
    report(&response, run.transcript.as_deref())?;
    session.finish()?;

    if response.status == RunStatus::Aborted {
        anyhow::bail!("run aborted after {} turns", response.turns);
    }
    Ok(())
}

async fn run_chat(config: &config::Config, registry: Arc<Registry>, run: RunArgs) -> Result<()> {
    let session = Session::start(config, registry, &run)?;
    let mut agent = session.registry.agent(&run.agent, &session.model)?;
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut context = session.context.clone();

    println!("{}", style("Baton").cyan().bold());
    println!("Type your message (Ctrl+D to exit):\n");

    use std::io::BufRead;
    let stdin = std::io::stdin();
    loop {
        print!("{} ", style(format!("{} >", agent.name())).green());
        let _ = std::io::stdout().flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) | Err(_) => {
                println!("\nGoodbye!");
                break;
            }
            Ok(_) => {}
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        history.push(ChatMessage::user(input));
        let response = session.orchestrator.run(agent, history, context).await;
        report(&response, run.transcript.as_deref())?;
        println!();

        agent = Agent::clone(&response.agent);
        history = response.messages;
        context = response.context_variables;
    }

    session.finish()
}

fn print_catalogue(registry: &Registry, agents: bool) {
    if agents {
        for info in registry.list_agents() {
            println!(
                "{} {}\n    {}\n    {}:{}",
                style(&info.name).cyan().bold(),
                style(format!("({})", info.func_name)).dim(),
                info.description,
                info.source.file,
                info.source.line
            );
        }
        return;
    }
    for info in registry.list_tools() {
        let params: Vec<String> = info
            .parameters
            .iter()
            .map(|p| format!("{}{}: {}", p.name, if p.required { "" } else { "?" }, p.ty))
            .collect();
        println!(
            "{}({})\n    {}",
            style(&info.name).cyan().bold(),
            params.join(", "),
            info.description
        );
    }
}

fn prepare(debug: bool) -> Result<(config::Config, Arc<Registry>)> {
    let config = config::Config::load_or_init()?;
    logging::init(debug || config.debug);
    let registry = agents::builtin_registry().context("Failed to build the registry")?;
    Ok((config, registry::install(registry)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or_else(|| {
        if !config::config_exists() {
            Commands::Onboard
        } else {
            Commands::Chat {
                run: RunArgs::default(),
            }
        }
    });

    match command {
        Commands::Onboard => {
            logging::init(cli.debug);
            let onboard_config = onboard::run_onboard().map_err(|e| {
                eprintln!("{} Onboarding failed: {}", style("✗").red(), e);
                anyhow::anyhow!("Onboarding failed: {}", e)
            })?;
            config::save_config(&onboard_config)
        }
        Commands::Agent { run, query } => {
            let (config, registry) = prepare(cli.debug)?;
            run_agent(&config, registry, run, query).await
        }
        Commands::Chat { run } => {
            let (config, registry) = prepare(cli.debug)?;
            run_chat(&config, registry, run).await
        }
        Commands::Tools => {
            let (_, registry) = prepare(cli.debug)?;
            print_catalogue(&registry, false);
            Ok(())
        }
        Commands::Agents => {
            let (_, registry) = prepare(cli.debug)?;
            print_catalogue(&registry, true);
            Ok(())
        }
    }
}
