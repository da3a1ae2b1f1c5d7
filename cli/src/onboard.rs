use anyhow::{Context, Result};
use baton_core::config::{Config, SandboxSettings};
use console::style;
use dialoguer::{Confirm, Input, Select};

const BANNER: &str = r"
    -------------------------------------

      ____    _  _____ ___  _   _
     | __ )  / \|_   _/ _ \| \ | |
     |  _ \ / _ \ | || | | |  \| |
     | |_) / ___ \| || |_| | |\  |
     |____/_/   \_\_| \___/|_| \_|

    -------------------------------------
";

const PROVIDERS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("compatible", "BATON_API_KEY"),
];

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn setup_provider() -> Result<(String, Option<String>)> {
    let names: Vec<&str> = PROVIDERS.iter().map(|(name, _)| *name).collect();
    let selection = Select::new()
        .with_prompt("Select your provider")
        .items(&names)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    let provider = names[selection].to_string();
    let base_url = if provider == "compatible" {
        let url: String = Input::new()
            .with_prompt("Base URL of the chat completions endpoint")
            .default("http://localhost:8000/v1".to_string())
            .interact_text()
            .context("Failed to read base URL")?;
        Some(url)
    } else {
        None
    };

    Ok((provider, base_url))
}

fn setup_api_key(provider: &str) -> Result<String> {
    let env_var = PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, var)| *var)
        .unwrap_or("BATON_API_KEY");

    if std::env::var(env_var).is_ok_and(|key| !key.is_empty()) {
        println!(
            "  {} Found {} in the environment, it will be used at run time.",
            style("✓").green(),
            style(env_var).cyan()
        );
        return Ok(String::new());
    }

    let api_key: String = Input::new()
        .with_prompt(format!("Enter your {provider} API key"))
        .allow_empty(provider == "compatible")
        .interact_text()
        .context("Failed to read API key")?;

    if api_key.is_empty() && provider != "compatible" {
        return Err(anyhow::anyhow!("API key cannot be empty"));
    }

    Ok(api_key)
}

fn setup_model(provider: &str) -> Result<String> {
    let models: &[&str] = match provider {
        "openrouter" => &["openai/gpt-4o", "openai/gpt-4o-mini", "anthropic/claude-sonnet-4"],
        _ => &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"],
    };

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

fn setup_sandbox() -> Result<SandboxSettings> {
    let defaults = SandboxSettings::default();

    let workspace_name: String = Input::new()
        .with_prompt("Workspace directory name inside the sandbox")
        .default(defaults.workspace_name.clone())
        .interact_text()
        .context("Failed to read workspace name")?;

    let container_name: String = Input::new()
        .with_prompt("Sandbox container name")
        .default(defaults.container_name.clone())
        .interact_text()
        .context("Failed to read container name")?;

    let port: u16 = Input::new()
        .with_prompt("First port to try for the sandbox connection")
        .default(defaults.port)
        .interact_text()
        .context("Failed to read port")?;

    Ok(SandboxSettings {
        workspace_name,
        container_name,
        port,
        local_root: None,
    })
}

pub fn run_onboard() -> Result<Config> {
    println!("{}", style(BANNER).cyan().bold());

    println!("  {}", style("Welcome to Baton!").white().bold());
    println!(
        "  {}",
        style("This wizard configures the provider, model and sandbox your agents run with.").dim()
    );
    println!();

    print_step(1, 4, "Provider");
    let (provider, base_url) = setup_provider()?;

    print_step(2, 4, "API Key Setup");
    let api_key = setup_api_key(&provider)?;

    print_step(3, 4, "Model Selection");
    let model = setup_model(&provider)?;

    print_step(4, 4, "Sandbox");
    let sandbox = setup_sandbox()?;

    let debug = Confirm::new()
        .with_prompt("Log every turn at debug level by default?")
        .default(false)
        .interact()
        .context("Failed to read debug preference")?;

    let config = Config {
        provider: Some(provider),
        api_key,
        base_url,
        model,
        debug,
        sandbox,
        ..Default::default()
    };

    let workspace = config.local_root().join(&config.sandbox.workspace_name);
    if let Err(e) = std::fs::create_dir_all(&workspace) {
        eprintln!(
            "  {} Warning: Could not create workspace: {}",
            style("!").yellow(),
            e
        );
    } else {
        println!(
            "  {} Workspace ready at {}",
            style("✓").green(),
            style(workspace.display()).cyan()
        );
    }

    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(baton_core::config::get_config_path().display()).cyan()
    );
    println!();
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("baton agent --query \"...\"").cyan().bold()
    );
    println!();

    Ok(config)
}
