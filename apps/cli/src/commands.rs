//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use harvest_engine::{
    DefinitionResolver, ElementRegistry, PluginCatalog, RunOutcome, Scraper, source_for,
};
use harvest_scripting::Bindings;
use harvest_shared::{AppConfig, ScraperConfiguration, Value, init_config, load_config};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Harvest: declarative web extraction pipelines.
#[derive(Parser)]
#[command(
    name = "harvest",
    version,
    about = "Run declarative extraction pipelines described in XML definition documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format for `run --print`.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Execute a definition document.
    Run {
        /// Definition file path or http(s) URL.
        config: String,

        /// Working directory for relative file paths.
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Extra plugin to register, as `type-id[:namespace-uri]`. Repeatable.
        #[arg(short, long = "plugin")]
        plugins: Vec<String>,

        /// Initial variable, as `name=value`. Repeatable.
        #[arg(long = "var")]
        vars: Vec<String>,

        /// HTTP proxy host.
        #[arg(long, env = "HARVEST_PROXY_HOST")]
        proxy_host: Option<String>,

        /// HTTP proxy port.
        #[arg(long)]
        proxy_port: Option<u16>,

        /// Print the root value and final variables.
        #[arg(long)]
        print: bool,

        /// Format used by --print.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve a definition document without running it.
    Check {
        /// Definition file path or http(s) URL.
        config: String,

        /// Extra plugin to register, as `type-id[:namespace-uri]`. Repeatable.
        #[arg(short, long = "plugin")]
        plugins: Vec<String>,
    },

    /// List every registered element and its attributes.
    Elements {
        /// Also list suggested attribute values.
        #[arg(long)]
        suggestions: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file at ~/.harvest/harvest.toml.
    Init,
    /// Show the current configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "harvest=info",
        1 => "harvest=debug",
        _ => "harvest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            workdir,
            plugins,
            vars,
            proxy_host,
            proxy_port,
            print,
            format,
        } => {
            let overrides = RunOverrides {
                workdir,
                proxy_host,
                proxy_port,
            };
            cmd_run(&config, &plugins, &vars, overrides, print.then_some(format)).await
        }
        Command::Check { config, plugins } => cmd_check(&config, &plugins).await,
        Command::Elements { suggestions } => cmd_elements(suggestions),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flag values that override the config file for one run.
struct RunOverrides {
    workdir: Option<PathBuf>,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
}

impl RunOverrides {
    fn apply(self, mut config: ScraperConfiguration) -> ScraperConfiguration {
        if let Some(workdir) = self.workdir {
            config = config.with_workdir(workdir);
        }
        if self.proxy_host.is_some() {
            config.http.proxy_host = self.proxy_host;
        }
        if self.proxy_port.is_some() {
            config.http.proxy_port = self.proxy_port;
        }
        config
    }
}

/// Built-ins plus config-file plugins plus `extra`. Failed plugins are
/// reported and skipped.
fn build_registry(app: &AppConfig, extra: &[String]) -> ElementRegistry {
    let mut registry = ElementRegistry::with_builtins();
    let references: Vec<&String> = app.plugins.register.iter().chain(extra).collect();
    let report = registry.register_plugins(&PluginCatalog::with_defaults(), &references);
    for (reference, error) in &report.failures {
        eprintln!("warning: plugin {reference} skipped: {error}");
    }
    registry
}

/// Parse `name=value` pairs into initial bindings.
fn parse_vars(vars: &[String]) -> Result<Bindings> {
    vars.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| eyre!("invalid --var '{pair}': expected name=value"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(eyre!("invalid --var '{pair}': empty name"));
            }
            Ok((name.to_string(), Value::from(value)))
        })
        .collect()
}

fn print_outcome(outcome: &RunOutcome, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            match &outcome.value {
                Value::Binary(bytes) => println!("<{} bytes of binary data>", bytes.len()),
                other => println!("{}", other.to_text_joined("\n")),
            }
            for (name, value) in &outcome.variables {
                println!("{name} = {}", value.to_text_joined(", "));
            }
        }
        OutputFormat::Json => {
            let variables: serde_json::Map<String, serde_json::Value> = outcome
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            let json = serde_json::json!({
                "run_id": outcome.run_id.to_string(),
                "elapsed_ms": outcome.elapsed.as_millis() as u64,
                "value": outcome.value.to_json(),
                "variables": variables,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    location: &str,
    plugins: &[String],
    vars: &[String],
    overrides: RunOverrides,
    print: Option<OutputFormat>,
) -> Result<()> {
    let app = load_config()?;
    let variables = parse_vars(vars)?;
    let registry = build_registry(&app, plugins);
    let config = overrides.apply(ScraperConfiguration::from(&app));

    let source = source_for(location)?;
    let tree = DefinitionResolver::new(Arc::new(registry))
        .resolve_source(source.as_ref())
        .await?;
    let scraper = Scraper::new(Arc::new(tree), config);

    let token = scraper.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping run");
            token.cancel();
        }
    });

    let outcome = scraper.execute(&variables).await?;
    info!(
        run_id = %outcome.run_id,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "pipeline completed"
    );

    if let Some(format) = print {
        print_outcome(&outcome, &format)?;
    }
    Ok(())
}

async fn cmd_check(location: &str, plugins: &[String]) -> Result<()> {
    let app = load_config()?;
    let registry = build_registry(&app, plugins);
    let source = source_for(location)?;
    let tree = DefinitionResolver::new(Arc::new(registry))
        .resolve_source(source.as_ref())
        .await?;
    println!("{}: OK ({} elements)", tree.source(), tree.node_count());
    Ok(())
}

fn cmd_elements(suggestions: bool) -> Result<()> {
    let app = load_config()?;
    let registry = build_registry(&app, &[]);

    for (name, info) in registry.elements() {
        let mut attributes: Vec<String> = info
            .required_attributes
            .iter()
            .map(|a| format!("{a}*"))
            .chain(info.valid_attributes.iter().map(|a| a.to_string()))
            .collect();
        if attributes.is_empty() {
            attributes.push("-".into());
        }
        println!("{name}  [{}]", attributes.join(", "));

        for slot in info.slots {
            let mut flags = Vec::new();
            if slot.required {
                flags.push("required");
            }
            if slot.repeatable {
                flags.push("repeatable");
            }
            println!("    <{}> {}", slot.name, flags.join(" "));
        }

        if suggestions {
            let Some(operation) = registry.lookup(&name) else {
                continue;
            };
            for attribute in info.required_attributes.iter().chain(info.valid_attributes) {
                if let Some(values) = operation.attribute_value_suggestions(attribute) {
                    println!("    {attribute}: {}", values.join(" | "));
                }
            }
        }
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_parse_as_name_value_pairs() {
        let vars = parse_vars(&["start=1".into(), "url=http://x/?a=b".into()]).unwrap();
        assert_eq!(vars["start"], Value::from("1"));
        assert_eq!(vars["url"], Value::from("http://x/?a=b"));
        assert!(parse_vars(&["novalue".into()]).is_err());
        assert!(parse_vars(&["=x".into()]).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let config = RunOverrides {
            workdir: Some(PathBuf::from("/srv/harvest")),
            proxy_host: Some("proxy.local".into()),
            proxy_port: None,
        }
        .apply(ScraperConfiguration::default());
        assert_eq!(config.workdir, PathBuf::from("/srv/harvest"));
        assert_eq!(
            config.http.proxy_url().as_deref(),
            Some("http://proxy.local:80")
        );
    }

    #[test]
    fn cli_parses_repeatable_flags() {
        let cli = Cli::parse_from([
            "harvest", "run", "site.xml", "--var", "a=1", "--var", "b=2", "-p",
            "harvest.plugins.ZipPlugin:urn:z",
        ]);
        match cli.command {
            Command::Run { vars, plugins, .. } => {
                assert_eq!(vars.len(), 2);
                assert_eq!(plugins, vec!["harvest.plugins.ZipPlugin:urn:z"]);
            }
            _ => panic!("expected run"),
        }
    }
}
