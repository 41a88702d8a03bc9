use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use jobbuilda::config::Config;
use jobbuilda::gateway::{Gateway, GatewayServer, Methods, Request, Response, serve_stdio};

fn setup_logging(level: &str) -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobbuilda")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("jobbuilda.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(log_file)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{} {}", "Database:".yellow(), config.database.path.display());
    }

    let gateway = Arc::new(Gateway::from_config(config).context("Failed to open services")?);

    match &cli.command {
        Commands::Serve { stdio: true } => serve_stdio(gateway).await.context("stdio session failed"),
        Commands::Serve { stdio: false } => {
            let server = GatewayServer::new(&config.gateway, gateway);
            eprintln!(
                "{} {}",
                "Gateway listening on".green(),
                server.socket_path().display()
            );
            server.run().await.context("Gateway server failed")
        }
        Commands::Tools => {
            for tool in gateway.catalog().tools() {
                println!("{}  {}", tool.name.cyan().bold(), tool.description);
                let required = tool.required_args();
                if !required.is_empty() {
                    println!("    {} {}", "requires:".dimmed(), required.join(", "));
                }
            }
            Ok(())
        }
        Commands::Resources => {
            for template in gateway.catalog().resources() {
                println!("{}  {}", template.uri_template.cyan().bold(), template.description);
            }
            Ok(())
        }
        Commands::Call {
            tool,
            tenant,
            actor,
            args,
        } => {
            let arguments: Value = serde_json::from_str(args).context("--args must be a JSON object")?;
            let params = serde_json::json!({
                "name": tool,
                "arguments": arguments,
                "context": { "tenant_id": tenant, "actor": actor },
            });
            print_response(gateway.handle(Request::new(1, Methods::TOOLS_CALL, params)).await)
        }
        Commands::Read { uri, tenant } => {
            let params = serde_json::json!({ "uri": uri, "context": { "tenant_id": tenant } });
            print_response(gateway.handle(Request::new(1, Methods::RESOURCES_READ, params)).await)
        }
    }
}

fn print_response(response: Response) -> Result<()> {
    match (response.result, response.error) {
        (_, Some(error)) => {
            eprintln!("{} [{}] {}", "Error:".red().bold(), error.code, error.message);
            if let Some(data) = error.data {
                eprintln!("{}", serde_json::to_string_pretty(&data)?.dimmed());
            }
            eyre::bail!("request failed with code {}", error.code)
        }
        (Some(result), None) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        (None, None) => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref().unwrap_or("info")).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
