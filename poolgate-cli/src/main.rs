//! Poolgate CLI Tool
//!
//! Command line interface for validating configuration and checking backends

use anyhow::Result;
use clap::{Parser, Subcommand};
use poolgate_core::config::loader::load_config_from_path;
use poolgate_loadbalance::LoadBalanceService;
use poolgate_relay::HttpRelay;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "poolgate-cli")]
#[command(about = "A CLI tool for managing the Poolgate load balancer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Probe every configured backend once
    HealthCheck {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - listening on port {}", cfg.lb_port);
                    println!("  - {} backends configured", cfg.backends.len());
                    println!("  - strategy: {}", cfg.strategy);
                    println!(
                        "  - health check every {}s (timeout {}s)",
                        cfg.settings.health_check_interval_seconds,
                        cfg.settings.health_check_timeout_seconds
                    );
                    match cfg.settings.admin_port {
                        Some(port) => println!("  - admin endpoints on port {}", port),
                        None => println!("  - admin endpoints disabled"),
                    }
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::HealthCheck { config, json } => {
            if !run_health_check(&config, json).await? {
                std::process::exit(1);
            }
        }
        Commands::GenerateConfig { output, force } => {
            if Path::new(&output).exists() && !force {
                eprintln!("❌ {} already exists, use --force to overwrite", output);
                std::process::exit(1);
            }
            println!("Generating configuration file: {}", output);
            std::fs::write(&output, example_config())?;
            println!("✅ Configuration file generated successfully");
        }
    }

    Ok(())
}

/// 执行一轮健康检查并打印结果，返回是否有后端存活
async fn run_health_check(config_path: &str, json: bool) -> Result<bool> {
    let cfg = load_config_from_path(config_path)?;
    let relay = Arc::new(HttpRelay::from_settings(&cfg.settings)?);
    let service = LoadBalanceService::new(&cfg, relay)?;

    if !json {
        println!("Checking {} backends...", cfg.backends.len());
    }
    service.trigger_health_check().await;
    let health = service.get_service_health();

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        for backend in &health.backends {
            if backend.alive {
                println!("✅ {} is up", backend.url);
            } else {
                println!("❌ {} is down", backend.url);
            }
        }
        println!(
            "{}/{} backends healthy",
            health.stats.healthy_backends, health.stats.total_backends
        );
    }

    Ok(health.is_healthy())
}

/// 示例配置
fn example_config() -> &'static str {
    r#"# Poolgate Configuration File

# Port the load balancer listens on
lb_port = 3030

# Upstream servers, in round-robin order
backends = [
    "http://localhost:5001",
    "http://localhost:5002",
    "http://localhost:5003",
]

# "round-robin" or "least-connected"
strategy = "round-robin"

# Attempt limit hint; failed requests are retried once on another backend
max_attempt_limit = 3

[settings]
health_check_interval_seconds = 20
health_check_timeout_seconds = 10
connect_timeout_seconds = 10
shutdown_grace_period_seconds = 10
max_request_body_bytes = 16777216
# Read-only /health and /backends endpoints
# admin_port = 3031
"#
}
