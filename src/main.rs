use std::{net::SocketAddr, path::Path};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use portico::{
    adapters::build_gateway,
    config::{loader::load_config, validation::GatewayConfigValidator},
    metrics, tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config/gateway.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config/gateway.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config/gateway.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config/gateway.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config),
    };

    match command {
        "validate" => return validate_config_command(&config_path),
        "init" => return init_config_command(&config_path).await,
        "serve" => {}
        _ => unreachable!(),
    }

    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    GatewayConfigValidator::validate(&config).map_err(|e| eyre!("invalid configuration:\n{e}"))?;

    tracing_setup::init_tracing(&config.log)
        .map_err(|e| eyre!("failed to initialize logging: {e}"))?;
    metrics::describe_metrics();

    tracing::info!(config = %config_path, "configuration loaded and validated");

    let (router, limiter) = build_gateway(&config, None)?;
    let sweeper = limiter.spawn_sweeper();

    let shutdown = std::sync::Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("signal handler error: {}", e);
        }
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        listen_addr = %addr,
        services = config.services.len(),
        tracing_enabled = config.tracer.enabled,
        "gateway starting"
    );

    let drain_shutdown = shutdown.clone();
    let server = async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            drain_shutdown.wait_for_shutdown_signal().await;
        })
        .await
    };

    let grace = config.shutdown_grace()?;
    let grace_shutdown = shutdown.clone();
    tokio::select! {
        result = server => {
            result.context("server error")?;
            tracing::info!("gateway drained cleanly");
        }
        _ = async {
            grace_shutdown.wait_for_shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_secs = grace.as_secs(), "drain window expired, aborting open connections");
        }
    }

    sweeper.abort();
    tracing::info!("gateway exited");
    Ok(())
}

/// Validate configuration file and exit
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Summary:");
            println!("   • Listen address: {}", config.listen_addr);
            println!("   • Services: {}", config.services.len());
            println!("   • Request timeout: {}", config.request_timeout);
            println!("   • Rate limit: {} req burst, refill every {}",
                config.rate_limit.capacity, config.rate_limit.refill_interval);
            println!("   • Tracing enabled: {}", config.tracer.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("Common fixes:");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
            println!("   • Give every service either host+port or service_name");
            println!("   • Use duration strings with units (e.g., '10s', '5m')");
            println!("   • Every private route needs at least one allowed role");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Portico gateway configuration

# The address to listen on
listen_addr: "0.0.0.0:8080"

# Per-request deadline, upstream round trip included
request_timeout: "10s"

log:
  level: "info"
  format: "json"   # json | pretty

jwt:
  secret_key: "change-me"
  issuer: "auth-service"

rate_limit:
  capacity: 100
  refill_interval: "1s"
  cleanup_interval: "5m"
  idle_timeout: "10m"

cors:
  allow_origins: []
  allow_methods: []      # empty = GET, POST, PUT, DELETE, OPTIONS
  allow_headers: []      # empty = Origin, Content-Type, Authorization, X-Requested-With
  allow_credentials: false
  max_age_seconds: 0     # 0 = 12 hours

tracer:
  enabled: false
  service_name: "portico-gateway"

services:
  # Direct addressing
  - name: "user"
    prefix: "/user"
    host: "127.0.0.1"
    port: 8081
    public_paths: ["/register", "/login"]
    routes:
      - path: "/profile"
        methods: ["GET"]
        allowed_roles: ["user", "admin"]
      - path: "/users/:id"
        methods: ["GET", "DELETE"]
        allowed_roles: ["admin"]

  # Cluster DNS addressing: post-service.prod.svc.cluster.local:8080
  # - name: "post"
  #   prefix: "/post"
  #   service_name: "post-service"
  #   namespace: "prod"
  #   port: 8080
  #   routes:
  #     - path: "/posts"
  #       methods: ["POST"]
  #       allowed_roles: ["user", "admin"]
"#;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create config directory")?;
        }
    }
    tokio::fs::write(path, default_config)
        .await
        .context("failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'portico serve --config {config_path}' to start the gateway");
    Ok(())
}
