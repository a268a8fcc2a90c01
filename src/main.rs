mod cli;

use mediamill::{config, conversion, quality, server, state};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // CLI overrides take precedence over the config file
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting mediamill server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    std::fs::create_dir_all(&config.conversion.uploads_dir)?;
    std::fs::create_dir_all(&config.conversion.output_dir)?;

    let settings = conversion::EncoderSettings {
        ffmpeg_path: config.conversion.ffmpeg_path.clone(),
        exiftool_path: config.conversion.exiftool_path.clone(),
        copy_metadata: config.conversion.copy_metadata,
    };
    for tool in conversion::check_tools(&settings) {
        if tool.available {
            tracing::info!("Found {}: {:?}", tool.name, tool.path);
        } else {
            tracing::warn!("{} not found; conversions may fail", tool.name);
        }
    }

    let store = state::ConversionStore::new();
    let pool = Arc::new(conversion::WorkerPool::new(
        config.conversion.workers,
        Arc::clone(&store),
        settings,
    ));
    pool.start();

    let ctx = server::AppContext {
        store,
        pool: Arc::clone(&pool),
        config: Arc::new(config),
    };

    let server_result = server::start_server(ctx).await;

    tracing::info!("Shutting down...");
    pool.stop().await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediamill=trace,tower_http=debug".to_string()
        } else {
            "mediamill=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Qualities => {
            for q in quality::available_quality_settings() {
                println!("{:<10} preset={:<10} crf={}", q.name, q.preset, q.crf);
            }
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate(path.as_deref())
        }
        Commands::Version => {
            println!("mediamill {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let settings = conversion::EncoderSettings {
        ffmpeg_path: config.conversion.ffmpeg_path.clone(),
        exiftool_path: config.conversion.exiftool_path.clone(),
        copy_metadata: config.conversion.copy_metadata,
    };

    let mut all_found = true;
    for tool in conversion::check_tools(&settings) {
        match tool.path {
            Some(path) => println!("{:<10} {}", tool.name, path.display()),
            None => {
                println!("{:<10} NOT FOUND", tool.name);
                all_found = false;
            }
        }
    }

    if all_found {
        Ok(())
    } else {
        anyhow::bail!("Some required tools are missing")
    }
}

fn validate(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    config::validate_config(&config)?;
    println!("Configuration is valid");
    println!(
        "  server: {}:{}",
        config.server.host, config.server.port
    );
    println!("  workers: {}", config.conversion.workers);
    println!("  uploads: {:?}", config.conversion.uploads_dir);
    println!("  output: {:?}", config.conversion.output_dir);
    Ok(())
}
