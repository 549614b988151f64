//! `locshared` - CLI for locshare
//!
//! Runs the location sharing service and inspects its configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use locshare::cli::{Cli, Command, ConfigCommand, ServeCommand};
use locshare::{init_logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match cli.command {
        Command::Serve(serve_cmd) => {
            let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
            handle_serve(config, serve_cmd).await
        }
        Command::Config(config_cmd) => handle_config(cli.config.clone(), config_cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate().context("invalid command-line overrides")?;

    locshare::server::serve(config).await?;
    Ok(())
}

fn handle_config(path: Option<std::path::PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.listen_addr()?);
                println!();
                println!("[URLs]");
                println!("  Viewer URL:         {}", config.urls.viewer_url);
                println!(
                    "  Backend URL:        {}",
                    config
                        .urls
                        .backend_url
                        .as_deref()
                        .unwrap_or("(derived from each request)")
                );
                println!();
                println!("[Artifact]");
                println!("  Header image:       {}", config.asset_path().display());
                println!("  Image MIME type:    {}", config.artifact.asset_mime);
                println!("  Inline limit:       {}", config.artifact.inline_limit);
                println!();
                println!("[History]");
                println!("  Samples per link:   {}", config.history.capacity);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
