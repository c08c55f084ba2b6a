//! intercom-bridge binary entry point.

use intercom_bridge::cli::{commands, Cli, Commands};
use intercom_bridge::config::BridgeConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let config = match BridgeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => commands::handle_serve(&config).await,
        Commands::List(args) => commands::handle_list(&config, args.per_page).await,
        Commands::Reply(args) => {
            commands::handle_reply(&config, &args.conversation_id, &args.text).await
        }
        Commands::Close(args) => {
            commands::handle_close(&config, &args.conversation_id, args.message.as_deref()).await
        }
        Commands::Chat(args) => commands::handle_chat(&config, &args.external_id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
