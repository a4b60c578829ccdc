//! tchatd — the TchatsApp relay server.
//!
//! Configuration comes from the environment:
//!   TCHATSAPP_PORT       listening port (default 1666)
//!   TCHATSAPP_LOG_LEVEL  log filter (default "info"), RUST_LOG also works
//!
//! Exit codes: 0 normal, 1 startup failure (port bind), 2 fatal internal
//! error.

use tchat_server::{Server, ServerConfig};

fn init_logging() {
    let filter = std::env::var("TCHATSAPP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let config = ServerConfig::from_env();

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("tchatd: cannot bind port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        eprintln!("tchatd: fatal: {e}");
        std::process::exit(2);
    }
}
