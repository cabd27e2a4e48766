//! Web server command.

use console::style;

use crate::config::{Config, Settings, DEFAULT_PORT};

/// Start the web server.
pub async fn cmd_serve(settings: &Settings, config: &Config, bind: Option<&str>) -> anyhow::Result<()> {
    let (host, port) = match bind {
        Some(bind) => parse_bind_address(bind, &config.server.host, config.server.port),
        None => (config.server.host.clone(), config.server.port),
    };

    println!(
        "{} Starting clauseguard server at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Data directory: {}", style(settings.data_dir.display()).dim());
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, config, &host, port).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> default host
/// - Just a host: "0.0.0.0" -> default port
/// - Host and port: "0.0.0.0:3030"
fn parse_bind_address(bind: &str, default_host: &str, default_port: u16) -> (String, u16) {
    if let Ok(port) = bind.parse::<u16>() {
        return (default_host.to_string(), port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    let port = if default_port == 0 { DEFAULT_PORT } else { default_port };
    (bind.to_string(), port)
}
