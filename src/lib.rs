//! Serve the working directory over HTTPS for browser debugging.
//!
//! Startup runs once: find the host's outbound address, make sure a
//! self-signed certificate exists, then serve files with caching disabled
//! until the process is killed.

pub mod cert;
pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod net;

use cert::{ensure_certificate, Certificate, OpensslCli};
use config::Config;
use error::ServeError;
use files::StaticFiles;
use http::Server;

pub fn run(config: &Config) -> Result<(), ServeError> {
    let ip = net::discover_local_ip(config.discovery_target)?;

    let paths = config.cert_paths();
    ensure_certificate(&paths, &OpensslCli::from(config));

    let certificate = Certificate::new(&paths)?;
    let files = StaticFiles::new(&config.document_root);
    let server = Server::create_https_server(config.listen_addr, certificate, files)?;

    println!("Open in Chrome: {}", config.browser_url(ip));

    server.start();
    Ok(())
}
