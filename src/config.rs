//! Hard-coded startup settings.
//!
//! Nothing here is read from the command line, the environment or a file.
//! Tests build their own `Config` to use an ephemeral port and a scratch root.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use crate::cert::CertPaths;

pub const DEFAULT_LOG_FILTER: &str = "devserve=info";

pub const CERT_FILE: &str = "server-cert.pem";
pub const KEY_FILE: &str = "server-key.pem";
pub const CERT_SUBJECT: &str = "/C=US/ST=State/L=City/O=Organization/OU=Unit/CN=localhost";
pub const CERT_DAYS: u32 = 365;

pub const HTTPS_PORT: u16 = 443;
pub const LANDING_PAGE: &str = "/index.html?debug=vscode";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub document_root: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    /// Only used to learn the outbound source address; nothing is sent.
    pub discovery_target: SocketAddr,
    pub cert_subject: String,
    pub cert_days: u32,
    pub landing_page: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], HTTPS_PORT)),
            document_root: PathBuf::from("."),
            cert_file: PathBuf::from(CERT_FILE),
            key_file: PathBuf::from(KEY_FILE),
            discovery_target: SocketAddr::from(([8, 8, 8, 8], 80)),
            cert_subject: CERT_SUBJECT.to_string(),
            cert_days: CERT_DAYS,
            landing_page: LANDING_PAGE.to_string(),
        }
    }
}

impl Config {
    pub fn cert_paths(&self) -> CertPaths {
        CertPaths::new(&self.cert_file, &self.key_file)
    }

    /// URL to paste into the browser. The port is omitted when it is the
    /// HTTPS default.
    pub fn browser_url(&self, ip: IpAddr) -> String {
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        match self.listen_addr.port() {
            HTTPS_PORT => format!("https://{}{}", host, self.landing_page),
            port => format!("https://{}:{}{}", host, port, self.landing_page),
        }
    }
}
