use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{config::Config, error::ServeError};

#[derive(Debug, Clone)]
pub struct CertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertPaths {
    pub fn new(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Self {
        Self {
            cert: cert.as_ref().to_path_buf(),
            key: key.as_ref().to_path_buf(),
        }
    }

    pub fn both_exist(&self) -> bool {
        self.cert.exists() && self.key.exists()
    }
}

/// Produces a certificate/key pair at the given paths.
///
/// Failure is deliberately not reported: a broken pair shows up when the
/// TLS server tries to load it.
pub trait CertGenerator {
    fn generate(&self, paths: &CertPaths);
}

/// Shells out to `openssl req` for an unencrypted self-signed certificate.
pub struct OpensslCli {
    pub program: String,
    pub subject: String,
    pub days: u32,
}

impl OpensslCli {
    pub fn args(&self, paths: &CertPaths) -> Vec<String> {
        vec![
            "req".to_string(),
            "-new".to_string(),
            "-x509".to_string(),
            "-keyout".to_string(),
            paths.key.display().to_string(),
            "-out".to_string(),
            paths.cert.display().to_string(),
            "-days".to_string(),
            self.days.to_string(),
            "-nodes".to_string(),
            "-subj".to_string(),
            self.subject.clone(),
        ]
    }
}

impl From<&Config> for OpensslCli {
    fn from(config: &Config) -> Self {
        Self {
            program: "openssl".to_string(),
            subject: config.cert_subject.clone(),
            days: config.cert_days,
        }
    }
}

impl CertGenerator for OpensslCli {
    fn generate(&self, paths: &CertPaths) {
        let output = Command::new(&self.program).args(self.args(paths)).output();

        match output {
            Ok(output) if output.status.success() => {
                tracing::debug!(program = %self.program, "certificate generated");
            }
            Ok(output) => {
                tracing::warn!(
                    program = %self.program,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "certificate generation exited unsuccessfully"
                );
            }
            Err(err) => {
                tracing::warn!(program = %self.program, error = %err, "could not run certificate tool");
            }
        }
    }
}

/// Generates a pair unless both files are already on disk. Returns whether
/// the generator ran.
pub fn ensure_certificate(paths: &CertPaths, generator: &dyn CertGenerator) -> bool {
    if paths.both_exist() {
        tracing::debug!(cert = %paths.cert.display(), key = %paths.key.display(), "reusing certificate");
        return false;
    }

    println!("Creating a self-signed certificate");
    generator.generate(paths);
    true
}

/// PEM bytes handed to the TLS layer untouched.
pub struct Certificate {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl Certificate {
    pub fn new(paths: &CertPaths) -> Result<Self, ServeError> {
        Ok(Self {
            cert: read_pem(&paths.cert)?,
            key: read_pem(&paths.key)?,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ServeError> {
    let read = |path: &Path| -> std::io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut pem = vec![];
        std::io::copy(&mut file, &mut pem)?;
        Ok(pem)
    };
    read(path).map_err(|source| ServeError::CertificateRead {
        path: path.to_path_buf(),
        source,
    })
}
