use std::{
    io::{self, Cursor, Read},
    net::SocketAddr,
};

use html_escape::encode_text;
use tiny_http::{Header, Request, Response, ResponseBox, SslConfig, StatusCode};

use crate::{cert::Certificate, error::ServeError, files::StaticFiles};

pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-store, no-cache, must-revalidate, max-age=0"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// HTTPS file server answering one request at a time.
pub struct Server {
    server: tiny_http::Server,
    files: StaticFiles,
}

impl Server {
    pub fn create_https_server(
        addr: SocketAddr,
        certificate: Certificate,
        files: StaticFiles,
    ) -> Result<Self, ServeError> {
        let server = tiny_http::Server::https(
            addr,
            SslConfig {
                certificate: certificate.cert,
                private_key: certificate.key,
            },
        )
        .map_err(ServeError::Bind)?;

        tracing::info!(addr = %server.server_addr(), root = %files.root().display(), "serving");
        Ok(Self { server, files })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.server_addr()
    }

    /// Serves until the process is killed.
    pub fn start(&self) {
        for request in self.server.incoming_requests() {
            self.handle(request);
        }
    }

    fn handle(&self, request: Request) {
        let mut reply = self
            .files
            .reply(request.method(), request.url(), request.headers());
        reply.disable_caching();

        tracing::info!(
            method = %request.method(),
            url = %request.url(),
            status = reply.status_code,
            peer = %request.remote_addr(),
            "request"
        );

        if let Err(err) = request.respond(reply.into_response()) {
            tracing::warn!(error = %err, "failed to write response");
        }
    }
}

pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    Stream {
        reader: Box<dyn Read + Send>,
        len: usize,
    },
}

/// A response being assembled before it is handed to the connection.
pub struct Reply {
    pub status_code: u16,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Reply {
    pub fn new(status_code: u16) -> Self {
        Reply {
            status_code,
            headers: vec![],
            body: Body::Empty,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        let body = format!(
            "<!DOCTYPE HTML>\n\
             <html lang=\"en\">\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <title>Error response</title>\n\
             </head>\n\
             <body>\n\
             <h1>Error response</h1>\n\
             <p>Error code: {code}</p>\n\
             <p>Message: {message}.</p>\n\
             <p>Error code explanation: {code} - {reason}.</p>\n\
             </body>\n\
             </html>\n",
            code = status_code,
            message = encode_text(message),
            reason = StatusCode(status_code).default_reason_phrase(),
        );
        Reply::new(status_code)
            .with_header("Content-Type", "text/html;charset=utf-8")
            .with_body(Body::Bytes(body.into_bytes()))
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn disable_caching(&mut self) {
        for (name, value) in NO_CACHE_HEADERS.iter() {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    pub fn into_response(self) -> ResponseBox {
        let headers = self
            .headers
            .iter()
            .filter_map(
                |(name, value)| match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                    Ok(header) => Some(header),
                    Err(()) => {
                        tracing::warn!(%name, "dropping non-ascii header");
                        None
                    }
                },
            )
            .collect();

        let (reader, len): (Box<dyn Read + Send>, usize) = match self.body {
            Body::Empty => (Box::new(io::empty()), 0),
            Body::Bytes(bytes) => {
                let len = bytes.len();
                (Box::new(Cursor::new(bytes)), len)
            }
            Body::Stream { reader, len } => (reader, len),
        };

        Response::new(StatusCode(self.status_code), headers, reader, Some(len), None)
    }

    #[cfg(test)]
    pub(crate) fn read_body(self) -> io::Result<Vec<u8>> {
        let mut buf = vec![];
        match self.body {
            Body::Empty => {}
            Body::Bytes(bytes) => buf = bytes,
            Body::Stream { mut reader, .. } => {
                reader.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }
}
