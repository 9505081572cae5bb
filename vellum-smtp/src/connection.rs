use std::{fmt::Write, fs::File, io::BufReader, sync::Arc};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ProtocolVersion, ServerConfig, ServerConnection, SupportedCipherSuite,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    server::TlsStream,
};
use vellum_tracing::traced;

use crate::{
    config::TlsContext,
    error::{ConnectionError, ConnectionResult, TlsError, TlsResult},
};

#[derive(Debug)]
pub struct TlsInfo {
    version: ProtocolVersion,
    ciphers: SupportedCipherSuite,
}

impl TlsInfo {
    fn of(conn: &ServerConnection) -> TlsResult<Self> {
        Ok(Self {
            version: conn
                .protocol_version()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("protocol version".to_string()))?,
            ciphers: conn
                .negotiated_cipher_suite()
                .ok_or_else(|| TlsError::ProtocolInfoMissing("cipher suite".to_string()))?,
        })
    }

    #[must_use]
    pub fn proto(&self) -> String {
        self.version.as_str().unwrap_or_default().to_string()
    }

    #[must_use]
    pub fn cipher(&self) -> String {
        self.ciphers.suite().as_str().unwrap_or_default().to_string()
    }
}

const BUFFER_SIZE: usize = 8192;

/// Maximum accepted SMTP command line length, per RFC 5321 Section 4.5.3.1.4.
pub const DEFAULT_LINE_LENGTH_LIMIT: usize = 1001;

struct LineBuffer {
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            len: 0,
        }
    }
}

pub enum Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    Plain { stream: Stream, line: LineBuffer },
    Tls { stream: Box<TlsStream<Stream>>, line: LineBuffer },
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub fn plain(stream: Stream) -> Self {
        Self::Plain {
            stream,
            line: LineBuffer::new(),
        }
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    pub(crate) async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        response: &S,
    ) -> ConnectionResult<usize> {
        let mut buffer = arrayvec::ArrayString::<512>::new();
        write!(&mut buffer, "{response}\r\n")?;

        Ok(match self {
            Self::Plain { stream, .. } => stream.write_all(buffer.as_bytes()).await.map(|()| buffer.len())?,
            Self::Tls { stream, .. } => stream.write_all(buffer.as_bytes()).await.map(|()| buffer.len())?,
        })
    }

    /// Read raw bytes into `buf`, buffering reads from the underlying socket in
    /// `BUFFER_SIZE` chunks to reduce syscalls.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    pub(crate) async fn receive(&mut self, buf: &mut [u8]) -> ConnectionResult<usize> {
        match self {
            Self::Plain { stream, line } => Self::receive_buffered(stream, line, buf).await,
            Self::Tls { stream, line } => Self::receive_buffered(stream, line, buf).await,
        }
    }

    async fn receive_buffered<S: AsyncRead + Unpin>(
        stream: &mut S,
        line: &mut LineBuffer,
        buf: &mut [u8],
    ) -> ConnectionResult<usize> {
        if line.pos < line.len {
            let available = line.len - line.pos;
            let to_copy = available.min(buf.len());
            buf[..to_copy].copy_from_slice(&line.buf[line.pos..line.pos + to_copy]);
            line.pos += to_copy;
            return Ok(to_copy);
        }

        if line.buf.is_empty() {
            line.buf.resize(BUFFER_SIZE, 0);
        }

        let bytes_read = stream.read(&mut line.buf).await?;
        line.pos = 0;
        line.len = bytes_read;

        let to_copy = bytes_read.min(buf.len());
        buf[..to_copy].copy_from_slice(&line.buf[..to_copy]);
        line.pos = to_copy;
        Ok(to_copy)
    }

    /// Read a single CRLF-terminated command line, bounded by `limit` octets.
    ///
    /// Returns `Ok(None)` on clean EOF before any bytes were read.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    pub(crate) async fn receive_line(&mut self, limit: usize) -> ConnectionResult<Option<String>> {
        let mut out = Vec::new();
        let mut chunk = [0_u8; 1];

        loop {
            let n = self.receive(&mut chunk).await?;
            if n == 0 {
                return Ok(if out.is_empty() { None } else { Some(line_to_string(out)) });
            }

            if out.len() >= limit {
                return Err(ConnectionError::LineTooLong);
            }

            out.push(chunk[0]);
            if out.ends_with(b"\r\n") {
                return Ok(Some(line_to_string(out)));
            }
        }
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    fn load_certs<P: AsRef<std::path::Path>>(path: &P) -> std::io::Result<Vec<CertificateDer<'static>>> {
        rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    fn load_keys<P: AsRef<std::path::Path>>(path: &P) -> TlsResult<PrivateKeyDer<'static>> {
        let path_str = path.as_ref().display().to_string();
        let mut reader = BufReader::new(File::open(path).map_err(|e| TlsError::KeyLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })?);

        match rustls_pemfile::read_one(&mut reader).map_err(|e| TlsError::KeyLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
            _ => Err(TlsError::KeyLoad {
                path: path_str,
                reason: "unable to determine key file format (expected PKCS1, PKCS8, or SEC1)".to_string(),
            }),
        }
    }

    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    pub(crate) async fn upgrade(self, tls_context: &TlsContext) -> TlsResult<(Self, TlsInfo)> {
        let certs = Self::load_certs(&tls_context.certificate).map_err(|e| TlsError::CertificateLoad {
            path: tls_context.certificate.display().to_string(),
            source: e,
        })?;
        let keys = Self::load_keys(&tls_context.key)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, keys)?;

        let acceptor = TlsAcceptor::from(Arc::new(config));

        Ok(match self {
            Self::Plain { stream, line } => {
                let stream = acceptor.accept(stream).await?;
                let info = TlsInfo::of(stream.get_ref().1)?;
                (
                    Self::Tls {
                        stream: Box::new(stream),
                        line,
                    },
                    info,
                )
            }
            Self::Tls { stream, line } => {
                let (stream, connection) = acceptor.accept(stream).await?.into_inner();
                let info = TlsInfo::of(&connection)?;
                (Self::Tls { stream, line }, info)
            }
        })
    }
}

fn line_to_string(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
