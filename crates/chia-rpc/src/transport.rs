//! HTTPS JSON-RPC transport with mutual TLS.
//!
//! Chia services only accept clients presenting a certificate signed by the
//! node's private CA, and present certificates from that same CA. Those
//! certificates are issued for a fixed name rather than the host they run
//! on, so the server certificate is verified against the private CA under
//! that fixed name, whatever address was dialled.
//!
//! One [`RpcClient`] owns one HTTP/1.1 connection. Calls are serialised over
//! it; the connection driver runs on a background task that is aborted on
//! [`RpcClient::close`] or drop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{BackendEndpoint, TlsPaths};
use crate::error::{RpcError, RpcResult};

/// Name every Chia service certificate is issued for.
const CERTIFICATE_NAME: &str = "chia.net";

const CLIENT_USER_AGENT: &str = concat!("chia-exporter/", env!("CARGO_PKG_VERSION"));

// ── TLS identity ─────────────────────────────────────────────────────

/// Client TLS configuration: our certificate plus the node's private CA.
#[derive(Clone)]
pub struct TlsIdentity {
    client_config: Arc<rustls::ClientConfig>,
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity").finish_non_exhaustive()
    }
}

impl TlsIdentity {
    /// Load the PEM files named by `paths`.
    pub fn load(paths: &TlsPaths) -> RpcResult<Self> {
        Self::from_pem(
            &read_pem(&paths.ca_crt)?,
            &read_pem(&paths.client_crt)?,
            &read_pem(&paths.client_key)?,
        )
    }

    /// Build from in-memory PEM data.
    pub fn from_pem(ca_pem: &[u8], cert_pem: &[u8], key_pem: &[u8]) -> RpcResult<Self> {
        let ca = parse_certs(ca_pem, "private CA")?;
        let chain = parse_certs(cert_pem, "client certificate")?;
        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| RpcError::Tls(format!("client key: {e}")))?
            .ok_or_else(|| RpcError::Tls("client key: no private key found".to_string()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = rustls::RootCertStore::empty();
        for cert in ca {
            roots
                .add(cert)
                .map_err(|e| RpcError::Tls(format!("private CA: {e}")))?;
        }
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| RpcError::Tls(format!("server verifier: {e}")))?;

        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| RpcError::Tls(format!("protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PrivateCaVerifier { inner: webpki }))
            .with_client_auth_cert(chain, key)
            .map_err(|e| RpcError::Tls(format!("client certificate: {e}")))?;

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    fn connector(&self) -> tokio_rustls::TlsConnector {
        tokio_rustls::TlsConnector::from(self.client_config.clone())
    }
}

fn read_pem(path: &Path) -> RpcResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| RpcError::Tls(format!("{}: {e}", path.display())))
}

fn parse_certs(pem: &[u8], what: &str) -> RpcResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RpcError::Tls(format!("{what}: {e}")))?;
    if certs.is_empty() {
        return Err(RpcError::Tls(format!("{what}: no certificate found")));
    }
    Ok(certs)
}

/// Verifies the server chain against the private CA under [`CERTIFICATE_NAME`].
#[derive(Debug)]
struct PrivateCaVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for PrivateCaVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let name = ServerName::try_from(CERTIFICATE_NAME)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        self.inner
            .verify_server_cert(end_entity, intermediates, &name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

// ── RpcClient ────────────────────────────────────────────────────────

/// An open RPC session to one backend service.
pub struct RpcClient {
    authority: String,
    sender: Mutex<SendRequest<Full<Bytes>>>,
    driver: JoinHandle<()>,
    timeout: Duration,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    /// Open a TLS session to `endpoint` and complete the HTTP/1.1 handshake.
    ///
    /// Every stage is bounded by `timeout`; any failure is
    /// [`RpcError::Connect`].
    pub async fn connect(
        endpoint: &BackendEndpoint,
        tls: &TlsIdentity,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let authority = endpoint.authority();
        let connect_err = |reason: String| RpcError::Connect {
            address: authority.clone(),
            reason,
        };

        let handshake = async {
            let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(|e| connect_err(format!("tcp: {e}")))?;
            let _ = tcp.set_nodelay(true);

            let server_name = ServerName::try_from(endpoint.host.clone())
                .map_err(|e| connect_err(format!("invalid host name: {e}")))?;
            let stream = tls
                .connector()
                .connect(server_name, tcp)
                .await
                .map_err(|e| connect_err(format!("tls: {e}")))?;

            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| connect_err(format!("http handshake: {e}")))
        };

        let (sender, conn) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| connect_err("timed out".to_string()))??;

        // Drive the connection in the background.
        let driver_authority = authority.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(authority = %driver_authority, error = %e, "rpc connection closed with error");
            }
        });

        debug!(service = %endpoint.service, %authority, "rpc connection established");

        Ok(Self {
            authority,
            sender: Mutex::new(sender),
            driver,
            timeout,
        })
    }

    /// `POST /<endpoint>` with a JSON body and decode the response envelope.
    pub async fn call<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> RpcResult<T> {
        let transport_err = |reason: String| RpcError::Transport {
            endpoint: endpoint.to_string(),
            reason,
        };

        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/{endpoint}"))
            .header(HOST, &self.authority)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .body(Full::new(Bytes::from(body.to_string())))
            .map_err(|e| transport_err(e.to_string()))?;

        let exchange = async {
            let mut sender = self.sender.lock().await;
            sender.ready().await?;
            let resp = sender.send_request(req).await?;
            let status = resp.status();
            let bytes = resp.into_body().collect().await?.to_bytes();
            Ok::<_, hyper::Error>((status, bytes))
        };

        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout {
                endpoint: endpoint.to_string(),
            })?
            .map_err(|e| transport_err(e.to_string()))?;

        if !status.is_success() {
            return Err(RpcError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(authority = %self.authority, %endpoint, bytes = bytes.len(), "rpc call completed");
        decode_envelope(endpoint, &bytes)
    }

    /// Tear down the connection. Safe to call more than once.
    pub fn close(&self) {
        self.driver.abort();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Success flag and error message shared by every Chia RPC response.
#[derive(Deserialize)]
struct Envelope {
    success: Option<bool>,
    #[serde(default)]
    error: Option<Value>,
}

/// Decode a Chia RPC response body.
///
/// Every response is a JSON object carrying a `success` flag; failures put
/// a human-readable message under `error`. The payload is decoded straight
/// from the bytes so 128-bit integers survive.
pub fn decode_envelope<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> RpcResult<T> {
    let decode_err = |reason: String| RpcError::Decode {
        endpoint: endpoint.to_string(),
        reason,
    };

    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| decode_err(e.to_string()))?;
    match envelope.success {
        Some(true) => {}
        Some(false) => {
            let message = envelope
                .error
                .as_ref()
                .and_then(Value::as_str)
                .unwrap_or("no error message")
                .to_string();
            return Err(RpcError::Rejected {
                endpoint: endpoint.to_string(),
                message,
            });
        }
        None => return Err(decode_err("missing success flag".to_string())),
    }
    serde_json::from_slice(body).map_err(|e| decode_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Service;
    use crate::types::HeightInfoResponse;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use std::path::PathBuf;

    struct TestPki {
        ca_pem: String,
        server_cert: CertificateDer<'static>,
        server_key: Vec<u8>,
        client_cert_pem: String,
        client_key_pem: String,
        ca_der: CertificateDer<'static>,
    }

    fn test_pki(server_name: &str) -> TestPki {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let server_cert = CertificateParams::new(vec![server_name.to_string()])
            .unwrap()
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let client_key = KeyPair::generate().unwrap();
        let client_cert = CertificateParams::new(vec![CERTIFICATE_NAME.to_string()])
            .unwrap()
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        TestPki {
            ca_pem: ca_cert.pem(),
            ca_der: ca_cert.der().clone(),
            server_cert: server_cert.der().clone(),
            server_key: server_key.serialize_der(),
            client_cert_pem: client_cert.pem(),
            client_key_pem: client_key.serialize_pem(),
        }
    }

    /// Serve canned Chia RPC responses over mutual TLS on a loopback port.
    async fn serve_once(pki: &TestPki) -> u16 {
        use hyper::body::Incoming;
        use hyper::service::service_fn;
        use rustls::server::WebPkiClientVerifier;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = rustls::RootCertStore::empty();
        roots.add(pki.ca_der.clone()).unwrap();
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .unwrap();
        let server_config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(
                vec![pki.server_cert.clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.server_key.clone())),
            )
            .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let Ok(tls) = acceptor.accept(tcp).await else {
                return;
            };
            let service = service_fn(|req: Request<Incoming>| async move {
                let body = match req.uri().path() {
                    "/get_height_info" => r#"{"success": true, "height": 5120000}"#,
                    _ => r#"{"success": false, "error": "unknown endpoint"}"#,
                };
                Ok::<_, hyper::Error>(hyper::Response::new(Full::new(Bytes::from(body))))
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(tls), service)
                .await;
        });

        port
    }

    fn loopback_endpoint(port: u16) -> BackendEndpoint {
        BackendEndpoint {
            service: Service::Wallet,
            host: "127.0.0.1".to_string(),
            port,
            tls: TlsPaths {
                ca_crt: PathBuf::from("/unused/ca.crt"),
                client_crt: PathBuf::from("/unused/client.crt"),
                client_key: PathBuf::from("/unused/client.key"),
            },
        }
    }

    #[test]
    fn identity_from_generated_pem() {
        let pki = test_pki(CERTIFICATE_NAME);
        TlsIdentity::from_pem(
            pki.ca_pem.as_bytes(),
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
        )
        .unwrap();
    }

    #[test]
    fn identity_rejects_missing_key() {
        let pki = test_pki(CERTIFICATE_NAME);
        let err = TlsIdentity::from_pem(
            pki.ca_pem.as_bytes(),
            pki.client_cert_pem.as_bytes(),
            b"not a key",
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::Tls(msg) if msg.contains("client key")));
    }

    #[test]
    fn identity_rejects_empty_ca() {
        let pki = test_pki(CERTIFICATE_NAME);
        let err = TlsIdentity::from_pem(
            b"",
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::Tls(msg) if msg.contains("private CA")));
    }

    #[test]
    fn identity_load_reads_files() {
        let pki = test_pki(CERTIFICATE_NAME);
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths {
            ca_crt: dir.path().join("private_ca.crt"),
            client_crt: dir.path().join("private_daemon.crt"),
            client_key: dir.path().join("private_daemon.key"),
        };
        std::fs::write(&paths.ca_crt, &pki.ca_pem).unwrap();
        std::fs::write(&paths.client_crt, &pki.client_cert_pem).unwrap();
        std::fs::write(&paths.client_key, &pki.client_key_pem).unwrap();

        TlsIdentity::load(&paths).unwrap();

        std::fs::remove_file(&paths.client_key).unwrap();
        assert!(matches!(TlsIdentity::load(&paths), Err(RpcError::Tls(_))));
    }

    #[tokio::test]
    async fn call_over_mutual_tls() {
        let pki = test_pki(CERTIFICATE_NAME);
        let port = serve_once(&pki).await;
        let identity = TlsIdentity::from_pem(
            pki.ca_pem.as_bytes(),
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
        )
        .unwrap();

        let client = RpcClient::connect(&loopback_endpoint(port), &identity, Duration::from_secs(5))
            .await
            .unwrap();

        let info: HeightInfoResponse = client
            .call("get_height_info", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(info.height, 5_120_000);

        let err = client
            .call::<HeightInfoResponse>("get_nothing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Rejected { message, .. } if message == "unknown endpoint"));

        client.close();
        client.close();
    }

    #[tokio::test]
    async fn server_certificate_for_other_name_is_rejected() {
        let pki = test_pki("not-chia.example");
        let port = serve_once(&pki).await;
        let identity = TlsIdentity::from_pem(
            pki.ca_pem.as_bytes(),
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
        )
        .unwrap();

        let err = RpcClient::connect(&loopback_endpoint(port), &identity, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Connect { reason, .. } if reason.starts_with("tls")));
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let pki = test_pki(CERTIFICATE_NAME);
        let identity = TlsIdentity::from_pem(
            pki.ca_pem.as_bytes(),
            pki.client_cert_pem.as_bytes(),
            pki.client_key_pem.as_bytes(),
        )
        .unwrap();

        let err = RpcClient::connect(&loopback_endpoint(port), &identity, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Connect { address, .. } if address == format!("127.0.0.1:{port}")));
    }

    #[test]
    fn envelope_success_decodes_payload() {
        let info: HeightInfoResponse =
            decode_envelope("get_height_info", br#"{"success": true, "height": 42}"#).unwrap();
        assert_eq!(info.height, 42);
    }

    #[test]
    fn envelope_failure_is_rejected() {
        let err = decode_envelope::<HeightInfoResponse>(
            "get_wallet_balance",
            br#"{"success": false, "error": "wallet id 9 not found"}"#,
        )
        .unwrap_err();
        match err {
            RpcError::Rejected { endpoint, message } => {
                assert_eq!(endpoint, "get_wallet_balance");
                assert_eq!(message, "wallet id 9 not found");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn envelope_without_flag_or_fields_is_decode_error() {
        assert!(matches!(
            decode_envelope::<HeightInfoResponse>("get_height_info", br#"{"height": 1}"#),
            Err(RpcError::Decode { .. })
        ));
        assert!(matches!(
            decode_envelope::<HeightInfoResponse>("get_height_info", br#"{"success": true}"#),
            Err(RpcError::Decode { .. })
        ));
        assert!(matches!(
            decode_envelope::<HeightInfoResponse>("get_height_info", b"<html>"),
            Err(RpcError::Decode { .. })
        ));
    }
}
