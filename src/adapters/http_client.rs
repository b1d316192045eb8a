use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Upstream HTTP client using Hyper with Rustls (HTTP/1.1, https upstreams
/// supported for services configured with `scheme: https`).
///
/// The client is deliberately transparent: apart from the `Host` header,
/// which is always rewritten to the target authority, the forwarded request
/// is sent exactly as the dispatcher built it. No retries, no caching.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        // The target authority becomes the Host header, replacing whatever
        // the client sent.
        let host_value = match (req.uri().host(), req.uri().port()) {
            (Some(host), Some(port)) => HeaderValue::from_str(&format!("{host}:{port}")),
            (Some(host), None) => HeaderValue::from_str(host),
            (None, _) => {
                return Err(HttpClientError::InvalidRequest(format!(
                    "forwarded URI has no host: {}",
                    req.uri()
                )));
            }
        }
        .map_err(|e| HttpClientError::InvalidRequest(format!("invalid target host: {e}")))?;
        req.headers_mut().insert(header::HOST, host_value);

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let outgoing_request = Request::from_parts(parts, body);

        let method = outgoing_request.method().clone();
        let uri = outgoing_request.uri().clone();

        match self.client.request(outgoing_request).await {
            Ok(response) => {
                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the server side; drop the
                // upstream's transfer encoding.
                parts.headers.remove(header::TRANSFER_ENCODING);
                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => Err(HttpClientError::ConnectionError(format!(
                "request to {method} {uri} failed: {e}"
            ))),
        }
    }
}
