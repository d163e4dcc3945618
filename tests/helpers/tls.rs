use boring::pkey::PKey;
use boring::ssl::{SslAcceptor, SslMethod};
use boring::x509::X509;

/// Server-side TLS material for a loopback test server.
pub struct TestTls {
    pub acceptor: SslAcceptor,
    /// PEM of the self-signed leaf; clients add it as a root.
    pub ca_pem: Vec<u8>,
}

/// Self-signed certificate valid for `127.0.0.1` and `localhost`.
pub fn loopback_tls() -> TestTls {
    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let cert = rcgen::generate_simple_self_signed(names).expect("generate cert");
    let cert_pem = cert.cert.pem();
    let key_pem = cert.signing_key.serialize_pem();

    let pkey = PKey::private_key_from_pem(key_pem.as_bytes()).expect("parse key");
    let x509 = X509::from_pem(cert_pem.as_bytes()).expect("parse cert");

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).expect("acceptor");
    builder.set_private_key(&pkey).expect("set key");
    builder.set_certificate(&x509).expect("set cert");

    TestTls {
        acceptor: builder.build(),
        ca_pem: cert_pem.into_bytes(),
    }
}
