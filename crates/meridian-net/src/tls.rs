//! Peer certificate verification: SAN/CN match against a configured
//! `tls_name`, plus a serial-number revocation list (§4.2).
//!
//! The teacher's TLS module (`warpgrid-cluster::tls`) only *issues*
//! certificates with `rcgen`; it has no verifier, so this is new logic
//! built on `x509-parser` over the same `rustls` foundation.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

/// Verifies that the peer certificate's SAN (or CN, if no SAN entries
/// exist) contains the node's configured TLS name, and that its serial
/// number is not in the revocation list.
pub struct NameAndRevocationVerifier {
    expected_name: String,
    revoked_serials: HashSet<Vec<u8>>,
    inner: Arc<rustls::crypto::CryptoProvider>,
}

impl fmt::Debug for NameAndRevocationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameAndRevocationVerifier")
            .field("expected_name", &self.expected_name)
            .field("revoked_serials", &self.revoked_serials.len())
            .finish()
    }
}

impl NameAndRevocationVerifier {
    pub fn new(expected_name: impl Into<String>, revoked_serials: HashSet<Vec<u8>>) -> Self {
        Self {
            expected_name: expected_name.into(),
            revoked_serials,
            inner: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    fn check_cert(&self, cert_der: &[u8]) -> Result<(), TlsError> {
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| TlsError::General(format!("malformed peer certificate: {e}")))?;

        if self.revoked_serials.contains(&cert.raw_serial().to_vec()) {
            return Err(TlsError::General(format!(
                "peer certificate serial {} is revoked",
                cert.raw_serial_as_string()
            )));
        }

        if !names_match(&cert, &self.expected_name) {
            return Err(TlsError::General(format!(
                "peer certificate does not match expected tls_name '{}'",
                self.expected_name
            )));
        }

        Ok(())
    }
}

/// Check the certificate's SAN list (DNS names and IP addresses) for a
/// match against `expected`; fall back to the CN only when the
/// certificate carries no SAN extension at all.
fn names_match(cert: &X509Certificate<'_>, expected: &str) -> bool {
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        let mut saw_any = false;
        for name in &san.value.general_names {
            saw_any = true;
            match name {
                GeneralName::DNSName(dns) if *dns == expected => return true,
                GeneralName::IPAddress(ip) if ip_matches(ip, expected) => return true,
                _ => {}
            }
        }
        if saw_any {
            return false;
        }
    }
    cert.subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .any(|cn| cn == expected)
}

fn ip_matches(der_ip: &[u8], expected: &str) -> bool {
    match der_ip.len() {
        4 => std::net::Ipv4Addr::new(der_ip[0], der_ip[1], der_ip[2], der_ip[3])
            .to_string()
            .eq(expected),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(der_ip);
            std::net::Ipv6Addr::from(octets).to_string().eq(expected)
        }
        _ => false,
    }
}

impl ServerCertVerifier for NameAndRevocationVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        self.check_cert(end_entity.as_ref())?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.inner.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.inner.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_matches_ipv4() {
        assert!(ip_matches(&[10, 0, 0, 1], "10.0.0.1"));
        assert!(!ip_matches(&[10, 0, 0, 1], "10.0.0.2"));
    }

    #[test]
    fn verifier_rejects_revoked_serial_before_parsing_names() {
        let mut revoked = HashSet::new();
        revoked.insert(vec![1, 2, 3]);
        let verifier = NameAndRevocationVerifier::new("node1.meridian.local", revoked);
        // A malformed cert still exercises the DER-parse error path; the
        // point of this test is that check_cert never panics on bad input.
        assert!(verifier.check_cert(&[0, 1, 2]).is_err());
    }
}
