//! Reseed Signer Certificates
//!
//! Reseed hosts publish PEM X.509 certificates. The PEM armor is
//! stripped, the body base64-decoded and the outer X.509 structure
//! traversed: version and serial are surfaced, the remaining fields are
//! walked and skipped. The parsed key is not yet wired into archive
//! signature checking.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cursor::ByteCursor;
use crate::errors::{ReseedError, ReseedResult};

const CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const CERTIFICATE_FOOTER: &str = "-----END CERTIFICATE-----";

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;
const DER_CONTEXT_0: u8 = 0xA0;

/// Fields surfaced from a parsed certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// X.509 version field (0-based, so v3 reads as 2)
    pub version: u32,
    /// Serial number, big-endian
    pub serial: Vec<u8>,
}

/// Parse a PEM-armored X.509 certificate
pub fn parse_certificate(pem: &str) -> ReseedResult<CertificateInfo> {
    let start = pem
        .find(CERTIFICATE_HEADER)
        .ok_or_else(|| ReseedError::MalformedCertificate("missing PEM header".into()))?;
    let end = pem
        .find(CERTIFICATE_FOOTER)
        .ok_or_else(|| ReseedError::MalformedCertificate("missing PEM footer".into()))?;
    let body: String = pem[start + CERTIFICATE_HEADER.len()..end]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    // regular base64, not the transport alphabet
    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| ReseedError::MalformedCertificate(format!("bad base64: {}", e)))?;
    parse_der(&der)
}

/// Load and parse a PEM certificate file
pub fn load_certificate(path: &std::path::Path) -> ReseedResult<CertificateInfo> {
    let pem = std::fs::read_to_string(path)?;
    parse_certificate(&pem)
}

fn read_tlv<'a>(cur: &mut ByteCursor<'a>) -> ReseedResult<(u8, &'a [u8])> {
    let tag = cur.u8()?;
    let first = cur.u8()?;
    let len = if first & 0x80 == 0 {
        first as usize
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(ReseedError::MalformedCertificate(
                "unsupported DER length".into(),
            ));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | cur.u8()? as usize;
        }
        len
    };
    Ok((tag, cur.take(len)?))
}

fn expect_tlv<'a>(cur: &mut ByteCursor<'a>, expected: u8, what: &str) -> ReseedResult<&'a [u8]> {
    let (tag, body) = read_tlv(cur)?;
    if tag != expected {
        return Err(ReseedError::MalformedCertificate(format!(
            "expected {} (tag 0x{:02x}), found tag 0x{:02x}",
            what, expected, tag
        )));
    }
    Ok(body)
}

fn parse_der(der: &[u8]) -> ReseedResult<CertificateInfo> {
    let mut outer = ByteCursor::new(der);
    let cert_body = expect_tlv(&mut outer, DER_SEQUENCE, "certificate")?;
    let mut cert = ByteCursor::new(cert_body);
    let tbs_body = expect_tlv(&mut cert, DER_SEQUENCE, "tbsCertificate")?;
    let mut tbs = ByteCursor::new(tbs_body);

    // version: context tag [0] wrapping an INTEGER
    let version_body = expect_tlv(&mut tbs, DER_CONTEXT_0, "version")?;
    let mut version_cur = ByteCursor::new(version_body);
    let version_bytes = expect_tlv(&mut version_cur, DER_INTEGER, "version integer")?;
    if version_bytes.len() > 4 {
        return Err(ReseedError::MalformedCertificate(
            "oversized version integer".into(),
        ));
    }
    let mut version = 0u32;
    for byte in version_bytes {
        version = (version << 8) | *byte as u32;
    }

    // serial
    let serial = expect_tlv(&mut tbs, DER_INTEGER, "serial")?.to_vec();

    // signature algorithm, issuer, validity, subject, public key
    for what in ["signature", "issuer", "validity", "subject", "publicKey"] {
        expect_tlv(&mut tbs, DER_SEQUENCE, what)?;
    }

    Ok(CertificateInfo { version, serial })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        if body.len() < 0x80 {
            out.push(body.len() as u8);
        } else {
            out.push(0x82);
            out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(body);
        out
    }

    fn test_der(version: u8, serial: &[u8]) -> Vec<u8> {
        let mut tbs = Vec::new();
        tbs.extend(tlv(DER_CONTEXT_0, &tlv(DER_INTEGER, &[version])));
        tbs.extend(tlv(DER_INTEGER, serial));
        for filler_len in [4usize, 30, 30, 30, 160] {
            tbs.extend(tlv(DER_SEQUENCE, &vec![0x05; filler_len]));
        }
        tlv(DER_SEQUENCE, &tlv(DER_SEQUENCE, &tbs))
    }

    fn as_pem(der: &[u8]) -> String {
        let body = STANDARD.encode(der);
        let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
        for chunk in body.as_bytes().chunks(64) {
            pem.push_str(std::str::from_utf8(chunk).unwrap());
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
        pem
    }

    #[test]
    fn test_parse_certificate() {
        let der = test_der(2, &[0x01, 0x23, 0x45]);
        let info = parse_certificate(&as_pem(&der)).unwrap();
        assert_eq!(info.version, 2);
        assert_eq!(info.serial, vec![0x01, 0x23, 0x45]);
    }

    #[test]
    fn test_missing_armor_rejected() {
        let result = parse_certificate("just some text");
        assert!(matches!(
            result,
            Err(ReseedError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let pem = "-----BEGIN CERTIFICATE-----\n@@@@\n-----END CERTIFICATE-----\n";
        assert!(matches!(
            parse_certificate(pem),
            Err(ReseedError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn test_wrong_structure_rejected() {
        // an INTEGER where the outer SEQUENCE should be
        let der = tlv(DER_INTEGER, &[0x01]);
        assert!(matches!(
            parse_der(&der),
            Err(ReseedError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn test_long_form_length() {
        // 160-byte subject forces a long-form DER length in the fixture
        let der = test_der(2, &[0x7F]);
        assert!(parse_certificate(&as_pem(&der)).is_ok());
    }
}
