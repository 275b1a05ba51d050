//! In-process certificate and PKCS#12 fixtures for unit tests.

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameBuilder, X509};

pub const DAY: i64 = 86_400;

const X509_VERSION_3: i32 = 2;

/// Self-signed EC certificate whose issuer name carries `issuer_cn` (or no
/// common name at all) and whose validity window is `[not_before, not_after]`
/// in unix seconds.
pub fn issue_certificate(
    issuer_cn: Option<&str>,
    not_before: i64,
    not_after: i64,
) -> (PKey<Private>, X509) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut subject = X509NameBuilder::new().unwrap();
    subject
        .append_entry_by_nid(Nid::COMMONNAME, "EMPRESA TESTE LTDA:11444777000161")
        .unwrap();
    let subject = subject.build();

    let mut issuer = X509NameBuilder::new().unwrap();
    issuer
        .append_entry_by_nid(Nid::ORGANIZATIONNAME, "ICP-Brasil")
        .unwrap();
    if let Some(cn) = issuer_cn {
        issuer.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    }
    let issuer = issuer.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(X509_VERSION_3).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&subject).unwrap();
    builder.set_issuer_name(&issuer).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (key, builder.build())
}

pub fn build_pfx(key: &PKey<Private>, cert: &X509, passphrase: &str) -> Vec<u8> {
    Pkcs12::builder()
        .name("certificado")
        .pkey(key)
        .cert(cert)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Container encrypted the way Windows and most A1 exports do it: 3DES for
/// the key bag, RC2-40 for the certificate bag, SHA-1 MAC.
pub fn build_legacy_pfx(key: &PKey<Private>, cert: &X509, passphrase: &str) -> Vec<u8> {
    assert!(crate::pfx_key::load_legacy_provider());
    Pkcs12::builder()
        .name("certificado")
        .pkey(key)
        .cert(cert)
        .key_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
        .cert_algorithm(Nid::PBE_WITHSHA1AND40BITRC2_CBC)
        .mac_md(MessageDigest::sha1())
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}

pub fn certificate_only_pfx(cert: &X509, passphrase: &str) -> Vec<u8> {
    Pkcs12::builder()
        .cert(cert)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}

pub fn key_only_pfx(key: &PKey<Private>, passphrase: &str) -> Vec<u8> {
    Pkcs12::builder()
        .pkey(key)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}
