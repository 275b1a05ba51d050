//! Shared harness for the HTTP integration tests: a router over a fresh
//! SQLite database, request builders and in-process PKCS#12 fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use nfdas::auth_token::TokenIssuer;
use nfdas::configs::DatabaseConfig;
use nfdas::storage::Storage;
use nfdas::webserver::{router, AppState};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509NameBuilder, X509};
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const DAY: i64 = 86_400;
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;
const BOUNDARY: &str = "nfdas-test-boundary";

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub storage: Arc<Storage>,
}

pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let database = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display()),
        ..DatabaseConfig::default()
    };
    let storage = Arc::new(
        Storage::connect(&database, &dir.path().join("uploads"))
            .await
            .unwrap(),
    );
    let state = AppState {
        storage: Arc::clone(&storage),
        tokens: Arc::new(TokenIssuer::new(
            SecretString::from("integration-secret".to_string()),
            7,
        )),
        max_upload_bytes: MAX_UPLOAD_BYTES,
    };
    let app = router(state, &dir.path().join("public"));
    TestApp { dir, app, storage }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Register `email` and return its token.
    pub async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/auth/register",
                None,
                serde_json::json!({ "email": email, "password": "password1", "name": "Test User" }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a company for the token's user and return its id.
    pub async fn create_company(&self, token: &str, cnpj: &str) -> i64 {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/companies",
                Some(token),
                serde_json::json!({ "name": "Empresa Teste", "cnpj": cnpj }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["company"]["id"].as_i64().unwrap()
    }

    pub fn stored_files(&self) -> usize {
        std::fs::read_dir(self.storage.uploads_dir())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().is_file())
            .count()
    }

    pub fn transient_files(&self) -> usize {
        std::fs::read_dir(self.storage.transient_dir()).unwrap().count()
    }
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn bare_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub struct FilePart<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// `multipart/form-data` upload with an optional file part and an optional
/// passphrase field.
pub fn upload_request(
    uri: &str,
    token: &str,
    file: Option<FilePart<'_>>,
    passphrase: Option<&str>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"certificate\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(passphrase) = passphrase {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\n{}\r\n",
                BOUNDARY, passphrase
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn pfx_part(bytes: &[u8]) -> FilePart<'_> {
    FilePart {
        file_name: "certificado.pfx",
        content_type: "application/x-pkcs12",
        bytes,
    }
}

/// PKCS#12 container holding a fresh EC key and a certificate issued by
/// `issuer_cn`, valid over `[not_before, not_after]` (unix seconds).
pub fn pfx(issuer_cn: &str, not_before: i64, not_after: i64, passphrase: &str) -> Vec<u8> {
    let (key, cert) = issue_certificate(issuer_cn, not_before, not_after);
    Pkcs12::builder()
        .name("certificado")
        .pkey(&key)
        .cert(&cert)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Same as [`pfx`] but with the 3DES / RC2-40 bag encryption and SHA-1 MAC
/// that Windows exports use.
pub fn legacy_pfx(issuer_cn: &str, not_before: i64, not_after: i64, passphrase: &str) -> Vec<u8> {
    assert!(nfdas::pfx_key::load_legacy_provider());
    let (key, cert) = issue_certificate(issuer_cn, not_before, not_after);
    Pkcs12::builder()
        .name("certificado")
        .pkey(&key)
        .cert(&cert)
        .key_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
        .cert_algorithm(Nid::PBE_WITHSHA1AND40BITRC2_CBC)
        .mac_md(MessageDigest::sha1())
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Container valid from yesterday for a year.
pub fn current_pfx(passphrase: &str) -> Vec<u8> {
    let now = chrono::Utc::now().timestamp();
    pfx("AC Integracao v5", now - DAY, now + 365 * DAY, passphrase)
}

fn issue_certificate(issuer_cn: &str, not_before: i64, not_after: i64) -> (PKey<Private>, X509) {
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
    issuer.append_entry_by_nid(Nid::COMMONNAME, issuer_cn).unwrap();
    let issuer = issuer.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
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
