//! PKCS#12 container decoding
//!
//! Opens a DER-encoded PFX blob under the supplied passphrase and hands back
//! the leaf certificate once it has confirmed a private key travels with it.
//! Nothing here touches the filesystem or the database.

use std::sync::OnceLock;

use log::{info, warn};
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::provider::Provider;
use openssl::x509::X509;

use crate::certificate_validator::CertificateError;

// OpenSSL library/reason codes raised when the MAC (keyed by the passphrase)
// or the bag decryption does not check out.
const ERR_LIB_PKCS12: i32 = 35;
const PKCS12_R_MAC_VERIFY_FAILURE: i32 = 113;
const PKCS12_R_PKCS12_CIPHERFINAL_ERROR: i32 = 116;

/// Fallback when the library doesn't give a usable code.
const PASSPHRASE_SIGNATURES: [&str; 3] = ["mac verify failure", "password", "passphrase"];

/// Held for the life of the process; unloading would drop the ciphers again.
static LEGACY_PROVIDER: OnceLock<Option<Provider>> = OnceLock::new();

/// Load OpenSSL's `legacy` provider once, keeping the default provider as
/// fallback. Windows exports and most A1 certificates encrypt their bags with
/// RC2-40 and 3DES, which OpenSSL 3 only decrypts through it.
///
/// Returns whether the provider is available.
pub fn load_legacy_provider() -> bool {
    LEGACY_PROVIDER
        .get_or_init(|| match Provider::try_load(None, "legacy", true) {
            Ok(provider) => {
                info!("OpenSSL legacy provider loaded for RC2/3DES containers");
                Some(provider)
            }
            Err(e) => {
                warn!(
                    "OpenSSL legacy provider unavailable, RC2/3DES containers will be rejected: {}",
                    e
                );
                None
            }
        })
        .is_some()
}

/// Decoded PFX contents
#[derive(Debug)]
pub struct PfxContents {
    /// End-entity certificate paired with the private key
    pub certificate: X509,
    /// Number of additional (chain) certificates bundled in the container
    pub chain_len: usize,
}

/// Decode a PKCS#12 container
///
/// # Arguments
/// * `der` - Raw container bytes
/// * `passphrase` - Container passphrase; may be empty
///
/// # Errors
/// * `CertificateError::Parse` - bytes are not a PKCS#12 structure
/// * `CertificateError::WrongPassphrase` - passphrase does not open the container
/// * `CertificateError::MissingCertificate` - no certificate bag
/// * `CertificateError::MissingPrivateKey` - no private key bag
pub fn load_pfx(der: &[u8], passphrase: &str) -> Result<PfxContents, CertificateError> {
    load_legacy_provider();
    let container = Pkcs12::from_der(der).map_err(|e| CertificateError::Parse(describe(&e)))?;

    let parsed = container.parse2(passphrase).map_err(classify_parse_error)?;

    let mut chain: Vec<X509> = parsed
        .ca
        .map(|stack| stack.into_iter().collect())
        .unwrap_or_default();

    // Without a key OpenSSL cannot pair the leaf and files every certificate
    // under the chain; the first one is the leaf in that case.
    let certificate = match parsed.cert {
        Some(cert) => cert,
        None if !chain.is_empty() => chain.remove(0),
        None => return Err(CertificateError::MissingCertificate),
    };

    if parsed.pkey.is_none() {
        return Err(CertificateError::MissingPrivateKey);
    }

    Ok(PfxContents {
        certificate,
        chain_len: chain.len(),
    })
}

fn classify_parse_error(stack: ErrorStack) -> CertificateError {
    if is_passphrase_failure(&stack) {
        CertificateError::WrongPassphrase
    } else {
        CertificateError::Parse(describe(&stack))
    }
}

fn is_passphrase_failure(stack: &ErrorStack) -> bool {
    let coded = stack.errors().iter().any(|err| {
        err.library_code() == ERR_LIB_PKCS12
            && matches!(
                err.reason_code(),
                PKCS12_R_MAC_VERIFY_FAILURE | PKCS12_R_PKCS12_CIPHERFINAL_ERROR
            )
    });
    if coded {
        return true;
    }
    let text = stack.to_string().to_lowercase();
    PASSPHRASE_SIGNATURES.iter().any(|sig| text.contains(sig))
}

fn describe(stack: &ErrorStack) -> String {
    stack
        .errors()
        .first()
        .and_then(|err| err.reason())
        .map(str::to_string)
        .unwrap_or_else(|| "not a PKCS#12 container".to_string())
}
