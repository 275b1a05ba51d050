//! Input validation for registration and company data

const MIN_PASSWORD_LEN: usize = 8;
const CNPJ_LEN: usize = 14;

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // Needs a dot with something on both sides somewhere in the domain.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Digits-only form of a tax id, e.g. `11.444.777/0001-61` -> `11444777000161`.
pub fn normalize_cnpj(cnpj: &str) -> String {
    cnpj.chars().filter(char::is_ascii_digit).collect()
}

/// Validate a 14-digit CNPJ: formatting characters are ignored, repeated-digit
/// sequences are rejected and both modulo-11 check digits must match.
pub fn validate_cnpj(cnpj: &str) -> bool {
    let digits: Vec<u32> = normalize_cnpj(cnpj)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != CNPJ_LEN {
        return false;
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let first = check_digit(&digits[..12]);
    if first != digits[12] {
        return false;
    }
    check_digit(&digits[..13]) == digits[13]
}

/// Weights run from `len - 7` down to 2, then restart at 9.
fn check_digit(digits: &[u32]) -> u32 {
    let mut weight = digits.len() as u32 - 7;
    let mut sum = 0;
    for &digit in digits {
        sum += digit * weight;
        weight = if weight == 2 { 9 } else { weight - 1 };
    }
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}
