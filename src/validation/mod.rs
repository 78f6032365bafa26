//! Pure input checks. Nothing here touches the network or the ledger;
//! malformed input is the failure being reported, never a panic.

use bigdecimal::BigDecimal;
use std::str::FromStr;

pub const ADDRESS_HEX_LEN: usize = 40;
pub const SLIPPAGE_MIN: f64 = 0.0;
pub const SLIPPAGE_MAX: f64 = 100.0;

/// Outcome of a single check: `valid` plus a human-readable reason when not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
    pub reason: Option<String>,
}

impl Validity {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Converts a failed check into its reason, for fail-fast call sites.
    pub fn err(self) -> Option<String> {
        if self.valid { None } else { self.reason }
    }
}

/// 20-byte hex account address with a `0x` prefix.
pub fn validate_address(address: &str) -> Validity {
    if address.is_empty() {
        return Validity::fail("address required");
    }

    let rest = match address.strip_prefix("0x") {
        Some(rest) => rest,
        None => return Validity::fail("invalid address"),
    };

    if rest.len() != ADDRESS_HEX_LEN || !rest.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Validity::fail("invalid address");
    }

    Validity::ok()
}

/// Positive decimal amount, optionally capped by a balance ceiling.
pub fn validate_amount(amount: &str, balance: Option<&BigDecimal>) -> Validity {
    if amount.trim().is_empty() {
        return Validity::fail("amount required");
    }

    let parsed = match BigDecimal::from_str(amount.trim()) {
        Ok(value) => value,
        Err(_) => return Validity::fail("invalid amount format"),
    };

    if parsed <= BigDecimal::from(0) {
        return Validity::fail("amount must be greater than 0");
    }

    if let Some(ceiling) = balance {
        if &parsed > ceiling {
            return Validity::fail("insufficient balance");
        }
    }

    Validity::ok()
}

/// Optional call payload: empty is fine; otherwise `0x` followed by an even
/// number of hex digits.
pub fn validate_payload(data: &str) -> Validity {
    if data.is_empty() {
        return Validity::ok();
    }

    let rest = match data.strip_prefix("0x") {
        Some(rest) => rest,
        None => return Validity::fail("payload must start with 0x"),
    };

    if rest.len() % 2 != 0 {
        return Validity::fail("payload must have an even number of hex digits");
    }

    if hex::decode(rest).is_err() {
        return Validity::fail("payload contains non-hex characters");
    }

    Validity::ok()
}

/// Strictly positive gas price.
pub fn validate_gas_price(gas_price: &str) -> Validity {
    if gas_price.trim().is_empty() {
        return Validity::fail("gas price required");
    }

    match BigDecimal::from_str(gas_price.trim()) {
        Ok(value) if value > BigDecimal::from(0) => Validity::ok(),
        _ => Validity::fail("gas price must be greater than 0"),
    }
}

/// Slippage tolerance as a percentage in the closed interval [0, 100].
pub fn validate_slippage(slippage: f64) -> Validity {
    if !slippage.is_finite() || !(SLIPPAGE_MIN..=SLIPPAGE_MAX).contains(&slippage) {
        return Validity::fail("slippage must be between 0 and 100");
    }

    Validity::ok()
}

/// Strips control characters and script-ish fragments from free-form input.
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|ch| !ch.is_control() && *ch != '<' && *ch != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Only http(s) URLs are acceptable endpoints.
pub fn is_safe_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
