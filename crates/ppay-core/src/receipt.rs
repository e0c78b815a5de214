//! The payment receipt: an off-ledger claim exchanged between payer and payee.
//!
//! A [`Receipt`] is a hypothesis. Nothing in it is trusted until
//! [`crate::verify::ReceiptVerifier`] has re-derived it from ledger data.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::{is_transaction_signature, Address};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("receipt is empty")]
    Empty,

    #[error("malformed receipt: {0}")]
    Malformed(String),

    #[error("receipt is missing {0}")]
    MissingField(&'static str),

    #[error("receipt amount must be greater than 0")]
    ZeroAmount,

    #[error("receipt {field} is not a valid address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("receipt signature is not a valid transaction signature")]
    InvalidSignature,

    #[error("this is a payment request link, not a receipt; use the receipt link generated after the payment completed")]
    PaymentRequestLink,

    #[error("receipt is not addressed to {0}")]
    NotAddressedTo(String),
}

/// How the claimed payment moved value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    /// Public system transfer; fully re-derivable from the ledger.
    #[default]
    #[serde(alias = "public")]
    Plain,
    /// Compressed-account transfer; only the payer is re-derivable.
    #[serde(alias = "private")]
    Shielded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Caller-chosen idempotency token. Defaults to the signature.
    #[serde(rename = "ref", default)]
    pub reference: String,
    pub signature: String,
    pub from: String,
    pub to: String,
    /// Amount in lamports.
    #[serde(alias = "amountLamports")]
    pub amount: u64,
    /// Memo blob as carried on-ledger; empty when the payment had no memo.
    #[serde(default)]
    pub encrypted_memo: String,
    /// Creation time in unix milliseconds, as stamped by the payer.
    pub created_at: i64,
    #[serde(alias = "type", default)]
    pub kind: ReceiptKind,
}

impl Receipt {
    /// Decode receipt JSON, fill the default reference and validate field shapes.
    pub fn from_json(json: &str) -> Result<Self, ReceiptError> {
        let mut receipt: Receipt =
            serde_json::from_str(json).map_err(|e| ReceiptError::Malformed(e.to_string()))?;
        if receipt.reference.is_empty() {
            receipt.reference = receipt.signature.clone();
        }
        receipt.validate()?;
        Ok(receipt)
    }

    pub fn to_json(&self) -> Result<String, ReceiptError> {
        serde_json::to_string(self).map_err(|e| ReceiptError::Malformed(e.to_string()))
    }

    /// Accept whatever a user pasted: receipt JSON, or a link carrying the
    /// receipt in a `receipt=` query or fragment parameter.
    pub fn parse_input(input: &str) -> Result<Self, ReceiptError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ReceiptError::Empty);
        }
        if input.starts_with('{') {
            return Self::from_json(input);
        }
        if input.starts_with("http") || input.contains("receipt=") {
            if let Some(json) = extract_receipt_param(input) {
                return Self::from_json(&json);
            }
            if input.contains("/pay#") || input.contains("/pay?") {
                return Err(ReceiptError::PaymentRequestLink);
            }
        }
        Self::from_json(input)
    }

    /// Check the claim is well-formed. Says nothing about whether it is true.
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if self.reference.is_empty() {
            return Err(ReceiptError::MissingField("ref"));
        }
        if self.signature.is_empty() {
            return Err(ReceiptError::MissingField("signature"));
        }
        if !is_transaction_signature(&self.signature) {
            return Err(ReceiptError::InvalidSignature);
        }
        for (field, value) in [("from", &self.from), ("to", &self.to)] {
            if value.is_empty() {
                return Err(ReceiptError::MissingField(field));
            }
            Address::parse(value)
                .map_err(|_| ReceiptError::InvalidAddress { field, value: value.clone() })?;
        }
        if self.amount == 0 {
            return Err(ReceiptError::ZeroAmount);
        }
        Ok(())
    }

    /// Reject receipts naming a different payee than the local wallet.
    pub fn ensure_addressed_to(&self, wallet: &Address) -> Result<(), ReceiptError> {
        if wallet.as_str() != self.to {
            return Err(ReceiptError::NotAddressedTo(wallet.to_string()));
        }
        Ok(())
    }

    pub fn has_memo(&self) -> bool {
        !self.encrypted_memo.is_empty()
    }
}

fn extract_receipt_param(input: &str) -> Option<String> {
    // Bare fragments and paths get a throwaway base so they parse as URLs.
    let url = if input.starts_with("http") {
        Url::parse(input).ok()?
    } else {
        Url::parse("http://receipt.invalid/").ok()?.join(input).ok()?
    };
    let from_query = url
        .query_pairs()
        .find(|(k, _)| k == "receipt")
        .map(|(_, v)| v.into_owned());
    from_query
        .or_else(|| {
            let fragment = url.fragment()?;
            url::form_urlencoded::parse(fragment.as_bytes())
                .find(|(k, _)| k == "receipt")
                .map(|(_, v)| v.into_owned())
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROM: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcQb";
    const TO: &str = "noopb9bkMVfRPU8AsbpTUg8AQkHtKwMYZiFUjNRtMmV";

    fn signature() -> String {
        bs58::encode([9u8; 64]).into_string()
    }

    fn receipt_json() -> String {
        format!(
            r#"{{"ref":"order-17","signature":"{}","from":"{FROM}","to":"{TO}","amount":1000000,"encryptedMemo":"","createdAt":1700000000000,"kind":"plain"}}"#,
            signature()
        )
    }

    #[test]
    fn parses_canonical_json() {
        let r = Receipt::from_json(&receipt_json()).unwrap();
        assert_eq!(r.reference, "order-17");
        assert_eq!(r.amount, 1_000_000);
        assert_eq!(r.kind, ReceiptKind::Plain);
        assert!(!r.has_memo());
    }

    #[test]
    fn accepts_legacy_field_names_and_defaults_ref() {
        let json = format!(
            r#"{{"signature":"{}","from":"{FROM}","to":"{TO}","amountLamports":5,"encryptedMemo":"x","createdAt":1,"type":"private"}}"#,
            signature()
        );
        let r = Receipt::from_json(&json).unwrap();
        assert_eq!(r.reference, r.signature);
        assert_eq!(r.amount, 5);
        assert_eq!(r.kind, ReceiptKind::Shielded);
    }

    #[test]
    fn rejects_zero_amount_and_bad_addresses() {
        let zero = receipt_json().replace("1000000", "0");
        assert_eq!(Receipt::from_json(&zero), Err(ReceiptError::ZeroAmount));

        let bad_to = receipt_json().replace(TO, "not-an-address");
        assert!(matches!(
            Receipt::from_json(&bad_to),
            Err(ReceiptError::InvalidAddress { field: "to", .. })
        ));

        let negative = receipt_json().replace("1000000", "-4");
        assert!(matches!(Receipt::from_json(&negative), Err(ReceiptError::Malformed(_))));
    }

    #[test]
    fn rejects_missing_created_at() {
        let json = receipt_json().replace(r#","createdAt":1700000000000"#, "");
        assert!(matches!(Receipt::from_json(&json), Err(ReceiptError::Malformed(_))));
    }

    #[test]
    fn extracts_receipt_from_query_and_fragment() {
        let encoded: String = url::form_urlencoded::byte_serialize(receipt_json().as_bytes()).collect();

        let query = format!("https://pay.example/inbox?receipt={encoded}");
        assert_eq!(Receipt::parse_input(&query).unwrap().reference, "order-17");

        let fragment = format!("https://pay.example/inbox#receipt={encoded}");
        assert_eq!(Receipt::parse_input(&fragment).unwrap().reference, "order-17");

        let bare = format!("#receipt={encoded}");
        assert_eq!(Receipt::parse_input(&bare).unwrap().reference, "order-17");
    }

    #[test]
    fn payment_request_link_is_called_out() {
        let link = format!("https://pay.example/pay#to={TO}&amount=1");
        assert_eq!(Receipt::parse_input(&link), Err(ReceiptError::PaymentRequestLink));
    }

    #[test]
    fn addressed_to_compares_payee() {
        let r = Receipt::from_json(&receipt_json()).unwrap();
        assert!(r.ensure_addressed_to(&Address::parse(TO).unwrap()).is_ok());
        assert!(matches!(
            r.ensure_addressed_to(&Address::parse(FROM).unwrap()),
            Err(ReceiptError::NotAddressedTo(_))
        ));
    }
}
