//! # Payment Processor Collaborator
//!
//! The engine never talks to the processor over the network. Initiation
//! produces a [`CheckoutForm`] the client posts to the processor's hosted
//! checkout; capture is reported back through the callback webhook and
//! authenticated with [`PaymentProcessor::verify_callback`].

use gigflow_core::Money;
use serde::Serialize;

use crate::signature::{CallbackSigner, PaymentCallback, SignatureError, CORRELATION_FIELD};

/// Hosted-checkout redirect descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutForm {
    /// Where the client posts the form.
    pub action_url: String,
    /// Always `POST`.
    pub method: &'static str,
    /// Ordered form fields, `signature` last.
    pub fields: Vec<(String, String)>,
}

impl CheckoutForm {
    /// Value of a form field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub correlation_id: String,
    pub amount: Money,
    pub item_name: String,
}

/// External payment processor.
pub trait PaymentProcessor: Send + Sync + 'static {
    /// Build the checkout form for an escrow payment.
    fn checkout_form(&self, request: &CheckoutRequest) -> CheckoutForm;

    /// Authenticate an inbound callback.
    fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), SignatureError>;
}

/// Return, cancel and notify URLs handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

impl CallbackUrls {
    /// Derive the three URLs from the service's public base URL.
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            return_url: format!("{base}/payments/return"),
            cancel_url: format!("{base}/payments/cancel"),
            notify_url: format!("{base}/v1/payments/callback"),
        }
    }
}

/// Processor with a hosted checkout page and HMAC-signed forms.
#[derive(Debug, Clone)]
pub struct HostedCheckout {
    merchant_id: String,
    process_url: String,
    urls: CallbackUrls,
    signer: CallbackSigner,
}

impl HostedCheckout {
    pub fn new(
        merchant_id: impl Into<String>,
        process_url: impl Into<String>,
        urls: CallbackUrls,
        signer: CallbackSigner,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            process_url: process_url.into(),
            urls,
            signer,
        }
    }

    /// The signer shared with callback verification.
    pub fn signer(&self) -> &CallbackSigner {
        &self.signer
    }
}

impl PaymentProcessor for HostedCheckout {
    fn checkout_form(&self, request: &CheckoutRequest) -> CheckoutForm {
        let amount = request.amount.to_fixed();
        let mut fields: Vec<(String, String)> = [
            ("merchant_id", self.merchant_id.as_str()),
            ("return_url", self.urls.return_url.as_str()),
            ("cancel_url", self.urls.cancel_url.as_str()),
            ("notify_url", self.urls.notify_url.as_str()),
            (CORRELATION_FIELD, request.correlation_id.as_str()),
            ("amount", amount.as_str()),
            ("item_name", request.item_name.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let signature = self
            .signer
            .sign_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        fields.push(("signature".to_string(), signature));
        CheckoutForm {
            action_url: self.process_url.clone(),
            method: "POST",
            fields,
        }
    }

    fn verify_callback(&self, callback: &PaymentCallback) -> Result<(), SignatureError> {
        self.signer.verify(callback)
    }
}
