// Domain-side result types the bind response projects into. No wire logic
// here; these are plain carriers for the caller.

use crate::ber::BerElement;

/// Result codes referenced by this crate. The codec itself does not validate
/// codes against any catalog; unknown values pass through verbatim.
pub const RESULT_SUCCESS: i32 = 0;
pub const RESULT_INVALID_CREDENTIALS: i32 = 49;

/// Opaque protocol-extension marker attached by the caller. Nothing at this
/// layer interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

/// Caller-visible outcome of a bind operation.
///
/// `message_id` is -1 when the result was built from a protocol op alone;
/// the surrounding connection layer owns message id assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResult {
    pub message_id: i32,
    pub result_code: i32,
    pub matched_dn: Option<String>,
    pub diagnostic_message: Option<String>,
    pub referral_urls: Vec<String>,
    pub controls: Vec<Control>,
    pub server_sasl_credentials: Option<BerElement>,
}
