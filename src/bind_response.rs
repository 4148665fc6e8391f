// Codec for the bind response protocol op (RFC 4511 section 4.2.2):
//
//   BindResponse ::= [APPLICATION 1] SEQUENCE {
//       COMPONENTS OF LDAPResult,
//       serverSaslCreds    [7] OCTET STRING OPTIONAL }
//
// The three LDAPResult components (resultCode, matchedDN, diagnosticMessage)
// are positional; the referral list and SASL credentials trail in any order
// and are recognized by tag alone.

use std::fmt;

use tracing::debug;

use crate::ber::{BerElement, BerReader, BerWriter};
use crate::error::{DecodeError, Result};
use crate::result::{BindResult, Control};

/// [APPLICATION 1] constructed - the outer bind response tag.
pub const TYPE_BIND_RESPONSE: u8 = 0x61;
/// [3] constructed - referral URL list, shared by all LDAP response ops.
pub const TYPE_REFERRAL_URLS: u8 = 0xA3;
/// [7] primitive - server SASL credentials.
pub const TYPE_SERVER_SASL_CREDENTIALS: u8 = 0x87;

/// Decoded bind response. Immutable once constructed; safe to share across
/// threads without synchronization.
///
/// An empty matched DN or diagnostic message has a single wire shape shared
/// with "absent", so both fields decode to `None` when empty. An entity
/// constructed with `Some("")` will come back as `None` after a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResponseProtocolOp {
    result_code: i32,
    matched_dn: Option<String>,
    diagnostic_message: Option<String>,
    referral_urls: Vec<String>,
    server_sasl_credentials: Option<BerElement>,
}

impl BindResponseProtocolOp {
    /// Builds a bind response from explicit field values. The credentials
    /// element, whatever tag the caller gave it, is re-tagged as
    /// [`TYPE_SERVER_SASL_CREDENTIALS`].
    pub fn new(
        result_code: i32,
        matched_dn: Option<String>,
        diagnostic_message: Option<String>,
        referral_urls: Vec<String>,
        server_sasl_credentials: Option<BerElement>,
    ) -> Self {
        let server_sasl_credentials = server_sasl_credentials
            .map(|c| BerElement::new(TYPE_SERVER_SASL_CREDENTIALS, c.into_value()));
        Self {
            result_code,
            matched_dn,
            diagnostic_message,
            referral_urls,
            server_sasl_credentials,
        }
    }

    /// Builds a bind response from a previously assembled domain result.
    pub fn from_result(result: &BindResult) -> Self {
        Self::new(
            result.result_code,
            result.matched_dn.clone(),
            result.diagnostic_message.clone(),
            result.referral_urls.clone(),
            result.server_sasl_credentials.clone(),
        )
    }

    pub fn result_code(&self) -> i32 {
        self.result_code
    }

    pub fn matched_dn(&self) -> Option<&str> {
        self.matched_dn.as_deref()
    }

    pub fn diagnostic_message(&self) -> Option<&str> {
        self.diagnostic_message.as_deref()
    }

    /// Referral URLs in wire order. Empty when the message carried none.
    pub fn referral_urls(&self) -> &[String] {
        &self.referral_urls
    }

    pub fn server_sasl_credentials(&self) -> Option<&BerElement> {
        self.server_sasl_credentials.as_ref()
    }

    pub fn protocol_op_type(&self) -> u8 {
        TYPE_BIND_RESPONSE
    }

    /// Streaming decode: consumes exactly one bind response from a cursor
    /// positioned at the outer tag.
    pub fn read_from(reader: &mut BerReader<'_>) -> Result<Self> {
        let end = reader.begin_sequence(TYPE_BIND_RESPONSE)?;
        let mut source = StreamSource { reader, end };
        match decode_op(&mut source) {
            Ok(op) => Ok(op),
            Err(e) => {
                debug!("failed to decode bind response from stream: {}", e);
                Err(e)
            }
        }
    }

    /// Tree decode: consumes a fully materialized outer element. The first
    /// three children are positional; the rest are classified by tag.
    pub fn decode(element: &BerElement) -> Result<Self> {
        let elements = element.children()?;
        if elements.len() < 3 {
            let e = DecodeError::ElementCount {
                count: elements.len(),
            };
            debug!("failed to decode bind response element: {}", e);
            return Err(e);
        }
        let mut source = TreeSource {
            elements: &elements,
            index: 0,
        };
        match decode_op(&mut source) {
            Ok(op) => Ok(op),
            Err(e) => {
                debug!("failed to decode bind response element: {}", e);
                Err(e)
            }
        }
    }

    /// Encodes to a materialized element tree. Wire-identical to
    /// [`write_to`](Self::write_to).
    pub fn encode(&self) -> BerElement {
        let mut elements = Vec::with_capacity(5);
        elements.push(BerElement::enumerated(self.result_code));
        elements.push(BerElement::octet_string(
            self.matched_dn.as_deref().unwrap_or(""),
        ));
        elements.push(BerElement::octet_string(
            self.diagnostic_message.as_deref().unwrap_or(""),
        ));

        if !self.referral_urls.is_empty() {
            let refs: Vec<BerElement> = self
                .referral_urls
                .iter()
                .map(|url| BerElement::octet_string(url))
                .collect();
            elements.push(BerElement::sequence(TYPE_REFERRAL_URLS, &refs));
        }

        if let Some(creds) = &self.server_sasl_credentials {
            elements.push(creds.clone());
        }

        BerElement::sequence(TYPE_BIND_RESPONSE, &elements)
    }

    /// Encodes directly into a streaming output buffer.
    pub fn write_to(&self, writer: &mut BerWriter) {
        let op = writer.begin_sequence(TYPE_BIND_RESPONSE);
        writer.write_enumerated(self.result_code);
        writer.write_string(self.matched_dn.as_deref().unwrap_or(""));
        writer.write_string(self.diagnostic_message.as_deref().unwrap_or(""));

        if !self.referral_urls.is_empty() {
            let refs = writer.begin_sequence(TYPE_REFERRAL_URLS);
            for url in &self.referral_urls {
                writer.write_string(url);
            }
            writer.end_sequence(refs);
        }

        if let Some(creds) = &self.server_sasl_credentials {
            writer.write_raw(creds.tag(), creds.value());
        }

        writer.end_sequence(op);
    }

    /// Projects this op plus caller-supplied controls into a domain result.
    /// Pure structural mapping; no field re-validation.
    pub fn to_bind_result(&self, controls: Vec<Control>) -> BindResult {
        BindResult {
            message_id: -1,
            result_code: self.result_code,
            matched_dn: self.matched_dn.clone(),
            diagnostic_message: self.diagnostic_message.clone(),
            referral_urls: self.referral_urls.clone(),
            controls,
            server_sasl_credentials: self.server_sasl_credentials.clone(),
        }
    }
}

// Credentials deliberately excluded: rendering feeds logs and the
// credentials may carry sensitive material.
impl fmt::Display for BindResponseProtocolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindResponseProtocolOp(resultCode={}", self.result_code)?;
        if let Some(dn) = &self.matched_dn {
            write!(f, ", matchedDN='{}'", dn)?;
        }
        if let Some(message) = &self.diagnostic_message {
            write!(f, ", diagnosticMessage='{}'", message)?;
        }
        if !self.referral_urls.is_empty() {
            write!(f, ", referralURLs={{")?;
            for (i, url) in self.referral_urls.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "'{}'", url)?;
            }
            write!(f, "}}")?;
        }
        write!(f, ")")
    }
}

/// One consumption seam for both decode modes. The streaming reader and the
/// materialized element array implement the same field-level reads, so the
/// two decoders cannot drift in semantics.
trait OpSource {
    fn read_result_code(&mut self) -> Result<i32>;
    fn read_text(&mut self) -> Result<String>;
    fn has_more(&self) -> bool;
    fn peek_tag(&mut self) -> Result<u8>;
    fn read_referrals(&mut self, urls: &mut Vec<String>) -> Result<()>;
    fn read_credentials(&mut self) -> Result<Vec<u8>>;
}

/// Shared decode: strict prefix, then trailing elements classified by tag in
/// any order. A repeated credentials element overwrites the previous one and
/// repeated referral lists concatenate; duplicates are not rejected.
fn decode_op<S: OpSource>(source: &mut S) -> Result<BindResponseProtocolOp> {
    let result_code = source.read_result_code()?;
    let matched_dn = none_if_empty(source.read_text()?);
    let diagnostic_message = none_if_empty(source.read_text()?);

    let mut referral_urls = Vec::new();
    let mut credentials = None;
    while source.has_more() {
        match source.peek_tag()? {
            TYPE_REFERRAL_URLS => source.read_referrals(&mut referral_urls)?,
            TYPE_SERVER_SASL_CREDENTIALS => {
                credentials = Some(source.read_credentials()?);
            }
            tag => return Err(DecodeError::UnexpectedElement { tag }),
        }
    }

    Ok(BindResponseProtocolOp::new(
        result_code,
        matched_dn,
        diagnostic_message,
        referral_urls,
        credentials.map(|value| BerElement::new(TYPE_SERVER_SASL_CREDENTIALS, value)),
    ))
}

// Empty and absent share one wire shape; both decode to None.
fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

struct StreamSource<'r, 'a> {
    reader: &'r mut BerReader<'a>,
    end: usize,
}

impl OpSource for StreamSource<'_, '_> {
    fn read_result_code(&mut self) -> Result<i32> {
        self.reader.read_enumerated()
    }

    fn read_text(&mut self) -> Result<String> {
        self.reader.read_string()
    }

    fn has_more(&self) -> bool {
        self.reader.position() < self.end
    }

    fn peek_tag(&mut self) -> Result<u8> {
        self.reader.peek_tag()
    }

    fn read_referrals(&mut self, urls: &mut Vec<String>) -> Result<()> {
        let end = self.reader.begin_sequence(TYPE_REFERRAL_URLS)?;
        while self.reader.position() < end {
            urls.push(self.reader.read_string()?);
        }
        Ok(())
    }

    fn read_credentials(&mut self) -> Result<Vec<u8>> {
        self.reader.read_tag()?;
        self.reader.read_octet_string_value()
    }
}

// Tree mode reads the prefix by position, not tag: element values only need
// to parse as an integer / UTF-8 text, mirroring the stream mode's results
// without re-checking universal tags.
struct TreeSource<'a> {
    elements: &'a [BerElement],
    index: usize,
}

impl<'a> TreeSource<'a> {
    fn next(&mut self) -> Result<&'a BerElement> {
        let element = self.elements.get(self.index).ok_or(DecodeError::ElementCount {
            count: self.elements.len(),
        })?;
        self.index += 1;
        Ok(element)
    }
}

impl OpSource for TreeSource<'_> {
    fn read_result_code(&mut self) -> Result<i32> {
        self.next()?.int_value()
    }

    fn read_text(&mut self) -> Result<String> {
        self.next()?.string_value()
    }

    fn has_more(&self) -> bool {
        self.index < self.elements.len()
    }

    fn peek_tag(&mut self) -> Result<u8> {
        Ok(self.elements[self.index].tag())
    }

    fn read_referrals(&mut self, urls: &mut Vec<String>) -> Result<()> {
        for child in self.next()?.children()? {
            urls.push(child.string_value()?);
        }
        Ok(())
    }

    fn read_credentials(&mut self) -> Result<Vec<u8>> {
        Ok(self.next()?.value().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{RESULT_INVALID_CREDENTIALS, RESULT_SUCCESS};

    fn decode_stream(bytes: &[u8]) -> Result<BindResponseProtocolOp> {
        let mut reader = BerReader::new(bytes);
        BindResponseProtocolOp::read_from(&mut reader)
    }

    fn decode_tree(bytes: &[u8]) -> Result<BindResponseProtocolOp> {
        BindResponseProtocolOp::decode(&BerElement::parse(bytes)?)
    }

    fn full_op() -> BindResponseProtocolOp {
        BindResponseProtocolOp::new(
            RESULT_INVALID_CREDENTIALS,
            Some("dc=example,dc=com".to_string()),
            Some("invalid credentials".to_string()),
            vec!["ldap://a".to_string(), "ldap://b".to_string()],
            Some(BerElement::new(
                TYPE_SERVER_SASL_CREDENTIALS,
                b"challenge".to_vec(),
            )),
        )
    }

    #[test]
    fn round_trip_both_modes() {
        let op = full_op();

        let mut writer = BerWriter::new();
        op.write_to(&mut writer);
        let bytes = writer.into_vec();

        assert_eq!(decode_stream(&bytes).unwrap(), op);
        assert_eq!(decode_tree(&bytes).unwrap(), op);
    }

    #[test]
    fn stream_and_tree_encoders_are_wire_identical() {
        for op in [
            full_op(),
            BindResponseProtocolOp::new(RESULT_SUCCESS, None, None, vec![], None),
        ] {
            let mut writer = BerWriter::new();
            op.write_to(&mut writer);
            assert_eq!(writer.into_vec(), op.encode().to_vec());
        }
    }

    #[test]
    fn minimal_message_is_three_elements() {
        let op = BindResponseProtocolOp::new(RESULT_SUCCESS, None, None, vec![], None);
        let bytes = op.encode().to_vec();
        assert_eq!(
            bytes,
            vec![0x61, 0x07, 0x0A, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00]
        );
        assert_eq!(decode_stream(&bytes).unwrap(), op);
        assert_eq!(decode_tree(&bytes).unwrap(), op);
    }

    #[test]
    fn empty_text_collapses_to_absent() {
        let op = BindResponseProtocolOp::new(
            RESULT_SUCCESS,
            Some(String::new()),
            Some(String::new()),
            vec![],
            None,
        );
        let decoded = decode_stream(&op.encode().to_vec()).unwrap();
        assert_eq!(decoded.matched_dn(), None);
        assert_eq!(decoded.diagnostic_message(), None);
    }

    #[test]
    fn trailing_element_order_is_free() {
        // credentials before referrals, the reverse of encode order
        let mut writer = BerWriter::new();
        let op = writer.begin_sequence(TYPE_BIND_RESPONSE);
        writer.write_enumerated(0);
        writer.write_string("");
        writer.write_string("");
        writer.write_raw(TYPE_SERVER_SASL_CREDENTIALS, b"creds");
        let refs = writer.begin_sequence(TYPE_REFERRAL_URLS);
        writer.write_string("ldap://a");
        writer.end_sequence(refs);
        writer.end_sequence(op);
        let bytes = writer.into_vec();

        for decoded in [decode_stream(&bytes).unwrap(), decode_tree(&bytes).unwrap()] {
            assert_eq!(decoded.referral_urls(), ["ldap://a".to_string()]);
            assert_eq!(
                decoded.server_sasl_credentials().unwrap().value(),
                b"creds"
            );
        }
    }

    #[test]
    fn unknown_trailing_tag_is_rejected_both_modes() {
        let mut writer = BerWriter::new();
        let op = writer.begin_sequence(TYPE_BIND_RESPONSE);
        writer.write_enumerated(0);
        writer.write_string("");
        writer.write_string("");
        writer.write_raw(0x85, b"junk");
        writer.end_sequence(op);
        let bytes = writer.into_vec();

        assert!(matches!(
            decode_stream(&bytes),
            Err(DecodeError::UnexpectedElement { tag: 0x85 })
        ));
        assert!(matches!(
            decode_tree(&bytes),
            Err(DecodeError::UnexpectedElement { tag: 0x85 })
        ));
    }

    #[test]
    fn empty_referral_list_is_omitted_on_encode() {
        let op = BindResponseProtocolOp::new(RESULT_SUCCESS, None, None, vec![], None);
        assert_eq!(op.encode().children().unwrap().len(), 3);
    }

    #[test]
    fn zero_entry_referral_element_decodes_to_empty_list() {
        let mut writer = BerWriter::new();
        let op = writer.begin_sequence(TYPE_BIND_RESPONSE);
        writer.write_enumerated(0);
        writer.write_string("");
        writer.write_string("");
        let refs = writer.begin_sequence(TYPE_REFERRAL_URLS);
        writer.end_sequence(refs);
        writer.end_sequence(op);
        let bytes = writer.into_vec();

        for decoded in [decode_stream(&bytes).unwrap(), decode_tree(&bytes).unwrap()] {
            assert!(decoded.referral_urls().is_empty());
        }
    }

    #[test]
    fn referral_encoding_preserves_order() {
        let op = full_op();
        let children = op.encode().children().unwrap();
        let refs = children
            .iter()
            .find(|c| c.tag() == TYPE_REFERRAL_URLS)
            .unwrap()
            .children()
            .unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].string_value().unwrap(), "ldap://a");
        assert_eq!(refs[1].string_value().unwrap(), "ldap://b");
    }

    #[test]
    fn credentials_tag_is_normalized_at_construction() {
        let op = BindResponseProtocolOp::new(
            RESULT_SUCCESS,
            None,
            None,
            vec![],
            // caller tags the credentials as a plain OCTET STRING
            Some(BerElement::new(0x04, b"creds".to_vec())),
        );
        assert_eq!(
            op.server_sasl_credentials().unwrap().tag(),
            TYPE_SERVER_SASL_CREDENTIALS
        );
        let children = op.encode().children().unwrap();
        assert_eq!(children[3].tag(), TYPE_SERVER_SASL_CREDENTIALS);
        assert_eq!(children[3].value(), b"creds");
    }

    #[test]
    fn duplicate_optional_elements() {
        // last credentials wins, referral lists concatenate
        let mut writer = BerWriter::new();
        let op = writer.begin_sequence(TYPE_BIND_RESPONSE);
        writer.write_enumerated(0);
        writer.write_string("");
        writer.write_string("");
        writer.write_raw(TYPE_SERVER_SASL_CREDENTIALS, b"first");
        let refs = writer.begin_sequence(TYPE_REFERRAL_URLS);
        writer.write_string("ldap://a");
        writer.end_sequence(refs);
        writer.write_raw(TYPE_SERVER_SASL_CREDENTIALS, b"second");
        let refs = writer.begin_sequence(TYPE_REFERRAL_URLS);
        writer.write_string("ldap://b");
        writer.end_sequence(refs);
        writer.end_sequence(op);
        let bytes = writer.into_vec();

        for decoded in [decode_stream(&bytes).unwrap(), decode_tree(&bytes).unwrap()] {
            assert_eq!(
                decoded.server_sasl_credentials().unwrap().value(),
                b"second"
            );
            assert_eq!(
                decoded.referral_urls(),
                ["ldap://a".to_string(), "ldap://b".to_string()]
            );
        }
    }

    #[test]
    fn tree_mode_requires_three_elements() {
        let element = BerElement::sequence(
            TYPE_BIND_RESPONSE,
            &[BerElement::enumerated(0), BerElement::octet_string("")],
        );
        assert!(matches!(
            BindResponseProtocolOp::decode(&element),
            Err(DecodeError::ElementCount { count: 2 })
        ));
    }

    #[test]
    fn stream_mode_rejects_wrong_outer_tag() {
        let bytes = [0x65, 0x07, 0x0A, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00];
        assert!(matches!(
            decode_stream(&bytes),
            Err(DecodeError::TagMismatch { expected: TYPE_BIND_RESPONSE, tag: 0x65 })
        ));
    }

    #[test]
    fn truncated_input_is_an_error_not_a_panic() {
        let full = full_op().encode().to_vec();
        for cut in 1..full.len() {
            assert!(decode_stream(&full[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn large_result_code_survives_verbatim() {
        let op = BindResponseProtocolOp::new(4096, None, None, vec![], None);
        let bytes = op.encode().to_vec();
        assert_eq!(decode_stream(&bytes).unwrap().result_code(), 4096);
        assert_eq!(decode_tree(&bytes).unwrap().result_code(), 4096);
    }

    #[test]
    fn render_minimal() {
        let op = BindResponseProtocolOp::new(RESULT_SUCCESS, None, None, vec![], None);
        assert_eq!(op.to_string(), "BindResponseProtocolOp(resultCode=0)");
    }

    #[test]
    fn render_full_fields_but_never_credentials() {
        let op = full_op();
        assert_eq!(
            op.to_string(),
            "BindResponseProtocolOp(resultCode=49, \
             matchedDN='dc=example,dc=com', \
             diagnosticMessage='invalid credentials', \
             referralURLs={'ldap://a','ldap://b'})"
        );
        assert!(!op.to_string().contains("challenge"));
    }

    #[test]
    fn render_referrals_without_matched_dn() {
        let op = BindResponseProtocolOp::new(
            RESULT_INVALID_CREDENTIALS,
            None,
            Some("invalid credentials".to_string()),
            vec!["ldap://a".to_string(), "ldap://b".to_string()],
            None,
        );
        assert_eq!(
            op.to_string(),
            "BindResponseProtocolOp(resultCode=49, \
             diagnosticMessage='invalid credentials', \
             referralURLs={'ldap://a','ldap://b'})"
        );
    }

    #[test]
    fn projection_to_and_from_bind_result() {
        let op = full_op();
        let controls = vec![Control {
            oid: "1.3.6.1.4.1.42.2.27.8.5.1".to_string(),
            critical: false,
            value: None,
        }];
        let result = op.to_bind_result(controls.clone());

        assert_eq!(result.message_id, -1);
        assert_eq!(result.result_code, RESULT_INVALID_CREDENTIALS);
        assert_eq!(result.matched_dn.as_deref(), Some("dc=example,dc=com"));
        assert_eq!(
            result.diagnostic_message.as_deref(),
            Some("invalid credentials")
        );
        assert_eq!(result.referral_urls, op.referral_urls());
        assert_eq!(result.controls, controls);
        assert_eq!(
            result.server_sasl_credentials.as_ref().unwrap().value(),
            b"challenge"
        );

        assert_eq!(BindResponseProtocolOp::from_result(&result), op);
    }
}
