//! BER codec for the LDAP bind response protocol op (RFC 4511 section 4.2.2).
//!
//! Decoding works in two modes with identical semantics: streaming over a
//! forward-only [`BerReader`] cursor, or random-access over a materialized
//! [`BerElement`] tree. Encoding mirrors both paths and produces the same
//! bytes either way. Transport, message framing and SASL mechanics live in
//! the surrounding system, not here.

pub mod ber;
pub mod bind_response;
pub mod error;
pub mod result;

pub use ber::{BerElement, BerReader, BerWriter};
pub use bind_response::BindResponseProtocolOp;
pub use error::{DecodeError, Result};
pub use result::{BindResult, Control};
