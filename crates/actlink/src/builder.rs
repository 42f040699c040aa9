//! Message builder for constructing netlink messages.

use crate::attr::{NLA_F_NESTED, NLA_MAX_PAYLOAD, NlAttr, nla_align};
use crate::error::{Error, Result};
use crate::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};
use zerocopy::{Immutable, IntoBytes};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self { buf }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        // Pad to alignment
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a fixed-size struct to the message.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    /// Write an attribute header and payload. Length fit is the
    /// caller's responsibility.
    fn push_attr(&mut self, attr_type: u16, data: &[u8]) {
        let attr = NlAttr::new(attr_type, data.len());
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        // Pad to alignment
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append an attribute with the given type and data.
    ///
    /// Fails when the payload cannot fit the u16 attribute length
    /// field; the builder must be discarded on failure.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        if data.len() > NLA_MAX_PAYLOAD {
            return Err(Error::Range(format!(
                "attribute payload of {} bytes exceeds {}",
                data.len(),
                NLA_MAX_PAYLOAD
            )));
        }
        self.push_attr(attr_type, data);
        Ok(())
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) {
        self.push_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.push_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append an i32 attribute (native endian).
    pub fn append_attr_i32(&mut self, attr_type: u16, value: i32) {
        self.push_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = value.as_bytes().to_vec();
        data.push(0); // null terminator
        self.append_attr(attr_type, &data)
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        // Write placeholder header with nested flag
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.buf.extend_from_slice(attr.as_bytes());
        NestToken { offset }
    }

    /// End a nested attribute started with `nest_start`.
    ///
    /// Fails when the nest has grown past what the u16 attribute
    /// length field can describe; the builder must be discarded on
    /// failure.
    pub fn nest_end(&mut self, token: NestToken) -> Result<()> {
        let len = self.buf.len() - token.offset;
        if len > u16::MAX as usize {
            return Err(Error::Range(format!(
                "nested attribute of {} bytes exceeds {}",
                len,
                u16::MAX
            )));
        }
        // Update the length in the nested attribute header
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset] = len_bytes[0];
        self.buf[token.offset + 1] = len_bytes[1];
        // Ensure alignment
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
        Ok(())
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        let bytes = seq.to_ne_bytes();
        self.buf[8..12].copy_from_slice(&bytes);
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        let bytes = pid.to_ne_bytes();
        self.buf[12..16].copy_from_slice(&bytes);
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        // Update message length in header
        let len = self.buf.len() as u32;
        let len_bytes = len.to_ne_bytes();
        self.buf[0..4].copy_from_slice(&len_bytes);
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttrIter, NLA_F_NESTED, NLA_HDRLEN, NlAttr};
    use crate::message::NLM_F_REQUEST;

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(48, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 48);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_attribute() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        builder.append_attr_u32(1, 0x12345678);
        let msg = builder.finish();

        assert_eq!(msg.len(), NLMSG_HDRLEN + NLA_HDRLEN + 4);
        let (kind, payload) = AttrIter::new(&msg[NLMSG_HDRLEN..]).next().unwrap();
        assert_eq!(kind, 1);
        assert_eq!(payload, &0x12345678u32.to_ne_bytes());
    }

    #[test]
    fn test_attribute_padding() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        builder.append_attr_str(1, "tc").unwrap();
        let msg = builder.finish();

        // "tc\0" is 3 bytes, padded to 4
        assert_eq!(msg.len(), NLMSG_HDRLEN + NLA_HDRLEN + 4);
        let attr = NlAttr::from_bytes(&msg[NLMSG_HDRLEN..]).unwrap();
        assert_eq!(attr.payload_len(), 3);
    }

    #[test]
    fn test_oversized_attribute_rejected() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        let data = vec![0u8; crate::attr::NLA_MAX_PAYLOAD + 1];
        assert!(matches!(
            builder.append_attr(1, &data),
            Err(crate::error::Error::Range(_))
        ));
    }

    #[test]
    fn test_oversized_nest_rejected() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        let nest = builder.nest_start(1);
        // two payloads that each fit an attribute but together
        // overflow the enclosing nest's u16 length field
        let data = vec![0u8; 40 * 1024];
        builder.append_attr(2, &data).unwrap();
        builder.append_attr(3, &data).unwrap();
        assert!(matches!(
            builder.nest_end(nest),
            Err(crate::error::Error::Range(_))
        ));
    }

    #[test]
    fn test_nested_attribute() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        let nest = builder.nest_start(1);
        builder.append_attr_u32(2, 100);
        builder.nest_end(nest).unwrap();
        let msg = builder.finish();

        let attr = NlAttr::from_bytes(&msg[NLMSG_HDRLEN..]).unwrap();
        assert!(attr.is_nested());
        assert_eq!(attr.kind(), 1);
        assert_eq!(attr.payload_len(), NLA_HDRLEN + 4);

        let inner = &msg[NLMSG_HDRLEN + NLA_HDRLEN..];
        let (kind, payload) = AttrIter::new(inner).next().unwrap();
        assert_eq!(kind, 2);
        assert_eq!(payload, &100u32.to_ne_bytes());
    }

    #[test]
    fn test_nest_flag_set() {
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        let nest = builder.nest_start(3);
        builder.nest_end(nest).unwrap();
        let msg = builder.finish();

        let raw = u16::from_ne_bytes([msg[NLMSG_HDRLEN + 2], msg[NLMSG_HDRLEN + 3]]);
        assert_eq!(raw & NLA_F_NESTED, NLA_F_NESTED);
    }
}
