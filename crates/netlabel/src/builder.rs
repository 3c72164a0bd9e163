//! Builder for constructing netlink request messages.

use crate::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use crate::error::{Error, Result};
use crate::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Largest attribute payload that fits the 16-bit length field.
pub const MAX_ATTR_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for constructing netlink messages.
///
/// The netlink header is written up front with a placeholder length;
/// `finish` patches it once the payload is complete. An attribute or
/// nest too large for the 16-bit length field poisons the builder and
/// `finish` reports it, so append calls stay chainable inside build
/// closures.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    oversize: Option<usize>,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[..std::mem::size_of::<NlMsgHdr>()].copy_from_slice(header.as_bytes());
        Self {
            buf,
            oversize: None,
        }
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

    /// Append an attribute with the given type and data.
    ///
    /// A payload over [`MAX_ATTR_PAYLOAD`] cannot be framed; it is not
    /// written and the error surfaces from `finish`.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        if data.len() > MAX_ATTR_PAYLOAD {
            self.oversize.get_or_insert(data.len());
            return;
        }
        let attr = NlAttr::new(attr_type, data.len());
        self.buf.extend_from_slice(attr.as_bytes());
        self.buf.extend_from_slice(data);
        // Pad to alignment
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) {
        self.append_attr(attr_type, &[value]);
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0); // null terminator
        self.append_attr(attr_type, &data);
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
    pub fn nest_end(&mut self, token: NestToken) {
        let len = self.buf.len() - token.offset;
        if len > u16::MAX as usize {
            self.oversize.get_or_insert(len - NLA_HDRLEN);
            return;
        }
        // Update the length in the nested attribute header
        let len_bytes = (len as u16).to_ne_bytes();
        self.buf[token.offset] = len_bytes[0];
        self.buf[token.offset + 1] = len_bytes[1];
        // Ensure alignment
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
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
    ///
    /// Fails if any appended attribute or nest was too large to frame.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if let Some(len) = self.oversize {
            return Err(Error::Encoding { len });
        }
        // Update message length in header
        let len = self.buf.len() as u32;
        let len_bytes = len.to_ne_bytes();
        self.buf[0..4].copy_from_slice(&len_bytes);
        Ok(self.buf)
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{AttrIter, NLA_HDRLEN, NlAttr, find_attr, get};
    use crate::message::{NLM_F_ACK, NLM_F_REQUEST};

    #[test]
    fn test_header_only_message() {
        let msg = MessageBuilder::new(27, NLM_F_REQUEST | NLM_F_ACK).finish().unwrap();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 27);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
    }

    #[test]
    fn test_length_patched_on_finish() {
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        builder.append_attr_u32(4, 16);
        builder.append_attr_str(1, "web");
        let msg = builder.finish().unwrap();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, msg.len());

        let attrs: Vec<_> = AttrIter::new(&msg[NLMSG_HDRLEN..]).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(get::u32_ne(attrs[0].1).unwrap(), 16);
        assert_eq!(get::string(attrs[1].1).unwrap(), "web");
    }

    #[test]
    fn test_str_attr_carries_terminator() {
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        builder.append_attr_str(1, "lo");
        let msg = builder.finish().unwrap();

        let payload = find_attr(&msg[NLMSG_HDRLEN..], 1).unwrap();
        assert_eq!(payload, b"lo\0");
    }

    #[test]
    fn test_nested_attribute_length() {
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        let nest = builder.nest_start(4);
        builder.append_attr_u32(1, 100);
        builder.append_attr_u32(2, 200);
        builder.nest_end(nest);
        let msg = builder.finish().unwrap();

        let outer = NlAttr::from_bytes(&msg[NLMSG_HDRLEN..]).unwrap();
        assert!(outer.is_nested());
        assert_eq!(outer.kind(), 4);
        // nest header + two u32 attrs
        assert_eq!(outer.nla_len as usize, NLA_HDRLEN + 2 * (NLA_HDRLEN + 4));

        let inner_data = find_attr(&msg[NLMSG_HDRLEN..], 4).unwrap();
        assert_eq!(get::u32_ne(find_attr(inner_data, 1).unwrap()).unwrap(), 100);
        assert_eq!(get::u32_ne(find_attr(inner_data, 2).unwrap()).unwrap(), 200);
    }

    #[test]
    fn test_seq_and_pid() {
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        builder.set_seq(0xdead);
        builder.set_pid(0xbeef);
        let msg = builder.finish().unwrap();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_seq, 0xdead);
        assert_eq!(header.nlmsg_pid, 0xbeef);
    }

    #[test]
    fn test_oversized_attribute_rejected() {
        let huge = vec![0u8; 70_000];
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        builder.append_attr(1, &huge);

        // Nothing of the oversized attribute reaches the buffer, and
        // finishing reports the failure instead of emitting a frame
        // with a wrapped length field.
        assert_eq!(builder.len(), NLMSG_HDRLEN);
        assert!(matches!(
            builder.finish(),
            Err(Error::Encoding { len: 70_000 })
        ));
    }

    #[test]
    fn test_oversized_nest_rejected() {
        let chunk = vec![0u8; MAX_ATTR_PAYLOAD];
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        let nest = builder.nest_start(4);
        builder.append_attr(1, &chunk);
        builder.append_attr(2, &chunk);
        builder.nest_end(nest);

        assert!(matches!(builder.finish(), Err(Error::Encoding { .. })));
    }

    #[test]
    fn test_max_payload_attribute_accepted() {
        let data = vec![0xabu8; MAX_ATTR_PAYLOAD];
        let mut builder = MessageBuilder::new(27, NLM_F_REQUEST);
        builder.append_attr(1, &data);
        let msg = builder.finish().unwrap();

        let attr = NlAttr::from_bytes(&msg[NLMSG_HDRLEN..]).unwrap();
        assert_eq!(attr.nla_len, u16::MAX);
        assert_eq!(find_attr(&msg[NLMSG_HDRLEN..], 1).unwrap(), &data[..]);
    }
}
