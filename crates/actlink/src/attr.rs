//! Netlink attribute (nlattr) handling.

use crate::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Largest payload a u16 attribute length field can describe.
pub const NLA_MAX_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nla_len as usize).saturating_sub(NLA_HDRLEN)
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Tolerant: stops at the first structurally bad attribute. Use
/// [`parse_attrs`] when malformed input must be rejected.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLA_HDRLEN {
            return None;
        }

        let attr = match NlAttr::from_bytes(self.data) {
            Ok(a) => a,
            Err(_) => return None,
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > self.data.len() {
            return None;
        }

        let payload = &self.data[NLA_HDRLEN..len];
        let aligned_len = nla_align(len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some((attr.kind(), payload))
    }
}

/// Validation policy for a table parse: minimum payload length per
/// attribute type. Kept as data so new types are additions, not code
/// edits.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttrPolicy<'a> {
    min_len: &'a [(u16, usize)],
}

impl<'a> AttrPolicy<'a> {
    /// Create a policy from a `(type, min_len)` table.
    pub const fn new(min_len: &'a [(u16, usize)]) -> Self {
        Self { min_len }
    }

    /// Policy with no minimum-length requirements.
    pub const fn empty() -> Self {
        Self { min_len: &[] }
    }

    /// Minimum payload length for an attribute type, if declared.
    pub fn min_len(&self, kind: u16) -> Option<usize> {
        self.min_len
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, min)| *min)
    }
}

/// Split a buffer into a table of top-level attribute payloads, indexed
/// by attribute type.
///
/// Types greater than `max_type` are ignored; a type seen twice keeps
/// the last occurrence (kernel convention). Each present attribute is
/// checked against `policy`; a payload shorter than its declared
/// minimum is a fatal [`Error::MalformedAttribute`]. Trailing padding
/// is ignored; a structurally bad length field is
/// [`Error::InvalidAttribute`].
pub fn parse_attrs<'a>(
    data: &'a [u8],
    max_type: u16,
    policy: AttrPolicy<'_>,
) -> Result<Vec<Option<&'a [u8]>>> {
    let mut table: Vec<Option<&'a [u8]>> = vec![None; max_type as usize + 1];
    let mut rest = data;

    while rest.len() >= NLA_HDRLEN {
        let attr = NlAttr::from_bytes(rest)?;
        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN || len > rest.len() {
            return Err(Error::InvalidAttribute(format!(
                "attribute length {} out of bounds ({} bytes remain)",
                len,
                rest.len()
            )));
        }

        let kind = attr.kind();
        let payload = &rest[NLA_HDRLEN..len];

        if kind != 0 && kind <= max_type {
            if let Some(min) = policy.min_len(kind)
                && payload.len() < min
            {
                return Err(Error::MalformedAttribute {
                    kind,
                    len: payload.len(),
                    min,
                });
            }
            table[kind as usize] = Some(payload);
        }

        let aligned = nla_align(len);
        if aligned >= rest.len() {
            break;
        }
        rest = &rest[aligned..];
    }

    Ok(table)
}

/// Helper functions for extracting typed values from attribute payloads.
pub mod get {
    use super::*;

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        if data.is_empty() {
            return Err(Error::InvalidAttribute("empty u8 attribute".into()));
        }
        Ok(data[0])
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        if data.len() < 2 {
            return Err(Error::InvalidAttribute("truncated u16 attribute".into()));
        }
        Ok(u16::from_ne_bytes([data[0], data[1]]))
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated u32 attribute".into()));
        }
        Ok(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        if data.len() < 8 {
            return Err(Error::InvalidAttribute("truncated u64 attribute".into()));
        }
        Ok(u64::from_ne_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]))
    }

    /// Extract an i32 value (native endian).
    pub fn i32_ne(data: &[u8]) -> Result<i32> {
        if data.len() < 4 {
            return Err(Error::InvalidAttribute("truncated i32 attribute".into()));
        }
        Ok(i32::from_ne_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }

    /// Extract bytes (no interpretation).
    pub fn bytes(data: &[u8]) -> &[u8] {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr_bytes(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = NlAttr::new(kind, payload.len()).as_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
        buf
    }

    #[test]
    fn test_nla_align() {
        assert_eq!(nla_align(0), 0);
        assert_eq!(nla_align(1), 4);
        assert_eq!(nla_align(4), 4);
        assert_eq!(nla_align(5), 8);
    }

    #[test]
    fn test_attr_iter() {
        let mut buf = attr_bytes(1, &[0xaa]);
        buf.extend_from_slice(&attr_bytes(2, &0x1234u32.to_ne_bytes()));

        let attrs: Vec<_> = AttrIter::new(&buf).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].0, 1);
        assert_eq!(attrs[0].1, &[0xaa]);
        assert_eq!(attrs[1].0, 2);
        assert_eq!(get::u32_ne(attrs[1].1).unwrap(), 0x1234);
    }

    #[test]
    fn test_parse_attrs_table() {
        let mut buf = attr_bytes(3, b"gact\0");
        buf.extend_from_slice(&attr_bytes(1, &[1, 2, 3, 4]));

        let tb = parse_attrs(&buf, 4, AttrPolicy::empty()).unwrap();
        assert!(tb[2].is_none());
        assert_eq!(get::string(tb[3].unwrap()).unwrap(), "gact");
        assert_eq!(tb[1].unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_attrs_ignores_above_max() {
        let buf = attr_bytes(9, &[0; 4]);
        let tb = parse_attrs(&buf, 4, AttrPolicy::empty()).unwrap();
        assert!(tb.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_parse_attrs_policy_violation() {
        let policy_table = [(1u16, 16usize)];
        let policy = AttrPolicy::new(&policy_table);
        let buf = attr_bytes(1, &[0; 8]);

        let err = parse_attrs(&buf, 4, policy).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedAttribute {
                kind: 1,
                len: 8,
                min: 16
            }
        ));
    }

    #[test]
    fn test_parse_attrs_bad_length() {
        // Header claims 64 bytes but only 8 are present.
        let mut buf = NlAttr::new(1, 60).as_bytes().to_vec();
        buf.extend_from_slice(&[0; 4]);
        assert!(matches!(
            parse_attrs(&buf, 4, AttrPolicy::empty()),
            Err(Error::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_get_string_without_terminator() {
        assert_eq!(get::string(b"mirred").unwrap(), "mirred");
        assert_eq!(get::string(b"mirred\0").unwrap(), "mirred");
    }
}
