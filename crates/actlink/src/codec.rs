//! Per-kind option codecs and the registry that holds them.

use crate::action::Action;
use crate::attr::{AttrPolicy, parse_attrs};
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::types::{
    TC_ACT_OK, TC_ACT_SHOT, TCA_EGRESS_MIRROR, TCA_EGRESS_REDIR, TCA_GACT_PARMS, TCA_GACT_PROB,
    TCA_MIRRED_PARMS, TcGen, TcMirred,
};
use zerocopy::{FromBytes, IntoBytes};

/// How a kind's options appear on the wire.
///
/// Chosen once per kind; the two forms are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsEncoding {
    /// Options live inside a TCA_ACT_OPTIONS nest.
    Nested,
    /// The codec writes attributes directly into the record nest.
    Raw,
}

/// Encode/decode capability for one action kind.
pub trait ActionCodec: Send + Sync {
    /// The kind string this codec handles.
    fn kind(&self) -> &'static str;

    /// Wire form of this kind's options.
    fn encoding(&self) -> OptionsEncoding;

    /// Write the action's options into the builder. For
    /// [`OptionsEncoding::Nested`] the TCA_ACT_OPTIONS nest is already
    /// open; for [`OptionsEncoding::Raw`] attributes land directly in
    /// the record nest.
    fn encode(&self, action: &Action, builder: &mut MessageBuilder) -> Result<()>;

    /// Interpret a TCA_ACT_OPTIONS payload, attaching typed parameters
    /// to the record.
    fn decode(&self, payload: &[u8], action: &mut Action) -> Result<()>;
}

/// Lookup table from kind string to codec.
///
/// An explicit object rather than process-global state: callers build
/// one, register what they need, and pass it to build/parse entry
/// points.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: Vec<Box<dyn ActionCodec>>,
}

impl CodecRegistry {
    /// Registry with no codecs. Unknown kinds fall back to opaque
    /// blob handling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `gact` and `mirred`
    /// codecs.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        // fresh registry, duplicates impossible
        let _ = reg.register(Box::new(GactCodec));
        let _ = reg.register(Box::new(MirredCodec));
        reg
    }

    /// Register a codec. Fails if the kind is already taken.
    pub fn register(&mut self, codec: Box<dyn ActionCodec>) -> Result<()> {
        if self.lookup(codec.kind()).is_some() {
            return Err(Error::Range(format!(
                "codec for kind {:?} already registered",
                codec.kind()
            )));
        }
        self.codecs.push(codec);
        Ok(())
    }

    /// Find the codec for a kind.
    pub fn lookup(&self, kind: &str) -> Option<&dyn ActionCodec> {
        self.codecs
            .iter()
            .find(|c| c.kind() == kind)
            .map(|c| c.as_ref())
    }
}

const GACT_POLICY: AttrPolicy<'static> =
    AttrPolicy::new(&[(TCA_GACT_PARMS, std::mem::size_of::<TcGen>())]);

/// Codec for the generic verdict action.
pub struct GactCodec;

impl ActionCodec for GactCodec {
    fn kind(&self) -> &'static str {
        "gact"
    }

    fn encoding(&self) -> OptionsEncoding {
        OptionsEncoding::Nested
    }

    fn encode(&self, action: &Action, builder: &mut MessageBuilder) -> Result<()> {
        let parms: &TcGen = action
            .parms()
            .ok_or(Error::MissingAttribute("TCA_GACT_PARMS"))?;
        builder.append_attr(TCA_GACT_PARMS, parms.as_bytes())
    }

    fn decode(&self, payload: &[u8], action: &mut Action) -> Result<()> {
        let tb = parse_attrs(payload, TCA_GACT_PROB, GACT_POLICY)?;
        let data = tb[TCA_GACT_PARMS as usize].ok_or(Error::MissingAttribute("TCA_GACT_PARMS"))?;
        let (parms, _) = TcGen::read_from_prefix(data).map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<TcGen>(),
            actual: data.len(),
        })?;
        action.set_parms(parms);
        Ok(())
    }
}

const MIRRED_POLICY: AttrPolicy<'static> =
    AttrPolicy::new(&[(TCA_MIRRED_PARMS, std::mem::size_of::<TcMirred>())]);

/// Codec for the mirror/redirect action.
pub struct MirredCodec;

impl ActionCodec for MirredCodec {
    fn kind(&self) -> &'static str {
        "mirred"
    }

    fn encoding(&self) -> OptionsEncoding {
        OptionsEncoding::Nested
    }

    fn encode(&self, action: &Action, builder: &mut MessageBuilder) -> Result<()> {
        let parms: &TcMirred = action
            .parms()
            .ok_or(Error::MissingAttribute("TCA_MIRRED_PARMS"))?;
        builder.append_attr(TCA_MIRRED_PARMS, parms.as_bytes())
    }

    fn decode(&self, payload: &[u8], action: &mut Action) -> Result<()> {
        let tb = parse_attrs(payload, TCA_MIRRED_PARMS, MIRRED_POLICY)?;
        let data =
            tb[TCA_MIRRED_PARMS as usize].ok_or(Error::MissingAttribute("TCA_MIRRED_PARMS"))?;
        let (parms, _) = TcMirred::read_from_prefix(data).map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<TcMirred>(),
            actual: data.len(),
        })?;
        action.ifindex = parms.ifindex as i32;
        action.set_parms(parms);
        Ok(())
    }
}

/// Generic verdict action with the given tc_gen action code.
pub fn gact(verdict: i32) -> Result<Action> {
    let mut act = Action::with_kind("gact")?;
    act.set_parms(TcGen {
        action: verdict,
        ..Default::default()
    });
    Ok(act)
}

/// gact that drops matched packets.
pub fn gact_drop() -> Result<Action> {
    gact(TC_ACT_SHOT)
}

/// gact that accepts matched packets.
pub fn gact_pass() -> Result<Action> {
    gact(TC_ACT_OK)
}

fn mirred(eaction: i32, ifindex: u32) -> Result<Action> {
    let mut act = Action::with_kind("mirred")?;
    act.set_parms(TcMirred {
        eaction,
        ifindex,
        ..Default::default()
    });
    Ok(act)
}

/// mirred that mirrors matched packets to a device's egress.
pub fn mirred_mirror(ifindex: u32) -> Result<Action> {
    mirred(TCA_EGRESS_MIRROR, ifindex)
}

/// mirred that redirects matched packets to a device's egress.
pub fn mirred_redirect(ifindex: u32) -> Result<Action> {
    mirred(TCA_EGRESS_REDIR, ifindex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{NlAttr, nla_align};
    use crate::message::NLM_F_REQUEST;

    fn attr_bytes(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = NlAttr::new(kind, payload.len()).as_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
        buf
    }

    #[test]
    fn test_registry_lookup() {
        let reg = CodecRegistry::builtin();
        assert!(reg.lookup("gact").is_some());
        assert!(reg.lookup("mirred").is_some());
        assert!(reg.lookup("police").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate() {
        let mut reg = CodecRegistry::builtin();
        assert!(reg.register(Box::new(GactCodec)).is_err());
    }

    #[test]
    fn test_gact_decode() {
        let parms = TcGen {
            index: 5,
            action: TC_ACT_SHOT,
            ..Default::default()
        };
        let payload = attr_bytes(TCA_GACT_PARMS, parms.as_bytes());

        let mut act = Action::with_kind("gact").unwrap();
        GactCodec.decode(&payload, &mut act).unwrap();
        assert_eq!(act.parms::<TcGen>().unwrap(), &parms);
    }

    #[test]
    fn test_gact_decode_missing_parms() {
        let mut act = Action::with_kind("gact").unwrap();
        assert!(matches!(
            GactCodec.decode(&[], &mut act),
            Err(Error::MissingAttribute("TCA_GACT_PARMS"))
        ));
    }

    #[test]
    fn test_gact_decode_short_parms() {
        let payload = attr_bytes(TCA_GACT_PARMS, &[0u8; 8]);
        let mut act = Action::with_kind("gact").unwrap();
        assert!(matches!(
            GactCodec.decode(&payload, &mut act),
            Err(Error::MalformedAttribute { .. })
        ));
    }

    #[test]
    fn test_mirred_round_trip_through_builder() {
        let act = mirred_redirect(7).unwrap();

        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        MirredCodec.encode(&act, &mut builder).unwrap();
        let msg = builder.finish();

        let payload = &msg[crate::message::NLMSG_HDRLEN..];
        let mut decoded = Action::with_kind("mirred").unwrap();
        MirredCodec.decode(payload, &mut decoded).unwrap();

        let parms = decoded.parms::<TcMirred>().unwrap();
        assert_eq!(parms.eaction, TCA_EGRESS_REDIR);
        assert_eq!(parms.ifindex, 7);
    }

    #[test]
    fn test_encode_without_parms_fails() {
        let act = Action::with_kind("gact").unwrap();
        let mut builder = MessageBuilder::new(48, NLM_F_REQUEST);
        assert!(GactCodec.encode(&act, &mut builder).is_err());
    }
}
