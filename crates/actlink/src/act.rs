//! Action chain wire format: filling chains into messages, parsing
//! them back out, and building the kernel requests.

use crate::action::{Action, ActionChain, LinkResolver};
use crate::attr::{AttrPolicy, get, parse_attrs};
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::message::{
    NLM_F_ACK, NLM_F_DUMP, NLM_F_REPLACE, NLM_F_REQUEST, NLMSG_HDRLEN, NlMsgHdr, NlMsgType,
    nlmsg_align,
};
use crate::stats::decode_stats;
use crate::types::{
    TCA_ACT_KIND, TCA_ACT_MAX, TCA_ACT_MAX_PRIO, TCA_ACT_OPTIONS, TCA_ACT_STATS, TCA_ACT_TAB,
    TCAMSG_HDRLEN, TCKINDSIZ, TcaMsg,
};
use crate::codec::{CodecRegistry, OptionsEncoding};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, trace};

/// Fill one action record into its order-tagged nest.
fn fill_one(
    builder: &mut MessageBuilder,
    order: u16,
    action: &Action,
    registry: &CodecRegistry,
) -> Result<()> {
    let record = builder.nest_start(order);

    if let Some(kind) = action.kind() {
        builder.append_attr_str(TCA_ACT_KIND, kind)?;
    }

    match action.kind().and_then(|k| registry.lookup(k)) {
        Some(codec) if action.has_parms() => match codec.encoding() {
            OptionsEncoding::Nested => {
                let opts = builder.nest_start(TCA_ACT_OPTIONS);
                codec.encode(action, builder)?;
                builder.nest_end(opts)?;
            }
            OptionsEncoding::Raw => codec.encode(action, builder)?,
        },
        _ => {
            // no codec or no typed parms: re-emit the retained blob
            if let Some(blob) = action.options() {
                builder.append_attr(TCA_ACT_OPTIONS, blob)?;
            }
        }
    }

    builder.nest_end(record)?;
    Ok(())
}

/// Fill a whole chain into the TCA_ACT_TAB nest.
///
/// Records are tagged with their 1-based position. A codec failure
/// aborts the build; the caller discards the builder.
pub fn fill_actions(
    builder: &mut MessageBuilder,
    chain: &ActionChain,
    registry: &CodecRegistry,
) -> Result<()> {
    let tab = builder.nest_start(TCA_ACT_TAB);
    for (i, action) in chain.iter().enumerate() {
        fill_one(builder, (i + 1) as u16, action, registry)?;
    }
    builder.nest_end(tab)?;
    Ok(())
}

/// Build a complete action message: nlmsghdr, tcamsg, then the chain.
pub fn build_action_request(
    msg_type: u16,
    flags: u16,
    chain: &ActionChain,
    registry: &CodecRegistry,
) -> Result<Vec<u8>> {
    let mut builder = MessageBuilder::new(msg_type, flags);
    builder.append(&TcaMsg::new());
    fill_actions(&mut builder, chain, registry)?;
    debug!(msg_type, flags, actions = chain.len(), "built action request");
    Ok(builder.finish())
}

/// Build an add request (RTM_NEWACTION).
///
/// `flags` may add NLM_F_CREATE or NLM_F_EXCL.
pub fn build_add_request(
    chain: &ActionChain,
    registry: &CodecRegistry,
    flags: u16,
) -> Result<Vec<u8>> {
    build_action_request(
        NlMsgType::RTM_NEWACTION,
        NLM_F_REQUEST | NLM_F_ACK | flags,
        chain,
        registry,
    )
}

/// Build a change request (RTM_NEWACTION with NLM_F_REPLACE forced).
pub fn build_change_request(
    chain: &ActionChain,
    registry: &CodecRegistry,
    flags: u16,
) -> Result<Vec<u8>> {
    build_action_request(
        NlMsgType::RTM_NEWACTION,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_REPLACE | flags,
        chain,
        registry,
    )
}

/// Build a dump request (RTM_GETACTION): header plus tcamsg, nothing
/// else.
pub fn build_dump_request() -> Vec<u8> {
    let mut builder = MessageBuilder::new(NlMsgType::RTM_GETACTION, NLM_F_REQUEST | NLM_F_DUMP);
    builder.append(&TcaMsg::new());
    builder.finish()
}

/// Parse one action record nest.
fn parse_one(payload: &[u8], registry: &CodecRegistry) -> Result<Action> {
    let tb = parse_attrs(payload, TCA_ACT_MAX, AttrPolicy::empty())?;

    let kind_data = tb[TCA_ACT_KIND as usize].ok_or(Error::MissingAttribute("TCA_ACT_KIND"))?;
    let kind = get::string(kind_data)?;
    let mut action = Action::with_kind(kind)?;

    if let Some(opts) = tb[TCA_ACT_OPTIONS as usize] {
        action.set_options(opts.to_vec())?;
        if let Some(codec) = registry.lookup(kind) {
            codec.decode(opts, &mut action)?;
        }
    }

    if let Some(stats) = tb[TCA_ACT_STATS as usize] {
        action.stats = decode_stats(stats)?;
    }

    trace!(kind, "parsed action record");
    Ok(action)
}

/// Parse the payload of a TCA_ACT_TAB nest into owned records.
///
/// All-or-nothing: any record failing to parse fails the whole call.
fn parse_actions_raw(tab: &[u8], registry: &CodecRegistry) -> Result<Vec<Action>> {
    let tb = parse_attrs(tab, TCA_ACT_MAX_PRIO as u16, AttrPolicy::empty())?;
    let mut actions = Vec::new();
    for order in 1..=TCA_ACT_MAX_PRIO {
        if let Some(record) = tb[order] {
            actions.push(parse_one(record, registry)?);
        }
    }
    Ok(actions)
}

/// Parse a TCA_ACT_TAB payload into a chain. Gaps in the order tags
/// are skipped; traversal order follows ascending tags.
pub fn parse_actions(tab: &[u8], registry: &CodecRegistry) -> Result<ActionChain> {
    let mut chain = ActionChain::new();
    for action in parse_actions_raw(tab, registry)? {
        chain.append(Arc::new(action))?;
    }
    Ok(chain)
}

/// Parse a complete action message (nlmsghdr + tcamsg + attributes).
///
/// TCA_ACT_TAB must be present. Each record inherits the message
/// family; when a resolver is given, each record's link is looked up
/// by interface index. Resolution failure is not an error.
pub fn parse_action_message(
    data: &[u8],
    registry: &CodecRegistry,
    resolver: Option<&dyn LinkResolver>,
) -> Result<ActionChain> {
    let header = NlMsgHdr::from_bytes(data)?;
    if !matches!(
        header.nlmsg_type,
        NlMsgType::RTM_NEWACTION | NlMsgType::RTM_DELACTION | NlMsgType::RTM_GETACTION
    ) {
        return Err(Error::InvalidMessage(format!(
            "not an action message: type {}",
            header.nlmsg_type
        )));
    }

    let msg_len = header.nlmsg_len as usize;
    if msg_len < NLMSG_HDRLEN || msg_len > data.len() {
        return Err(Error::Truncated {
            expected: msg_len,
            actual: data.len(),
        });
    }
    let payload = &data[NLMSG_HDRLEN..msg_len];

    let tca = TcaMsg::from_bytes(payload)?;
    let attrs = &payload[nlmsg_align(TCAMSG_HDRLEN)..];
    let tb = parse_attrs(attrs, TCA_ACT_TAB, AttrPolicy::empty())?;
    let tab = tb[TCA_ACT_TAB as usize].ok_or(Error::MissingAttribute("TCA_ACT_TAB"))?;

    let mut actions = parse_actions_raw(tab, registry)?;
    for action in &mut actions {
        action.family = tca.tca_family;
        if action.ifindex != 0
            && let Some(resolver) = resolver
            && let Some(link) = resolver.resolve(action.ifindex)
        {
            action.set_link(&link);
        }
    }

    debug!(actions = actions.len(), "parsed action message");
    let mut chain = ActionChain::new();
    for action in actions {
        chain.append(Arc::new(action))?;
    }
    Ok(chain)
}

/// Parse a message and deliver each record to a callback in chain
/// order. `ControlFlow::Break` stops delivery; the fully parsed chain
/// is returned either way.
pub fn parse_and_deliver<F>(
    data: &[u8],
    registry: &CodecRegistry,
    resolver: Option<&dyn LinkResolver>,
    mut deliver: F,
) -> Result<ActionChain>
where
    F: FnMut(&Arc<Action>) -> ControlFlow<()>,
{
    let chain = parse_action_message(data, registry, resolver)?;
    for action in chain.iter() {
        if deliver(action).is_break() {
            break;
        }
    }
    Ok(chain)
}

/// Identifying attribute tags for delete requests.
mod del {
    pub const IFINDEX: u16 = 1;
    pub const PRIORITY: u16 = 2;
    pub const PROTOCOL: u16 = 3;
    pub const HANDLE: u16 = 4;
    pub const PARENT: u16 = 5;
    pub const KIND: u16 = 6;
    pub const MAX: u16 = 6;
}

/// Identifying attributes for deleting a single action binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Interface the action is bound on.
    pub ifindex: i32,
    /// Filter priority.
    pub priority: u32,
    /// Ethertype the filter matches, host order.
    pub protocol: u16,
    /// Filter handle.
    pub handle: u32,
    /// Parent qdisc handle. `None` means the implicit root.
    pub parent: Option<u32>,
    /// Action kind; when set, the kernel must also match it.
    pub kind: Option<String>,
}

impl DeleteRequest {
    /// Delete request with the required identifying fields.
    pub fn new(ifindex: i32, priority: u32, protocol: u16, handle: u32) -> Self {
        Self {
            ifindex,
            priority,
            protocol,
            handle,
            parent: None,
            kind: None,
        }
    }
}

/// Build a delete request (RTM_DELACTION) from the identifying set.
pub fn build_delete_request(request: &DeleteRequest, flags: u16) -> Result<Vec<u8>> {
    if let Some(kind) = &request.kind
        && kind.len() >= TCKINDSIZ
    {
        return Err(Error::Range(format!(
            "kind {:?} exceeds {} bytes",
            kind,
            TCKINDSIZ - 1
        )));
    }

    let mut builder = MessageBuilder::new(
        NlMsgType::RTM_DELACTION,
        NLM_F_REQUEST | NLM_F_ACK | flags,
    );
    builder.append(&TcaMsg::new());
    builder.append_attr_i32(del::IFINDEX, request.ifindex);
    builder.append_attr_u32(del::PRIORITY, request.priority);
    builder.append_attr_u16(del::PROTOCOL, request.protocol);
    builder.append_attr_u32(del::HANDLE, request.handle);
    if let Some(parent) = request.parent {
        builder.append_attr_u32(del::PARENT, parent);
    }
    if let Some(kind) = &request.kind {
        builder.append_attr_str(del::KIND, kind)?;
    }
    Ok(builder.finish())
}

/// Recover the identifying set from a delete request message.
pub fn parse_delete_request(data: &[u8]) -> Result<DeleteRequest> {
    let header = NlMsgHdr::from_bytes(data)?;
    if header.nlmsg_type != NlMsgType::RTM_DELACTION {
        return Err(Error::InvalidMessage(format!(
            "not a delete request: type {}",
            header.nlmsg_type
        )));
    }

    let msg_len = header.nlmsg_len as usize;
    if msg_len < NLMSG_HDRLEN || msg_len > data.len() {
        return Err(Error::Truncated {
            expected: msg_len,
            actual: data.len(),
        });
    }
    let payload = &data[NLMSG_HDRLEN..msg_len];
    TcaMsg::from_bytes(payload)?;

    let attrs = &payload[nlmsg_align(TCAMSG_HDRLEN)..];
    let tb = parse_attrs(attrs, del::MAX, AttrPolicy::empty())?;

    let ifindex = get::i32_ne(tb[del::IFINDEX as usize].ok_or(Error::MissingAttribute("ifindex"))?)?;
    let priority =
        get::u32_ne(tb[del::PRIORITY as usize].ok_or(Error::MissingAttribute("priority"))?)?;
    let protocol =
        get::u16_ne(tb[del::PROTOCOL as usize].ok_or(Error::MissingAttribute("protocol"))?)?;
    let handle = get::u32_ne(tb[del::HANDLE as usize].ok_or(Error::MissingAttribute("handle"))?)?;

    let parent = match tb[del::PARENT as usize] {
        Some(data) => Some(get::u32_ne(data)?),
        None => None,
    };
    let kind = match tb[del::KIND as usize] {
        Some(data) => Some(get::string(data)?.to_owned()),
        None => None,
    };

    Ok(DeleteRequest {
        ifindex,
        priority,
        protocol,
        handle,
        parent,
        kind,
    })
}
