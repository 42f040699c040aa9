//! Action records and the ordered chain that carries them.

use crate::error::{Error, Result};
use crate::stats::ActionStats;
use crate::types::{TCA_ACT_MAX_PRIO, TCKINDSIZ};
use std::any::Any;
use std::sync::{Arc, Weak};

/// Largest attribute payload a u16 length field can describe.
const MAX_ATTR_PAYLOAD: usize = u16::MAX as usize - crate::attr::NLA_HDRLEN;

/// Typed per-kind parameter data attached to an action by its codec.
pub trait ActionParms: Any + Send + Sync + std::fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + std::fmt::Debug> ActionParms for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A network link an action refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Interface index.
    pub ifindex: i32,
    /// Interface name.
    pub name: String,
}

/// Resolves an interface index to a shared link record, typically
/// backed by a link cache.
pub trait LinkResolver {
    /// Look up a link by interface index. `None` when unknown.
    fn resolve(&self, ifindex: i32) -> Option<Arc<Link>>;
}

/// One traffic-control action.
#[derive(Debug, Default)]
pub struct Action {
    kind: Option<String>,
    options: Option<Vec<u8>>,
    parms: Option<Box<dyn ActionParms>>,
    /// Counters reported by the kernel.
    pub stats: ActionStats,
    /// Address family from the enclosing message.
    pub family: u8,
    /// Interface index the action is bound to, 0 when unbound.
    pub ifindex: i32,
    link: Option<Weak<Link>>,
}

impl Action {
    /// Create an empty action.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an action of the given kind.
    pub fn with_kind(kind: &str) -> Result<Self> {
        let mut act = Self::new();
        act.set_kind(kind)?;
        Ok(act)
    }

    /// Set the action kind. Must fit the kernel's kind buffer
    /// (TCKINDSIZ including the terminator).
    pub fn set_kind(&mut self, kind: &str) -> Result<()> {
        if kind.len() >= TCKINDSIZ {
            return Err(Error::Range(format!(
                "kind {:?} exceeds {} bytes",
                kind,
                TCKINDSIZ - 1
            )));
        }
        self.kind = Some(kind.to_owned());
        Ok(())
    }

    /// The action kind, if set.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Set the raw options blob re-emitted verbatim when no codec
    /// handles this kind.
    pub fn set_options(&mut self, options: Vec<u8>) -> Result<()> {
        if options.len() > MAX_ATTR_PAYLOAD {
            return Err(Error::Range(format!(
                "options blob of {} bytes cannot fit one attribute",
                options.len()
            )));
        }
        self.options = Some(options);
        Ok(())
    }

    /// The raw options blob, if any.
    pub fn options(&self) -> Option<&[u8]> {
        self.options.as_deref()
    }

    /// Attach typed per-kind parameters.
    pub fn set_parms<P: ActionParms>(&mut self, parms: P) {
        self.parms = Some(Box::new(parms));
    }

    /// Typed per-kind parameters, if a codec attached them.
    pub fn parms<P: 'static>(&self) -> Option<&P> {
        self.parms.as_deref()?.as_any().downcast_ref()
    }

    /// Whether any typed parameters are attached.
    pub fn has_parms(&self) -> bool {
        self.parms.is_some()
    }

    /// Store a non-owning reference to the action's link.
    pub fn set_link(&mut self, link: &Arc<Link>) {
        self.link = Some(Arc::downgrade(link));
    }

    /// The action's link, if resolved and still alive.
    pub fn link(&self) -> Option<Arc<Link>> {
        self.link.as_ref()?.upgrade()
    }
}

/// Ordered chain of shared action records.
///
/// Traversal order is wire order. Records are reference counted so a
/// caller can retain one past the chain's lifetime with `Arc::clone`.
#[derive(Debug, Default)]
pub struct ActionChain {
    actions: Vec<Arc<Action>>,
}

impl ActionChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to the end of the chain.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the chain already
    /// holds `TCA_ACT_MAX_PRIO` records, leaving it unmodified.
    pub fn append(&mut self, action: Arc<Action>) -> Result<()> {
        if self.actions.len() >= TCA_ACT_MAX_PRIO {
            return Err(Error::CapacityExceeded {
                limit: TCA_ACT_MAX_PRIO,
            });
        }
        self.actions.push(action);
        Ok(())
    }

    /// Remove an action by identity, returning it.
    ///
    /// Matches by pointer, not content. [`Error::NotFound`] when the
    /// record is not a member; the chain is unchanged.
    pub fn remove(&mut self, action: &Arc<Action>) -> Result<Arc<Action>> {
        let pos = self
            .actions
            .iter()
            .position(|a| Arc::ptr_eq(a, action))
            .ok_or(Error::NotFound)?;
        Ok(self.actions.remove(pos))
    }

    /// Drop every owning reference in traversal order, emptying the
    /// chain.
    pub fn put_all(&mut self) {
        self.actions.clear();
    }

    /// Iterate over the records in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.iter()
    }

    /// Number of records in the chain.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the chain has no records.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Record at a zero-based position.
    pub fn get(&self, index: usize) -> Option<&Arc<Action>> {
        self.actions.get(index)
    }
}

impl<'a> IntoIterator for &'a ActionChain {
    type Item = &'a Arc<Action>;
    type IntoIter = std::slice::Iter<'a, Arc<Action>>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
