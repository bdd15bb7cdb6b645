//! Error types.
//!
//! [`TreeError`] reports contract violations. They are fatal to the flush that hit them: the
//! flush still cleans up its bookkeeping and unmounts the inactive pool, then returns the error.
//! [`BuildError`] is a per-element content failure; the tree logs it and shows the configured
//! error widget in place of the failed child.

use alloc::string::String;

use crate::element::ElementId;
use crate::key::GlobalKey;

/// A violation of the element tree's usage contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TreeError {
    /// An element that was already unmounted was asked to rebuild.
    #[error("element {0:?} is defunct and cannot be rebuilt")]
    DefunctElement(ElementId),
    /// The id does not name an element of this tree.
    #[error("element {0:?} does not belong to this tree")]
    UnknownElement(ElementId),
    /// A global key was bound to a second element while the first one was still active.
    #[error("{key:?} is bound to active element {existing:?} and cannot also bind {element:?}")]
    DuplicateGlobalKey {
        /// The contested key.
        key: GlobalKey,
        /// The element the key was bound to.
        existing: ElementId,
        /// The element that tried to bind the key.
        element: ElementId,
    },
    /// A global-keyed element would become its own descendant.
    #[error("{key:?} cannot be moved underneath itself")]
    GlobalKeyCycle {
        /// The offending key.
        key: GlobalKey,
    },
    /// An element outside the current build target's subtree was marked dirty while building.
    #[error("{element:?} was marked dirty while building {target:?}, which is not one of its ancestors")]
    MarkNeedsBuildOutOfScope {
        /// The element that was marked.
        element: ElementId,
        /// The element being built at that moment.
        target: ElementId,
    },
    /// The state of a stateful element was requested while it was already borrowed.
    #[error("the state of {0:?} is in use")]
    StateUnavailable(ElementId),
}

/// A failure raised by application build code.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A plain message.
    #[error("{0}")]
    Message(String),
    /// Any other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Creates an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
