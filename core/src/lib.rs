//! # Canopy Core
//!
//! The element tree reconciler behind Canopy.
//!
//! Applications describe their UI as a tree of immutable [`Widget`]s, produced afresh on every
//! rebuild. An [`ElementTree`] keeps a persistent tree of elements alongside, and whenever a new
//! description arrives it works out the smallest set of changes: elements whose widget type and
//! [`Key`] still match are updated in place, keeping their [`State`] and backing resources;
//! everything else is torn down or created.
//!
//! ```
//! use canopy_core::{ElementTree, Fragment, Key, NullBackend, Text};
//!
//! let mut tree = ElementTree::new(NullBackend::default());
//! let row = |labels: &[&str]| {
//!     Fragment::new(labels.iter().map(|l| Text::new(*l).with_key(Key::value(l.to_string()))))
//! };
//!
//! tree.mount_root(row(&["a", "b", "c"]))?;
//! let root = tree.root().unwrap();
//! let before = tree.children(root).to_vec();
//!
//! tree.mount_root(row(&["c", "a", "b"]))?;
//! let after = tree.children(root);
//! assert_eq!(after, [before[2], before[0], before[1]]);
//! # Ok::<(), canopy_core::TreeError>(())
//! ```
//!
//! ## Modules
//!
//! - [`key`]: identity tokens.
//! - [`widget`]: the description model and its kinds.
//! - [`state`]: long-lived state of stateful widgets.
//! - [`element`] and [`tree`]: the element arena and its inspection API.
//! - [`owner`]: dirty tracking, flushing and scheduling.
//! - [`resource`]: the backend protocol for render resources.
//! - [`widgets`]: primitive widgets.

#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod config;
pub mod context;
pub mod element;
pub mod error;
mod inherited;
pub mod key;
mod lifecycle;
mod notification;
pub mod owner;
mod reconcile;
pub mod resource;
pub mod state;
pub mod tree;
pub mod widget;
pub mod widgets;

#[cfg(test)]
mod tests;

#[doc(inline)]
pub use config::{ErrorWidgetBuilder, Mode, TreeConfig};
#[doc(inline)]
pub use context::BuildContext;
#[doc(inline)]
pub use element::{Aspect, ElementId, Lifecycle};
#[doc(inline)]
pub use error::{BuildError, TreeError};
#[doc(inline)]
pub use key::{GlobalKey, Key, UniqueKey, ValueKey};
#[doc(inline)]
pub use owner::{BuildOwner, BuildPhase, FlushReport, ScheduleBuild, StateHandle};
#[doc(inline)]
pub use resource::{NullBackend, ResourceBackend, ResourceHandle, ResourceKind};
#[doc(inline)]
pub use state::{AnyState, Preload, State, StateLifecycle};
#[doc(inline)]
pub use tree::ElementTree;
#[doc(inline)]
pub use widget::{
    AnyWidget, BuildResult, FragmentWidget, InheritedWidget, ObserverWidget, ProxyWidget,
    ResourceWidget, StatefulWidget, StatelessWidget, Widget, WidgetKind,
};
#[doc(inline)]
pub use widgets::{Builder, ErrorWidget, Fragment, Node, NotificationListener, Text};
