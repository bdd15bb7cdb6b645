//! The element tree.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use core::mem;
use std::collections::HashMap;

use slotmap::SlotMap;

use crate::config::{Mode, TreeConfig};
use crate::element::{ElementData, ElementId, ElementNode, Lifecycle};
use crate::error::TreeError;
use crate::key::GlobalKey;
use crate::owner::{BuildOwner, FlushReport};
use crate::resource::ResourceBackend;
use crate::state::{AnyState, ErasedPreload, State, StateLifecycle};
use crate::widget::AnyWidget;

/// A persistent tree of elements reconciled against fresh widget descriptions.
///
/// The tree owns every element in an arena, the [`BuildOwner`] that schedules rebuilds, the
/// registry of global keys and the [`ResourceBackend`] its resource-owning elements talk to.
/// It is single-threaded: all callbacks run on the thread that drives it.
///
/// ```
/// use canopy_core::{ElementTree, Node, NullBackend, Text};
///
/// let mut tree = ElementTree::new(NullBackend::default());
/// tree.mount_root(Node::new("p").child(Text::new("hello")))?;
/// assert_eq!(tree.len(), 2);
/// # Ok::<(), canopy_core::TreeError>(())
/// ```
pub struct ElementTree {
    pub(crate) elements: SlotMap<ElementId, ElementNode>,
    pub(crate) owner: BuildOwner,
    pub(crate) backend: Box<dyn ResourceBackend>,
    pub(crate) config: TreeConfig,
    pub(crate) global_keys: HashMap<GlobalKey, ElementId>,
    pub(crate) pending: Vec<(ElementId, ErasedPreload)>,
    pub(crate) root: Option<ElementId>,
}

impl ElementTree {
    /// Creates an empty tree with the default configuration.
    pub fn new(backend: impl ResourceBackend) -> Self {
        Self::with_config(backend, TreeConfig::default())
    }

    /// Creates an empty tree.
    pub fn with_config(backend: impl ResourceBackend, config: TreeConfig) -> Self {
        Self {
            elements: SlotMap::with_key(),
            owner: BuildOwner::new(config.schedule_hook()),
            backend: Box::new(backend),
            config,
            global_keys: HashMap::new(),
            pending: Vec::new(),
            root: None,
        }
    }

    /// The configuration the tree was created with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The driving mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Reconciles the root slot against `widget` and flushes.
    ///
    /// The first call inflates the whole tree. Later calls update it in place, exactly like a
    /// parent rebuilding with a new child description.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during the pass.
    pub fn mount_root(&mut self, widget: impl Into<AnyWidget>) -> Result<FlushReport, TreeError> {
        let widget = widget.into();
        self.build_scope(|tree| {
            tree.root = tree.update_child(None, tree.root, Some(widget), None)?;
            Ok(())
        })
    }

    /// Removes the whole tree, unmounting every element.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during the pass.
    pub fn unmount_root(&mut self) -> Result<FlushReport, TreeError> {
        self.build_scope(|tree| {
            let root = tree.root.take();
            tree.update_child(None, root, None, None)?;
            Ok(())
        })
    }

    /// Whether any stateful element is waiting for a preload.
    #[must_use]
    pub fn has_pending_preloads(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drives every pending preload to completion, builds the elements that waited on them, and
    /// repeats until no element is pending.
    ///
    /// Only [`Mode::PreRender`] trees ever have pending elements; for other trees this is a
    /// plain [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during any of the flushes.
    pub async fn settle(&mut self) -> Result<FlushReport, TreeError> {
        let mut report = self.flush()?;
        while !self.pending.is_empty() {
            let (elements, preloads): (Vec<_>, Vec<_>) =
                mem::take(&mut self.pending).into_iter().unzip();
            tracing::debug!(count = elements.len(), "awaiting preloads");
            let results = futures::future::join_all(preloads).await;
            for (element, apply) in elements.into_iter().zip(results) {
                self.apply_preload(element, apply);
            }
            report.merge(self.flush()?);
        }
        Ok(report)
    }

    fn apply_preload(&mut self, element: ElementId, apply: Box<dyn FnOnce(&mut dyn AnyState)>) {
        let Some(node) = self.elements.get_mut(element) else {
            tracing::trace!(?element, "dropping preload of an unmounted element");
            return;
        };
        if let Some(slot) = node.stateful_mut() {
            slot.pending_first_build = false;
            if let Some(state) = slot.state.as_deref_mut() {
                apply(state);
            }
        }
        node.dirty = false;
        self.mark_dirty(element);
    }

    /// The root element.
    #[must_use]
    pub const fn root(&self) -> Option<ElementId> {
        self.root
    }

    /// Whether `id` names a live element of this tree.
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(id)
    }

    /// Number of live elements, including inactive ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the tree holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements waiting in the inactive pool.
    #[must_use]
    pub fn inactive_len(&self) -> usize {
        self.owner.inactive.len()
    }

    /// The parent of `id`.
    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(id)?.parent
    }

    /// The children of `id`, in order. Empty for unknown ids.
    #[must_use]
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.elements
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// The depth of `id`; the root has depth 0.
    #[must_use]
    pub fn depth(&self, id: ElementId) -> Option<usize> {
        self.elements.get(id).map(|node| node.depth)
    }

    /// The lifecycle of `id`. Unmounted elements are removed and report `None`.
    #[must_use]
    pub fn lifecycle(&self, id: ElementId) -> Option<Lifecycle> {
        self.elements.get(id).map(|node| node.lifecycle)
    }

    /// The widget currently configuring `id`.
    #[must_use]
    pub fn widget(&self, id: ElementId) -> Option<&AnyWidget> {
        self.elements.get(id).map(|node| &node.widget)
    }

    /// Whether `id` waits for a rebuild.
    #[must_use]
    pub fn is_dirty(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some_and(|node| node.dirty)
    }

    /// Whether `id` is a stateful element waiting for its preload.
    #[must_use]
    pub fn is_pending(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some_and(ElementNode::is_pending)
    }

    /// The lifecycle of the state owned by `id`.
    #[must_use]
    pub fn state_lifecycle(&self, id: ElementId) -> Option<StateLifecycle> {
        self.elements.get(id)?.stateful().map(|slot| slot.lifecycle)
    }

    /// The inherited providers `id` subscribed to.
    #[must_use]
    pub fn dependencies(&self, id: ElementId) -> Vec<ElementId> {
        self.elements
            .get(id)
            .map(|node| node.dependencies.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The subscribers of the inherited provider `id`.
    #[must_use]
    pub fn dependents(&self, id: ElementId) -> Vec<ElementId> {
        match self.elements.get(id).map(|node| &node.data) {
            Some(ElementData::Inherited(dependents)) => dependents.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// The element currently bound to `key`.
    #[must_use]
    pub fn global_element(&self, key: &GlobalKey) -> Option<ElementId> {
        self.global_keys.get(key).copied()
    }

    /// Calls `visitor` for each child of `id`, in order.
    pub fn visit_children(&self, id: ElementId, mut visitor: impl FnMut(ElementId)) {
        for child in self.children(id) {
            visitor(*child);
        }
    }

    /// All elements below `id` in depth-first pre-order, `id` included.
    #[must_use]
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut order = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.elements.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Borrows the state of the stateful element `id`.
    #[must_use]
    pub fn state<S: State>(&self, id: ElementId) -> Option<&S> {
        let state = self.elements.get(id)?.stateful()?.state.as_deref()?;
        let state: &dyn Any = state;
        state.downcast_ref()
    }

    /// Reads the state of the element bound to `key`.
    pub fn with_state<S: State, R>(&self, key: &GlobalKey, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.state(self.global_element(key)?).map(f)
    }

    /// Mutates the state of the element bound to `key` and schedules it to rebuild.
    ///
    /// Returns `false` when no element with a state of type `S` is bound to `key`.
    pub fn update_state<S: State>(&mut self, key: &GlobalKey, f: impl FnOnce(&mut S)) -> bool {
        let Some(id) = self.global_element(key) else {
            return false;
        };
        let Some(state) = self
            .elements
            .get_mut(id)
            .and_then(ElementNode::stateful_mut)
            .and_then(|slot| slot.state.as_deref_mut())
        else {
            return false;
        };
        let state: &mut dyn Any = state;
        let Some(state) = state.downcast_mut::<S>() else {
            return false;
        };
        f(state);
        self.mark_needs_build(id);
        true
    }

    pub(crate) fn node(&self, id: ElementId) -> Result<&ElementNode, TreeError> {
        self.elements.get(id).ok_or(TreeError::UnknownElement(id))
    }

    pub(crate) fn node_mut(&mut self, id: ElementId) -> Result<&mut ElementNode, TreeError> {
        self.elements
            .get_mut(id)
            .ok_or(TreeError::UnknownElement(id))
    }

    pub(crate) fn take_state(&mut self, id: ElementId) -> Result<Box<dyn AnyState>, TreeError> {
        self.node_mut(id)?
            .stateful_mut()
            .and_then(|slot| slot.state.take())
            .ok_or(TreeError::StateUnavailable(id))
    }

    pub(crate) fn restore_state(&mut self, id: ElementId, state: Box<dyn AnyState>) {
        if let Some(slot) = self
            .elements
            .get_mut(id)
            .and_then(ElementNode::stateful_mut)
        {
            slot.state = Some(state);
        }
    }

    pub(crate) fn advance_state(&mut self, id: ElementId, next: StateLifecycle) {
        if let Some(slot) = self
            .elements
            .get_mut(id)
            .and_then(ElementNode::stateful_mut)
        {
            slot.lifecycle.advance(next);
        }
    }
}

impl fmt::Debug for ElementTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementTree")
            .field("root", &self.root)
            .field("elements", &self.elements.len())
            .field("owner", &self.owner)
            .field("global_keys", &self.global_keys.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
