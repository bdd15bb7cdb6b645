//! The handle build callbacks use to talk to the tree.

use alloc::rc::Rc;
use core::any::{Any, TypeId};
use core::fmt;
use core::hash::Hash;

use crate::config::Mode;
use crate::element::{Aspect, ElementId, Lifecycle};
use crate::owner::StateHandle;
use crate::state::State;
use crate::tree::ElementTree;
use crate::widget::{AnyWidget, Widget};

/// Access to the element tree from inside a build or lifecycle callback.
///
/// A context is bound to one element. Ancestor queries walk up from that element; they return
/// `None` once the element is no longer mounted.
pub struct BuildContext<'a> {
    tree: &'a mut ElementTree,
    element: ElementId,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(tree: &'a mut ElementTree, element: ElementId) -> Self {
        Self { tree, element }
    }

    /// The element this context belongs to.
    #[must_use]
    pub const fn element(&self) -> ElementId {
        self.element
    }

    /// The depth of the element; the root has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tree.depth(self.element).unwrap_or_default()
    }

    /// The widget currently configuring the element.
    #[must_use]
    pub fn widget(&self) -> Option<&AnyWidget> {
        self.tree.widget(self.element)
    }

    /// The driving mode of the tree.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.tree.mode()
    }

    /// Read-only access to the whole tree.
    #[must_use]
    pub fn tree(&self) -> &ElementTree {
        self.tree
    }

    /// Schedules this element to rebuild.
    pub fn mark_needs_build(&mut self) {
        self.tree.mark_needs_build(self.element);
    }

    /// Schedules another element to rebuild. While building, it must be this element or one of
    /// its descendants.
    pub fn mark_element_needs_build(&mut self, element: ElementId) {
        self.tree.mark_needs_build(element);
    }

    /// A handle that can mark this element dirty later, from outside any build.
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        self.tree.handle(self.element)
    }

    fn is_mounted(&self) -> bool {
        let mounted = self.tree.lifecycle(self.element) == Some(Lifecycle::Active);
        if !mounted {
            tracing::warn!(element = ?self.element, "ancestor query on an unmounted element");
        }
        mounted
    }

    /// Returns the nearest inherited widget of type `W` and subscribes to its changes.
    pub fn depend_on<W: Widget>(&mut self) -> Option<Rc<W>> {
        self.depend_on_with(None)
    }

    /// Like [`depend_on`](Self::depend_on), but only asks to be notified about changes that the
    /// provider reports as affecting `aspect`.
    ///
    /// Registering an aspect equal to one already registered adds nothing.
    pub fn depend_on_aspect<W: Widget, A>(&mut self, aspect: A) -> Option<Rc<W>>
    where
        A: Eq + Hash + fmt::Debug + 'static,
    {
        self.depend_on_with(Some(Aspect::new(aspect)))
    }

    fn depend_on_with<W: Widget>(&mut self, aspect: Option<Aspect>) -> Option<Rc<W>> {
        if !self.is_mounted() {
            return None;
        }
        let provider = self
            .tree
            .depend_on_provider(self.element, TypeId::of::<W>(), aspect)?;
        self.tree.widget(provider)?.downcast()
    }

    /// Returns the nearest inherited widget of type `W` without subscribing.
    #[must_use]
    pub fn find_inherited<W: Widget>(&self) -> Option<Rc<W>> {
        if !self.is_mounted() {
            return None;
        }
        let provider = self.tree.find_provider(self.element, TypeId::of::<W>())?;
        self.tree.widget(provider)?.downcast()
    }

    /// Returns the widget of the nearest ancestor whose widget has type `W`.
    #[must_use]
    pub fn find_ancestor_widget<W: Widget>(&self) -> Option<Rc<W>> {
        if !self.is_mounted() {
            return None;
        }
        self.ancestors()
            .find_map(|id| self.tree.widget(id).and_then(AnyWidget::downcast))
    }

    /// Returns the state of the nearest ancestor whose state has type `S`.
    #[must_use]
    pub fn find_ancestor_state<S: State>(&self) -> Option<&S> {
        if !self.is_mounted() {
            return None;
        }
        let tree: &ElementTree = self.tree;
        let mut cursor = tree.parent(self.element);
        while let Some(id) = cursor {
            if let Some(state) = tree.state::<S>(id) {
                return Some(state);
            }
            cursor = tree.parent(id);
        }
        None
    }

    /// Bubbles `notification` towards the root. Returns `true` if an ancestor consumed it.
    pub fn dispatch_notification<N: Any>(&self, notification: &N) -> bool {
        self.tree.dispatch_notification(self.element, notification)
    }

    fn ancestors(&self) -> impl Iterator<Item = ElementId> + '_ {
        core::iter::successors(self.tree.parent(self.element), |id| self.tree.parent(*id))
    }
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("element", &self.element)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
