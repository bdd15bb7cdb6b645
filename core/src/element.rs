//! Element records stored in the tree's arena.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::TypeId;
use core::fmt;
use std::collections::{HashMap, HashSet};

use crate::key::ValueKey;
use crate::resource::ResourceHandle;
use crate::state::{AnyState, StateLifecycle};
use crate::widget::{AnyWidget, WidgetKind};

slotmap::new_key_type! {
    /// Identifier of an element inside an [`ElementTree`](crate::ElementTree).
    ///
    /// Ids are never reused while the tree lives; an id whose element was unmounted simply stops
    /// resolving.
    pub struct ElementId;
}

/// Lifecycle of an element.
///
/// `Initial → Active → Inactive → (Active | Defunct)`. `Defunct` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created but not mounted yet.
    Initial,
    /// Mounted and part of the tree.
    Active,
    /// Removed from the tree and waiting in the inactive pool.
    Inactive,
    /// Unmounted. Terminal.
    Defunct,
}

impl Lifecycle {
    /// Whether the element may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initial, Self::Active)
                | (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active | Self::Defunct)
        )
    }
}

/// An aspect a subscriber registers with an inherited provider.
///
/// Aspects compare by value, so registering the same one on every build keeps a single entry.
pub type Aspect = ValueKey;

/// What a subscriber depends on.
#[derive(Clone)]
pub(crate) enum Dependency {
    /// Every change.
    All,
    /// Changes to any of these aspects.
    Aspects(HashSet<Aspect>),
}

impl Dependency {
    pub(crate) fn new(aspect: Option<Aspect>) -> Self {
        aspect.map_or(Self::All, |aspect| Self::Aspects(HashSet::from([aspect])))
    }

    pub(crate) fn add(&mut self, aspect: Option<Aspect>) {
        match aspect {
            None => *self = Self::All,
            Some(aspect) => {
                if let Self::Aspects(aspects) = self {
                    aspects.insert(aspect);
                }
            }
        }
    }
}

/// Kind-specific payload of an element.
pub(crate) enum ElementData {
    /// Stateless, proxy, observer and fragment elements.
    Component,
    Stateful(StatefulSlot),
    /// Subscribers of an inherited provider.
    Inherited(HashMap<ElementId, Dependency>),
    /// `None` until the element is mounted.
    Resource(Option<ResourceHandle>),
}

pub(crate) struct StatefulSlot {
    /// Taken out while a callback runs.
    pub(crate) state: Option<Box<dyn AnyState>>,
    pub(crate) lifecycle: StateLifecycle,
    pub(crate) dependencies_changed: bool,
    /// Waiting for a preload future before the first build.
    pub(crate) pending_first_build: bool,
}

impl StatefulSlot {
    pub(crate) fn new(state: Box<dyn AnyState>) -> Self {
        Self {
            state: Some(state),
            lifecycle: StateLifecycle::Created,
            dependencies_changed: false,
            pending_first_build: false,
        }
    }
}

pub(crate) struct ElementNode {
    pub(crate) widget: AnyWidget,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    pub(crate) prev_sibling: Option<ElementId>,
    pub(crate) depth: usize,
    pub(crate) dirty: bool,
    pub(crate) in_dirty_list: bool,
    pub(crate) lifecycle: Lifecycle,
    /// Nearest active provider per inherited widget type, shared with descendants.
    pub(crate) inherited: Rc<HashMap<TypeId, ElementId>>,
    /// Observer elements above this one, outermost first.
    pub(crate) observers: Rc<[ElementId]>,
    /// Providers this element subscribed to.
    pub(crate) dependencies: HashSet<ElementId>,
    pub(crate) resource_parent: Option<ElementId>,
    pub(crate) prev_resource: Option<ElementId>,
    pub(crate) data: ElementData,
}

impl ElementNode {
    pub(crate) fn new(widget: AnyWidget) -> Self {
        let data = match widget.kind() {
            WidgetKind::Stateful(stateful) => {
                ElementData::Stateful(StatefulSlot::new(stateful.create_state()))
            }
            WidgetKind::Inherited(_) => ElementData::Inherited(HashMap::new()),
            WidgetKind::Resource(_) => ElementData::Resource(None),
            WidgetKind::Stateless(_)
            | WidgetKind::Proxy(_)
            | WidgetKind::Observer(_)
            | WidgetKind::Fragment(_) => ElementData::Component,
        };
        Self {
            widget,
            parent: None,
            children: Vec::new(),
            prev_sibling: None,
            depth: 0,
            dirty: true,
            in_dirty_list: false,
            lifecycle: Lifecycle::Initial,
            inherited: Rc::default(),
            observers: Rc::from(Vec::new()),
            dependencies: HashSet::new(),
            resource_parent: None,
            prev_resource: None,
            data,
        }
    }

    pub(crate) fn set_lifecycle(&mut self, next: Lifecycle) {
        debug_assert!(
            self.lifecycle.can_transition_to(next),
            "element lifecycle cannot move from {:?} to {next:?}",
            self.lifecycle
        );
        self.lifecycle = next;
    }

    pub(crate) const fn stateful(&self) -> Option<&StatefulSlot> {
        match &self.data {
            ElementData::Stateful(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn stateful_mut(&mut self) -> Option<&mut StatefulSlot> {
        match &mut self.data {
            ElementData::Stateful(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.stateful().is_some_and(|slot| slot.pending_first_build)
    }
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("widget", &self.widget.type_name())
            .field("depth", &self.depth)
            .field("lifecycle", &self.lifecycle)
            .field("dirty", &self.dirty)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(Lifecycle::Initial.can_transition_to(Lifecycle::Active));
        assert!(Lifecycle::Inactive.can_transition_to(Lifecycle::Active));
        assert!(Lifecycle::Inactive.can_transition_to(Lifecycle::Defunct));
        assert!(!Lifecycle::Defunct.can_transition_to(Lifecycle::Active));
        assert!(!Lifecycle::Active.can_transition_to(Lifecycle::Defunct));
    }
}
