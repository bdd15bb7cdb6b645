//! Backing resources and the attachment protocol.
//!
//! Resource-owning elements hold one opaque [`ResourceHandle`] each, created by the tree's
//! [`ResourceBackend`]. The tree keeps the backend's child lists in description order, even when
//! resource-owning elements are separated by any number of non-resource wrappers: every resource
//! is attached right after the nearest resource that precedes it in a depth-first walk, or first
//! inside its resource parent when nothing precedes it.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::any::Any;
use core::fmt;

use smallvec::SmallVec;

use crate::element::{ElementData, ElementId, Lifecycle};
use crate::tree::ElementTree;

/// Opaque handle to a resource owned by a [`ResourceBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    /// Wraps a backend-specific identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific identifier.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Description of a backing resource.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum ResourceKind {
    /// A tagged node with attributes.
    Element {
        /// The tag name.
        tag: String,
        /// Attributes, kept sorted for deterministic output.
        attributes: BTreeMap<String, String>,
    },
    /// A text leaf.
    Text {
        /// The text content.
        content: String,
    },
}

impl ResourceKind {
    /// An element resource without attributes.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// A text resource.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }
}

/// The rendering backend the tree drives.
///
/// All methods are infallible from the tree's point of view; a backend that can fail must deal
/// with its failures internally.
pub trait ResourceBackend: Any {
    /// Creates a resource. `parent` is the resource it will be attached to, `None` for the root
    /// container.
    fn create(&mut self, parent: Option<ResourceHandle>, kind: &ResourceKind) -> ResourceHandle;

    /// Applies a changed description. Only called when the description actually changed.
    fn update(&mut self, handle: ResourceHandle, kind: &ResourceKind);

    /// Inserts `child` into `parent` (or the root container) right after `after`, or first when
    /// `after` is `None`. If `child` is already attached somewhere it is moved.
    fn attach(
        &mut self,
        parent: Option<ResourceHandle>,
        child: ResourceHandle,
        after: Option<ResourceHandle>,
    );

    /// Removes `handle` from its parent. The resource stays alive.
    fn detach(&mut self, handle: ResourceHandle);

    /// Frees the resource.
    fn release(&mut self, handle: ResourceHandle);
}

/// A backend that allocates handles and does nothing else.
#[derive(Debug, Default)]
pub struct NullBackend {
    next: u64,
}

impl ResourceBackend for NullBackend {
    fn create(&mut self, _parent: Option<ResourceHandle>, _kind: &ResourceKind) -> ResourceHandle {
        self.next += 1;
        ResourceHandle(self.next)
    }

    fn update(&mut self, _handle: ResourceHandle, _kind: &ResourceKind) {}

    fn attach(
        &mut self,
        _parent: Option<ResourceHandle>,
        _child: ResourceHandle,
        _after: Option<ResourceHandle>,
    ) {
    }

    fn detach(&mut self, _handle: ResourceHandle) {}

    fn release(&mut self, _handle: ResourceHandle) {}
}

type ResourceList = SmallVec<[ElementId; 4]>;

impl ElementTree {
    /// The resource owned by `id`, if it owns one.
    #[must_use]
    pub fn resource(&self, id: ElementId) -> Option<ResourceHandle> {
        match self.elements.get(id)?.data {
            ElementData::Resource(handle) => handle,
            _ => None,
        }
    }

    /// The element owning the nearest resource attached before `id`'s, as last recorded.
    #[must_use]
    pub fn previous_resource(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(id)?.prev_resource
    }

    /// The nearest resource-owning ancestor of `id`.
    #[must_use]
    pub fn resource_parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements.get(id)?.resource_parent
    }

    pub(crate) fn owns_resource(&self, id: ElementId) -> bool {
        self.elements
            .get(id)
            .is_some_and(|node| matches!(node.data, ElementData::Resource(_)))
    }

    /// Creates the resource of a freshly mounted resource-owning element.
    pub(crate) fn create_resource(&mut self, id: ElementId) {
        let Some(node) = self.elements.get(id) else {
            return;
        };
        let widget = node.widget.clone();
        let crate::WidgetKind::Resource(resource) = widget.kind() else {
            return;
        };
        let parent = node.resource_parent.and_then(|p| self.resource(p));
        let kind = resource.resource();
        let handle = self.backend.create(parent, &kind);
        tracing::trace!(element = ?id, %handle, "created resource");
        if let Some(node) = self.elements.get_mut(id) {
            node.data = ElementData::Resource(Some(handle));
        }
    }

    /// The nearest resource-owning element that precedes `id` in description order within its
    /// resource parent.
    pub(crate) fn preceding_resource(&self, id: ElementId) -> Option<ElementId> {
        let mut cursor = id;
        loop {
            let node = self.elements.get(cursor)?;
            let mut sibling = node.prev_sibling;
            while let Some(current) = sibling {
                if let Some(found) = self.last_resource_in(current) {
                    return Some(found);
                }
                sibling = self.elements.get(current).and_then(|n| n.prev_sibling);
            }
            let parent = node.parent?;
            if self.owns_resource(parent) {
                return None;
            }
            cursor = parent;
        }
    }

    fn last_resource_in(&self, id: ElementId) -> Option<ElementId> {
        let node = self.elements.get(id)?;
        if node.lifecycle != Lifecycle::Active {
            return None;
        }
        if matches!(node.data, ElementData::Resource(Some(_))) {
            return Some(id);
        }
        node.children
            .iter()
            .rev()
            .find_map(|child| self.last_resource_in(*child))
    }

    fn top_level_resources(&self, id: ElementId, out: &mut ResourceList) {
        let Some(node) = self.elements.get(id) else {
            return;
        };
        if matches!(node.data, ElementData::Resource(Some(_))) {
            out.push(id);
            return;
        }
        for child in &node.children {
            self.top_level_resources(*child, out);
        }
    }

    /// Attaches (or moves) every outermost resource of `id`'s subtree into place.
    pub(crate) fn attach_resources(&mut self, id: ElementId) {
        let mut targets = ResourceList::new();
        self.top_level_resources(id, &mut targets);
        if targets.is_empty() {
            return;
        }
        let parent = self
            .elements
            .get(id)
            .and_then(|node| node.resource_parent)
            .and_then(|p| self.resource(p));
        let mut after = self.preceding_resource(id);
        for target in targets {
            let Some(handle) = self.resource(target) else {
                continue;
            };
            let after_handle = after.and_then(|a| self.resource(a));
            if let Some(node) = self.elements.get_mut(target) {
                node.prev_resource = after;
            }
            tracing::trace!(element = ?target, %handle, "attaching resource");
            self.backend.attach(parent, handle, after_handle);
            after = Some(target);
        }
    }

    /// Detaches every outermost resource of `id`'s subtree from its resource parent.
    pub(crate) fn detach_resources(&mut self, id: ElementId) {
        let mut targets = ResourceList::new();
        self.top_level_resources(id, &mut targets);
        for target in targets {
            if let Some(handle) = self.resource(target) {
                tracing::trace!(element = ?target, %handle, "detaching resource");
                self.backend.detach(handle);
            }
            if let Some(node) = self.elements.get_mut(target) {
                node.prev_resource = None;
            }
        }
    }

    /// Pushes a changed resource description to the backend.
    pub(crate) fn update_resource(&mut self, id: ElementId, old: &crate::AnyWidget) {
        let Some(handle) = self.resource(id) else {
            return;
        };
        let Some(widget) = self.elements.get(id).map(|node| node.widget.clone()) else {
            return;
        };
        let (crate::WidgetKind::Resource(new), crate::WidgetKind::Resource(old)) =
            (widget.kind(), old.kind())
        else {
            return;
        };
        let kind = new.resource();
        if kind != old.resource() {
            self.backend.update(handle, &kind);
        }
    }

    pub(crate) fn release_resource(&mut self, id: ElementId) {
        if let Some(handle) = self.resource(id) {
            tracing::trace!(element = ?id, %handle, "releasing resource");
            self.backend.release(handle);
        }
    }

    /// The backend driven by this tree.
    #[must_use]
    pub fn backend(&self) -> &dyn ResourceBackend {
        &*self.backend
    }

    /// The backend downcast to its concrete type.
    #[must_use]
    pub fn backend_as<B: ResourceBackend>(&self) -> Option<&B> {
        let backend: &dyn Any = &*self.backend;
        backend.downcast_ref()
    }

    /// The backend downcast to its concrete type, mutably.
    pub fn backend_as_mut<B: ResourceBackend>(&mut self) -> Option<&mut B> {
        let backend: &mut dyn Any = &mut *self.backend;
        backend.downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_backend_hands_out_distinct_handles() {
        let mut backend = NullBackend::default();
        let a = backend.create(None, &ResourceKind::element("div"));
        let b = backend.create(Some(a), &ResourceKind::text("hi"));
        assert_ne!(a, b);
        assert_eq!(ResourceHandle::from_raw(b.raw()), b);
    }
}
