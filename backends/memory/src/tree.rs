//! The resource arena.

use canopy_core::{ResourceBackend, ResourceHandle, ResourceKind};

/// How many times each backend operation ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Resources created.
    pub created: usize,
    /// Resource descriptions replaced.
    pub updated: usize,
    /// Attach calls, moves included.
    pub attached: usize,
    /// Detach calls.
    pub detached: usize,
    /// Resources released.
    pub released: usize,
}

/// A live resource.
#[derive(Debug, Clone)]
pub struct MemoryNode {
    kind: ResourceKind,
    parent: Option<ResourceHandle>,
    attached: bool,
    children: Vec<ResourceHandle>,
}

impl MemoryNode {
    const fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            parent: None,
            attached: false,
            children: Vec::new(),
        }
    }

    /// The current description.
    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// The resource this one is attached to; `None` for detached and top-level resources.
    #[must_use]
    pub const fn parent(&self) -> Option<ResourceHandle> {
        self.parent
    }

    /// Whether the resource is attached somewhere, top level included.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Attached children, in order.
    #[must_use]
    pub fn children(&self) -> &[ResourceHandle] {
        &self.children
    }
}

/// Backend storing resources in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: Vec<Option<MemoryNode>>,
    roots: Vec<ResourceHandle>,
    counts: OpCounts,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            counts: OpCounts {
                created: 0,
                updated: 0,
                attached: 0,
                detached: 0,
                released: 0,
            },
        }
    }

    /// Looks up a live resource.
    #[must_use]
    pub fn node(&self, handle: ResourceHandle) -> Option<&MemoryNode> {
        let index = usize::try_from(handle.raw()).ok()?;
        self.nodes.get(index)?.as_ref()
    }

    fn node_mut(&mut self, handle: ResourceHandle) -> Option<&mut MemoryNode> {
        let index = usize::try_from(handle.raw()).ok()?;
        self.nodes.get_mut(index)?.as_mut()
    }

    /// Top-level resources, in order.
    #[must_use]
    pub fn roots(&self) -> &[ResourceHandle] {
        &self.roots
    }

    /// Attached children of `parent`, or the top-level resources for `None`.
    #[must_use]
    pub fn children(&self, parent: Option<ResourceHandle>) -> &[ResourceHandle] {
        match parent {
            None => &self.roots,
            Some(handle) => self.node(handle).map_or(&[], MemoryNode::children),
        }
    }

    /// Number of resources created and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Operation counters since creation or the last [`reset_counts`](Self::reset_counts).
    #[must_use]
    pub const fn counts(&self) -> OpCounts {
        self.counts
    }

    /// Zeroes the operation counters.
    pub fn reset_counts(&mut self) {
        self.counts = OpCounts::default();
    }

    /// Resources created so far.
    #[must_use]
    pub const fn create_count(&self) -> usize {
        self.counts.created
    }

    /// Attach calls so far.
    #[must_use]
    pub const fn attach_count(&self) -> usize {
        self.counts.attached
    }

    /// Detach calls so far.
    #[must_use]
    pub const fn detach_count(&self) -> usize {
        self.counts.detached
    }

    /// Description updates so far.
    #[must_use]
    pub const fn update_count(&self) -> usize {
        self.counts.updated
    }

    /// Resources released so far.
    #[must_use]
    pub const fn release_count(&self) -> usize {
        self.counts.released
    }

    /// Removes `handle` from whatever list it sits in.
    fn unlink(&mut self, handle: ResourceHandle) {
        let Some(node) = self.node_mut(handle) else {
            return;
        };
        if !node.attached {
            return;
        }
        node.attached = false;
        let parent = node.parent.take();
        let siblings = match parent {
            None => &mut self.roots,
            Some(parent) => match self.node_mut(parent) {
                Some(parent) => &mut parent.children,
                None => return,
            },
        };
        siblings.retain(|sibling| *sibling != handle);
    }
}

impl ResourceBackend for MemoryBackend {
    fn create(&mut self, _parent: Option<ResourceHandle>, kind: &ResourceKind) -> ResourceHandle {
        let handle = ResourceHandle::from_raw(self.nodes.len() as u64);
        self.nodes.push(Some(MemoryNode::new(kind.clone())));
        self.counts.created += 1;
        tracing::trace!(%handle, "created");
        handle
    }

    fn update(&mut self, handle: ResourceHandle, kind: &ResourceKind) {
        let Some(node) = self.node_mut(handle) else {
            tracing::warn!(%handle, "update of an unknown resource");
            return;
        };
        node.kind = kind.clone();
        self.counts.updated += 1;
    }

    fn attach(
        &mut self,
        parent: Option<ResourceHandle>,
        child: ResourceHandle,
        after: Option<ResourceHandle>,
    ) {
        if self.node(child).is_none() || parent.is_some_and(|p| self.node(p).is_none()) {
            tracing::warn!(%child, ?parent, "attach involving an unknown resource");
            return;
        }
        self.unlink(child);
        let siblings = match parent {
            None => &mut self.roots,
            Some(parent) => match self.node_mut(parent) {
                Some(parent) => &mut parent.children,
                None => return,
            },
        };
        let index = after
            .and_then(|after| siblings.iter().position(|sibling| *sibling == after))
            .map_or(0, |position| position + 1);
        siblings.insert(index, child);
        if let Some(node) = self.node_mut(child) {
            node.parent = parent;
            node.attached = true;
        }
        self.counts.attached += 1;
        tracing::trace!(%child, ?parent, ?after, "attached");
    }

    fn detach(&mut self, handle: ResourceHandle) {
        self.unlink(handle);
        self.counts.detached += 1;
    }

    fn release(&mut self, handle: ResourceHandle) {
        self.unlink(handle);
        let Some(slot) = usize::try_from(handle.raw())
            .ok()
            .and_then(|index| self.nodes.get_mut(index))
        else {
            return;
        };
        if let Some(node) = slot.take() {
            for child in node.children {
                if let Some(child) = self.node_mut(child) {
                    child.parent = None;
                    child.attached = false;
                }
            }
        }
        self.counts.released += 1;
    }
}

#[cfg(test)]
mod tests {
    use canopy_core::{ElementTree, Fragment, Key, Node, Text};

    use super::*;

    fn texts(backend: &MemoryBackend, parent: Option<ResourceHandle>) -> Vec<String> {
        backend
            .children(parent)
            .iter()
            .filter_map(|handle| match backend.node(*handle)?.kind() {
                ResourceKind::Text { content } => Some(content.clone()),
                ResourceKind::Element { .. } => None,
            })
            .collect()
    }

    #[test]
    fn attach_inserts_after_the_anchor() {
        let mut backend = MemoryBackend::new();
        let a = backend.create(None, &ResourceKind::text("a"));
        let b = backend.create(None, &ResourceKind::text("b"));
        let c = backend.create(None, &ResourceKind::text("c"));
        backend.attach(None, a, None);
        backend.attach(None, c, Some(a));
        backend.attach(None, b, Some(a));
        assert_eq!(texts(&backend, None), ["a", "b", "c"]);

        backend.attach(None, a, Some(c));
        assert_eq!(texts(&backend, None), ["b", "c", "a"]);
        assert_eq!(backend.attach_count(), 4);
    }

    #[test]
    fn release_forgets_the_resource() {
        let mut backend = MemoryBackend::new();
        let list = backend.create(None, &ResourceKind::element("ul"));
        let item = backend.create(Some(list), &ResourceKind::text("x"));
        backend.attach(None, list, None);
        backend.attach(Some(list), item, None);
        assert_eq!(backend.node(item).and_then(MemoryNode::parent), Some(list));

        backend.release(list);
        assert!(backend.node(list).is_none());
        assert!(backend.roots().is_empty());
        assert!(backend.node(item).is_some_and(|item| !item.is_attached()));
        assert_eq!(backend.live_count(), 1);
    }

    #[test]
    fn mirrors_a_reconciled_tree() {
        let list = |items: &[&str]| {
            Node::new("ul").children(
                items
                    .iter()
                    .map(|item| Text::new(*item).with_key(Key::value(item.to_string()))),
            )
        };
        let mut tree = ElementTree::new(MemoryBackend::new());
        tree.mount_root(list(&["a", "b", "c"])).unwrap();
        let ul = tree.resource(tree.root().unwrap());
        let backend = tree.backend_as_mut::<MemoryBackend>().unwrap();
        assert_eq!(texts(backend, ul), ["a", "b", "c"]);
        backend.reset_counts();

        tree.mount_root(list(&["c", "a"])).unwrap();
        let backend = tree.backend_as::<MemoryBackend>().unwrap();
        assert_eq!(texts(backend, ul), ["c", "a"]);
        assert_eq!(backend.create_count(), 0);
        assert_eq!(backend.release_count(), 1);
        assert_eq!(backend.live_count(), 3);
    }

    #[test]
    fn unmounting_releases_everything() {
        let mut tree = ElementTree::new(MemoryBackend::new());
        tree.mount_root(Fragment::new([
            Node::new("header").child(Text::new("title")),
            Node::new("main"),
        ]))
        .unwrap();
        tree.unmount_root().unwrap();

        let backend = tree.backend_as::<MemoryBackend>().unwrap();
        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.release_count(), backend.create_count());
        assert!(backend.roots().is_empty());
    }
}
