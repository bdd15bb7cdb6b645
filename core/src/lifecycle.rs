//! Mounting, deactivation, reactivation and unmounting of elements.

use alloc::vec::Vec;

use crate::context::BuildContext;
use crate::element::{ElementData, ElementId, Lifecycle};
use crate::error::TreeError;
use crate::key::{GlobalKey, Key};
use crate::notification::ObserverEvent;
use crate::state::StateLifecycle;
use crate::tree::ElementTree;
use crate::widget::WidgetKind;

impl ElementTree {
    /// Places a freshly created element under `parent` and runs its first build.
    pub(crate) fn mount(
        &mut self,
        id: ElementId,
        parent: Option<ElementId>,
        prev_sibling: Option<ElementId>,
    ) -> Result<(), TreeError> {
        let depth = parent
            .and_then(|p| self.elements.get(p))
            .map_or(0, |p| p.depth + 1);
        let node = self.node_mut(id)?;
        node.parent = parent;
        node.prev_sibling = prev_sibling;
        node.depth = depth;
        node.set_lifecycle(Lifecycle::Active);
        let key = node.widget.key().and_then(Key::as_global).cloned();
        tracing::trace!(element = ?id, depth, widget = node.widget.type_name(), "mounting");

        self.update_inheritance(id);
        if let Some(key) = key {
            self.register_global_key(key, id);
        }
        if self.owns_resource(id) {
            self.create_resource(id);
            self.attach_resources(id);
        }
        self.first_build(id)
    }

    fn first_build(&mut self, id: ElementId) -> Result<(), TreeError> {
        let widget = self.node(id)?.widget.clone();
        if matches!(widget.kind(), WidgetKind::Stateful(_)) {
            let mut state = self.take_state(id)?;
            self.with_allowance(|tree| {
                state.dyn_init_state(&widget, &mut BuildContext::new(tree, id));
            });
            self.advance_state(id, StateLifecycle::Initialized);
            self.with_allowance(|tree| {
                state.dyn_did_change_dependencies(&widget, &mut BuildContext::new(tree, id));
            });
            self.advance_state(id, StateLifecycle::Ready);
            let preload = if self.config.mode.allows_preload() {
                state.dyn_preload(&widget)
            } else {
                None
            };
            self.restore_state(id, state);

            if let Some(preload) = preload {
                let node = self.node_mut(id)?;
                node.dirty = false;
                if let Some(slot) = node.stateful_mut() {
                    slot.pending_first_build = true;
                }
                tracing::trace!(element = ?id, "first build waits for preload");
                self.pending.push((id, preload));
                return Ok(());
            }
        }
        self.rebuild(id)
    }

    /// Binds `key` to `id`, detaching a previous active binding first.
    fn register_global_key(&mut self, key: GlobalKey, id: ElementId) {
        if let Some(existing) = self.global_keys.get(&key).copied()
            && existing != id
            && let Some(node) = self.elements.get(existing)
            && node.lifecycle == Lifecycle::Active
        {
            let parent = node.parent;
            tracing::warn!(?key, ?existing, element = ?id, "global key rebound while in use");
            if self.config.debug_checks {
                self.owner.record_fatal(TreeError::DuplicateGlobalKey {
                    key: key.clone(),
                    existing,
                    element: id,
                });
            }
            if let Some(parent) = parent {
                self.forget_child(parent, existing);
            }
            self.deactivate_child(existing);
        }
        self.global_keys.insert(key, id);
    }

    /// Takes `child` out of the tree and parks it in the inactive pool.
    pub(crate) fn deactivate_child(&mut self, child: ElementId) {
        self.detach_resources(child);
        if let Some(node) = self.elements.get_mut(child) {
            node.parent = None;
            node.prev_sibling = None;
        }
        tracing::trace!(element = ?child, "deactivating");
        self.owner.inactive.push(child);
        self.deactivate_subtree(child);
    }

    fn deactivate_subtree(&mut self, root: ElementId) {
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.elements.get(id) else {
                continue;
            };
            if node.lifecycle != Lifecycle::Active {
                continue;
            }
            stack.extend(node.children.iter().rev().copied());
            self.deactivate_element(id);
        }
    }

    fn deactivate_element(&mut self, id: ElementId) {
        let Some(node) = self.elements.get_mut(id) else {
            return;
        };
        node.set_lifecycle(Lifecycle::Inactive);
        if let Some(state) = node.stateful_mut().and_then(|slot| slot.state.as_mut()) {
            state.dyn_deactivate();
        }
        // Dependencies stay recorded until reactivation, which uses them to decide whether to
        // notify the state.
        let providers: Vec<ElementId> = node.dependencies.iter().copied().collect();
        for provider in providers {
            if let Some(provider) = self.elements.get_mut(provider)
                && let ElementData::Inherited(dependents) = &mut provider.data
            {
                dependents.remove(&id);
            }
        }
    }

    /// Reinserts a pooled element under `parent`.
    pub(crate) fn activate_with_parent(
        &mut self,
        id: ElementId,
        parent: Option<ElementId>,
        prev_sibling: Option<ElementId>,
    ) {
        let depth = parent
            .and_then(|p| self.elements.get(p))
            .map_or(0, |p| p.depth + 1);
        if let Some(node) = self.elements.get_mut(id) {
            node.parent = parent;
            node.prev_sibling = prev_sibling;
        }
        self.update_depth(id, depth);
        self.activate_subtree(id);
        self.attach_resources(id);
    }

    fn update_depth(&mut self, root: ElementId, depth: usize) {
        let mut stack = alloc::vec![(root, depth)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.elements.get_mut(id) else {
                continue;
            };
            if node.depth == depth {
                continue;
            }
            node.depth = depth;
            stack.extend(node.children.iter().map(|child| (*child, depth + 1)));
        }
    }

    fn activate_subtree(&mut self, root: ElementId) {
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.elements.get(id) else {
                continue;
            };
            if node.lifecycle != Lifecycle::Inactive {
                continue;
            }
            stack.extend(node.children.iter().rev().copied());
            self.activate_element(id);
        }
    }

    fn activate_element(&mut self, id: ElementId) {
        let Some(node) = self.elements.get_mut(id) else {
            return;
        };
        node.set_lifecycle(Lifecycle::Active);
        let had_dependencies = !node.dependencies.is_empty();
        node.dependencies.clear();
        let dirty = node.dirty;
        let stateful = if let Some(slot) = node.stateful_mut() {
            if let Some(state) = slot.state.as_mut() {
                state.dyn_activate();
            }
            true
        } else {
            false
        };

        self.update_inheritance(id);
        if dirty {
            self.schedule_build_for(id);
        }
        if had_dependencies {
            self.dependencies_changed(id);
        }
        if stateful {
            self.mark_dirty(id);
        }
    }

    /// Unmounts `root` and everything below it, children before parents.
    pub(crate) fn unmount_subtree(&mut self, root: ElementId) -> usize {
        let order = self.descendants(root);
        let count = order.len();
        for id in order.into_iter().rev() {
            self.unmount_element(id);
        }
        count
    }

    fn unmount_element(&mut self, id: ElementId) {
        let Some(node) = self.elements.get_mut(id) else {
            return;
        };
        node.set_lifecycle(Lifecycle::Defunct);
        if let Some(slot) = node.stateful_mut() {
            if let Some(state) = slot.state.as_mut() {
                state.dyn_dispose();
            }
            slot.lifecycle.advance(StateLifecycle::Defunct);
        }
        let key = node.widget.key().and_then(Key::as_global).cloned();
        let observers = node.observers.clone();

        if let Some(key) = key
            && self.global_keys.get(&key) == Some(&id)
        {
            self.global_keys.remove(&key);
        }
        self.release_resource(id);
        self.notify_observers(&observers, id, ObserverEvent::DidUnmount);
        tracing::trace!(element = ?id, "unmounted");
        self.elements.remove(id);
    }
}
