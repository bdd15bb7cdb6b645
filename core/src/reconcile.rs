//! Diffing new descriptions against existing elements.
//!
//! [`ElementTree::update_child`] reconciles one slot. `update_children` reconciles an ordered
//! list, matching old elements to new widgets by position and, where widgets carry keys, by key:
//!
//! 1. Lists of at most one entry each are a single slot.
//! 2. Matching pairs at the front are updated in place.
//! 3. Matching pairs at the back are set aside without being touched yet.
//! 4. Keyed old elements of the remaining middle window whose key reappears among the middle
//!    widgets, with the same widget type, are collected for reuse.
//! 5. Middle widgets are walked left to right. A widget with a reusable key updates that element;
//!    every other widget inflates a new one, detaching the old element at the same position unless
//!    it was reused.
//! 6. Middle elements that were never reused are detached.
//! 7. The pairs set aside at the back are updated in order.

use alloc::vec::Vec;
use core::mem;
use std::collections::{HashMap, HashSet};

use crate::context::BuildContext;
use crate::element::{ElementId, ElementNode, Lifecycle};
use crate::error::TreeError;
use crate::key::{GlobalKey, Key};
use crate::notification::ObserverEvent;
use crate::tree::ElementTree;
use crate::widget::{AnyWidget, BuildResult, WidgetKind};

enum Built {
    Single(AnyWidget),
    Many(Vec<AnyWidget>),
}

impl ElementTree {
    /// Reconciles a single slot.
    ///
    /// | `child` | `widget` | result |
    /// |---------|----------|--------|
    /// | any | `None` | the old child is deactivated, `None` |
    /// | `None` | `Some` | a new element is inflated |
    /// | `Some` | same `Rc` | the child is kept, only its slot is refreshed |
    /// | `Some` | compatible | the child is updated in place |
    /// | `Some` | incompatible | the child is deactivated and a new element inflated |
    pub(crate) fn update_child(
        &mut self,
        parent: Option<ElementId>,
        child: Option<ElementId>,
        widget: Option<AnyWidget>,
        prev_sibling: Option<ElementId>,
    ) -> Result<Option<ElementId>, TreeError> {
        match widget {
            None => {
                if let Some(child) = child {
                    self.deactivate_child(child);
                }
                Ok(None)
            }
            Some(widget) => self
                .update_or_inflate(parent, child, widget, prev_sibling, false)
                .map(|(child, _)| Some(child)),
        }
    }

    /// Reconciles one slot, reporting whether the child's resources were (re)attached.
    ///
    /// `follow_moved` forces an attach even when the previous sibling is unchanged; siblings
    /// that kept their predecessor are only in place if that predecessor did not move.
    fn update_or_inflate(
        &mut self,
        parent: Option<ElementId>,
        child: Option<ElementId>,
        widget: AnyWidget,
        prev_sibling: Option<ElementId>,
        follow_moved: bool,
    ) -> Result<(ElementId, bool), TreeError> {
        let Some((child, current)) =
            child.and_then(|id| Some((id, self.elements.get(id)?.widget.clone())))
        else {
            return Ok((self.inflate(parent, widget, prev_sibling)?, true));
        };
        if AnyWidget::ptr_eq(&current, &widget) {
            let moved = self.update_slot(child, prev_sibling, follow_moved);
            return Ok((child, moved));
        }
        if AnyWidget::can_update(&current, &widget) {
            let moved = self.update_slot(child, prev_sibling, follow_moved);
            self.update_element(child, widget)?;
            return Ok((child, moved));
        }
        self.deactivate_child(child);
        Ok((self.inflate(parent, widget, prev_sibling)?, true))
    }

    /// Records a new previous sibling, moving the child's resources when it changed.
    fn update_slot(
        &mut self,
        child: ElementId,
        prev_sibling: Option<ElementId>,
        force: bool,
    ) -> bool {
        let Some(node) = self.elements.get_mut(child) else {
            return false;
        };
        if node.prev_sibling == prev_sibling && !force {
            return false;
        }
        node.prev_sibling = prev_sibling;
        if node.lifecycle != Lifecycle::Active {
            return false;
        }
        self.attach_resources(child);
        true
    }

    /// Creates an element for `widget`, or relocates the element bound to its global key.
    fn inflate(
        &mut self,
        parent: Option<ElementId>,
        widget: AnyWidget,
        prev_sibling: Option<ElementId>,
    ) -> Result<ElementId, TreeError> {
        if let Some(key) = widget.key().and_then(Key::as_global)
            && let Some(id) = self.retake_inactive_element(key, &widget, parent)?
        {
            tracing::trace!(element = ?id, ?key, "relocating");
            self.activate_with_parent(id, parent, prev_sibling);
            return self
                .update_or_inflate(parent, Some(id), widget, prev_sibling, false)
                .map(|(id, _)| id);
        }
        let id = self.elements.insert(ElementNode::new(widget));
        self.mount(id, parent, prev_sibling)?;
        Ok(id)
    }

    /// Pulls the element bound to `key` out of wherever it is, if it can take `widget`.
    fn retake_inactive_element(
        &mut self,
        key: &GlobalKey,
        widget: &AnyWidget,
        new_parent: Option<ElementId>,
    ) -> Result<Option<ElementId>, TreeError> {
        let Some(id) = self.global_keys.get(key).copied() else {
            return Ok(None);
        };
        let Some(node) = self.elements.get(id) else {
            return Ok(None);
        };
        if !AnyWidget::can_update(&node.widget, widget) {
            return Ok(None);
        }
        let old_parent = node.parent;
        if let Some(new_parent) = new_parent
            && self.is_same_or_descendant(new_parent, id)
        {
            return Err(TreeError::GlobalKeyCycle { key: key.clone() });
        }
        if let Some(old_parent) = old_parent {
            self.forget_child(old_parent, id);
            self.deactivate_child(id);
        }
        self.owner.inactive.retain(|pooled| *pooled != id);
        Ok(Some(id))
    }

    /// Removes `child` from `parent`'s child list, or remembers it as gone if `parent` is in the
    /// middle of reconciling its children.
    pub(crate) fn forget_child(&mut self, parent: ElementId, child: ElementId) {
        if self.owner.updating.contains(&parent) {
            self.owner.forgotten.insert(child, parent);
            return;
        }
        let Some(node) = self.elements.get_mut(parent) else {
            return;
        };
        let Some(index) = node.children.iter().position(|id| *id == child) else {
            return;
        };
        node.children.remove(index);
        let next = node.children.get(index).copied();
        let prev = index
            .checked_sub(1)
            .and_then(|i| node.children.get(i).copied());
        if let Some(next) = next.and_then(|next| self.elements.get_mut(next)) {
            next.prev_sibling = prev;
        }
    }

    /// Reconciles an ordered child list of `parent`.
    pub(crate) fn update_children(
        &mut self,
        parent: ElementId,
        old: &[ElementId],
        new: Vec<AnyWidget>,
    ) -> Result<Vec<ElementId>, TreeError> {
        if old.len() <= 1 && new.len() <= 1 {
            let child = self.update_child(
                Some(parent),
                old.first().copied(),
                new.into_iter().next(),
                None,
            )?;
            return Ok(child.into_iter().collect());
        }
        if self.config.debug_checks {
            self.warn_duplicate_keys(parent, &new);
        }
        self.owner.updating.push(parent);
        let result = self.update_children_windowed(parent, old, new);
        self.owner.updating.pop();
        let forgotten = mem::take(&mut self.owner.forgotten);
        self.owner.forgotten = forgotten
            .into_iter()
            .filter(|(_, owner)| *owner != parent)
            .collect();
        result
    }

    fn update_children_windowed(
        &mut self,
        parent: ElementId,
        old: &[ElementId],
        new: Vec<AnyWidget>,
    ) -> Result<Vec<ElementId>, TreeError> {
        let mut slots: Vec<Option<ElementId>> = alloc::vec![None; new.len()];
        let (mut old_top, mut new_top) = (0, 0);
        let (mut old_end, mut new_end) = (old.len(), new.len());
        let mut prev: Option<ElementId> = None;
        let mut moved = false;

        // Front.
        while old_top < old_end && new_top < new_end {
            let old_child = old[old_top];
            if !self.is_reusable(old_child, &new[new_top]) {
                break;
            }
            let (child, did_move) = self.update_or_inflate(
                Some(parent),
                Some(old_child),
                new[new_top].clone(),
                prev,
                moved,
            )?;
            slots[new_top] = Some(child);
            moved = did_move;
            prev = Some(child);
            old_top += 1;
            new_top += 1;
        }

        // Back, deferred.
        while old_top < old_end && new_top < new_end {
            if !self.is_reusable(old[old_end - 1], &new[new_end - 1]) {
                break;
            }
            old_end -= 1;
            new_end -= 1;
        }

        // Middle.
        let have_old = old_top < old_end;
        let mut retakeable: HashMap<Key, ElementId> = HashMap::new();
        if have_old {
            let wanted: HashMap<&Key, core::any::TypeId> = new[new_top..new_end]
                .iter()
                .filter_map(|widget| widget.key().map(|key| (key, widget.widget_type())))
                .collect();
            for &old_child in &old[old_top..old_end] {
                if self.owner.is_forgotten(old_child) {
                    continue;
                }
                let Some(node) = self.elements.get(old_child) else {
                    continue;
                };
                if let Some(key) = node.widget.key()
                    && wanted.get(key) == Some(&node.widget.widget_type())
                {
                    retakeable.insert(key.clone(), old_child);
                }
            }
        }

        let mut handled: HashSet<ElementId> = HashSet::new();
        let mut cursor = old_top;
        while new_top < new_end {
            let widget = new[new_top].clone();
            let reused = widget
                .key()
                .and_then(|key| retakeable.remove(key))
                .filter(|id| !self.owner.is_forgotten(*id));
            if let Some(id) = reused {
                handled.insert(id);
            } else if cursor < old_end {
                let positional = old[cursor];
                if !handled.contains(&positional)
                    && !retakeable.values().any(|id| *id == positional)
                    && !self.owner.is_forgotten(positional)
                {
                    self.deactivate_child(positional);
                    handled.insert(positional);
                }
            }
            cursor += 1;
            let (child, did_move) =
                self.update_or_inflate(Some(parent), reused, widget, prev, moved)?;
            slots[new_top] = Some(child);
            moved = did_move;
            prev = Some(child);
            new_top += 1;
        }

        if have_old {
            for &old_child in &old[old_top..old_end] {
                if !handled.contains(&old_child) && !self.owner.is_forgotten(old_child) {
                    self.deactivate_child(old_child);
                }
            }
        }

        // Back, now reconciled.
        let mut old_index = old_end;
        for (index, widget) in new.iter().enumerate().skip(new_end) {
            let old_child = Some(old[old_index]).filter(|id| !self.owner.is_forgotten(*id));
            let (child, did_move) =
                self.update_or_inflate(Some(parent), old_child, widget.clone(), prev, moved)?;
            slots[index] = Some(child);
            moved = did_move;
            prev = Some(child);
            old_index += 1;
        }

        let children: Vec<ElementId> = slots
            .into_iter()
            .flatten()
            .filter(|id| self.owner.forgotten.get(id) != Some(&parent))
            .collect();
        let mut prev = None;
        for child in &children {
            if let Some(node) = self.elements.get_mut(*child) {
                node.prev_sibling = prev;
            }
            prev = Some(*child);
        }
        Ok(children)
    }

    fn is_reusable(&self, old_child: ElementId, widget: &AnyWidget) -> bool {
        !self.owner.is_forgotten(old_child)
            && self
                .elements
                .get(old_child)
                .is_some_and(|node| AnyWidget::can_update(&node.widget, widget))
    }

    fn warn_duplicate_keys(&self, parent: ElementId, widgets: &[AnyWidget]) {
        let mut seen = HashSet::new();
        for key in widgets.iter().filter_map(AnyWidget::key) {
            if !seen.insert(key) {
                tracing::warn!(?parent, ?key, "duplicate key among siblings");
            }
        }
    }

    /// Applies a compatible new widget to `id` and rebuilds it if needed.
    pub(crate) fn update_element(
        &mut self,
        id: ElementId,
        widget: AnyWidget,
    ) -> Result<(), TreeError> {
        let old = mem::replace(&mut self.node_mut(id)?.widget, widget.clone());
        match widget.kind() {
            WidgetKind::Stateful(_) => {
                let mut state = self.take_state(id)?;
                self.with_allowance(|tree| {
                    state.dyn_did_update_widget(&old, &widget, &mut BuildContext::new(tree, id));
                });
                self.restore_state(id, state);
            }
            WidgetKind::Inherited(inherited) => {
                if inherited.update_should_notify(&old) {
                    self.notify_dependents(id, &old, inherited);
                }
            }
            WidgetKind::Resource(_) => self.update_resource(id, &old),
            WidgetKind::Stateless(_)
            | WidgetKind::Proxy(_)
            | WidgetKind::Observer(_)
            | WidgetKind::Fragment(_) => {}
        }
        if widget.as_widget().should_rebuild(old.as_widget()) {
            self.node_mut(id)?.dirty = true;
        }
        self.rebuild(id)
    }

    /// Rebuilds `id` if it is active, dirty and past its preload.
    ///
    /// # Errors
    ///
    /// Rebuilding an unmounted element is a contract violation.
    pub(crate) fn rebuild(&mut self, id: ElementId) -> Result<(), TreeError> {
        let node = self
            .elements
            .get(id)
            .ok_or(TreeError::DefunctElement(id))?;
        match node.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Defunct => return Err(TreeError::DefunctElement(id)),
            Lifecycle::Initial | Lifecycle::Inactive => return Ok(()),
        }
        if !node.dirty || node.is_pending() {
            return Ok(());
        }
        let observers = node.observers.clone();
        tracing::trace!(element = ?id, widget = node.widget.type_name(), "rebuilding");

        self.notify_observers(&observers, id, ObserverEvent::WillRebuild);
        let previous_target = self.owner.enter_target(id);
        let result = self.perform_rebuild(id);
        self.owner.leave_target(previous_target);
        self.owner.report.rebuilt.push(id);
        self.notify_observers(&observers, id, ObserverEvent::DidRebuild);
        result
    }

    fn perform_rebuild(&mut self, id: ElementId) -> Result<(), TreeError> {
        let widget = self.node(id)?.widget.clone();
        let built = self.build_element(id, &widget)?;
        self.node_mut(id)?.dirty = false;
        let children = match built {
            Built::Single(child) => {
                let old = self.node(id)?.children.first().copied();
                self.update_child(Some(id), old, Some(child), None)?
                    .into_iter()
                    .collect()
            }
            Built::Many(children) => {
                let old = self.node(id)?.children.clone();
                self.update_children(id, &old, children)?
            }
        };
        self.node_mut(id)?.children = children;
        Ok(())
    }

    fn build_element(&mut self, id: ElementId, widget: &AnyWidget) -> Result<Built, TreeError> {
        Ok(match widget.kind() {
            WidgetKind::Stateless(stateless) => {
                let result = stateless.build(&mut BuildContext::new(self, id));
                Built::Single(self.recover(id, widget, result))
            }
            WidgetKind::Stateful(_) => {
                let mut state = self.take_state(id)?;
                let changed = self
                    .node_mut(id)?
                    .stateful_mut()
                    .is_some_and(|slot| mem::take(&mut slot.dependencies_changed));
                if changed {
                    self.with_allowance(|tree| {
                        state.dyn_did_change_dependencies(widget, &mut BuildContext::new(tree, id));
                    });
                }
                let result = state.dyn_build(widget, &mut BuildContext::new(self, id));
                self.restore_state(id, state);
                Built::Single(self.recover(id, widget, result))
            }
            WidgetKind::Inherited(inherited) => Built::Single(inherited.child()),
            WidgetKind::Proxy(proxy) => Built::Single(proxy.child()),
            WidgetKind::Observer(observer) => Built::Single(observer.child()),
            WidgetKind::Fragment(fragment) => Built::Many(fragment.children()),
            WidgetKind::Resource(resource) => Built::Many(resource.children()),
        })
    }

    /// Replaces a failed build with the configured error widget.
    fn recover(&mut self, id: ElementId, widget: &AnyWidget, result: BuildResult) -> AnyWidget {
        result.unwrap_or_else(|error| {
            tracing::error!(element = ?id, widget = widget.type_name(), %error, "build failed");
            self.owner.report.failed_builds += 1;
            self.config.build_error_widget(&error)
        })
    }
}
