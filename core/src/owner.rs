//! Build scheduling.
//!
//! Elements that need to rebuild are collected in a dirty list owned by the [`BuildOwner`]. A
//! flush drains that list in depth order so that parents always rebuild before their children,
//! then unmounts every element left in the inactive pool.
//!
//! The owner moves through three phases:
//!
//! - [`BuildPhase::Idle`]: nothing is scheduled.
//! - [`BuildPhase::Scheduled`]: work is pending and the host was told through its
//!   [`ScheduleBuild`] hook.
//! - [`BuildPhase::Building`]: a flush is running.
//!
//! The hook runs once per `Idle → Scheduled` transition, no matter how many elements are marked.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::mem;
use std::collections::HashMap;

use crate::element::{ElementId, Lifecycle};
use crate::error::TreeError;
use crate::tree::ElementTree;

/// Host hook invoked when the tree wants a flush.
///
/// The hook must not flush synchronously; it should arrange for
/// [`ElementTree::flush`] to be called soon, e.g. by setting a flag or waking an event loop.
pub trait ScheduleBuild {
    /// Requests a flush.
    fn schedule_build(&self);
}

impl<F: Fn()> ScheduleBuild for F {
    fn schedule_build(&self) {
        self();
    }
}

/// Phase of the build owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// No work is pending.
    #[default]
    Idle,
    /// Work is pending and the host was notified.
    Scheduled,
    /// A flush is running.
    Building,
}

/// State shared between the owner and the [`StateHandle`]s it hands out.
pub(crate) struct ScheduleQueue {
    phase: Cell<BuildPhase>,
    /// Posted elements, each with the build target that was running when it was posted.
    inbox: RefCell<Vec<(ElementId, Option<ElementId>)>>,
    /// Element whose subtree posts are confined to right now, if any.
    scope: Cell<Option<ElementId>>,
    hook: Rc<dyn ScheduleBuild>,
}

impl ScheduleQueue {
    fn new(hook: Rc<dyn ScheduleBuild>) -> Self {
        Self {
            phase: Cell::new(BuildPhase::Idle),
            inbox: RefCell::new(Vec::new()),
            scope: Cell::new(None),
            hook,
        }
    }

    pub(crate) fn phase(&self) -> BuildPhase {
        self.phase.get()
    }

    fn set_phase(&self, phase: BuildPhase) {
        self.phase.set(phase);
    }

    /// Moves `Idle` to `Scheduled`, notifying the host on that transition only.
    fn request_flush(&self) {
        if self.phase.get() == BuildPhase::Idle {
            self.phase.set(BuildPhase::Scheduled);
            tracing::trace!("scheduling build");
            self.hook.schedule_build();
        }
    }

    fn post(&self, element: ElementId) {
        self.inbox.borrow_mut().push((element, self.scope.get()));
        self.request_flush();
    }

    fn take_inbox(&self) -> Vec<(ElementId, Option<ElementId>)> {
        mem::take(&mut *self.inbox.borrow_mut())
    }

    fn has_mail(&self) -> bool {
        !self.inbox.borrow().is_empty()
    }
}

/// A handle that lets code outside a build mark one element as needing to rebuild.
///
/// Handles do not keep the tree alive. Marking through a handle whose tree was dropped, or whose
/// element was unmounted, does nothing. Marks made through a handle while an element is building
/// are held to the same scope as [`BuildContext::mark_element_needs_build`].
///
/// [`BuildContext::mark_element_needs_build`]: crate::BuildContext::mark_element_needs_build
#[derive(Clone)]
pub struct StateHandle {
    element: ElementId,
    queue: Weak<ScheduleQueue>,
}

impl StateHandle {
    /// The element this handle points at.
    #[must_use]
    pub const fn element(&self) -> ElementId {
        self.element
    }

    /// Schedules a rebuild of the element. Returns `false` if the tree is gone.
    pub fn mark_needs_build(&self) -> bool {
        self.queue.upgrade().is_some_and(|queue| {
            queue.post(self.element);
            true
        })
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("element", &self.element)
            .field("alive", &(self.queue.strong_count() > 0))
            .finish()
    }
}

/// Outcome of a flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Elements rebuilt during the flush, in order.
    pub rebuilt: Vec<ElementId>,
    /// Number of elements unmounted when the inactive pool was flushed.
    pub unmounted: usize,
    /// Number of builds that failed and were replaced by the error widget.
    pub failed_builds: usize,
}

impl FlushReport {
    /// Appends another report to this one.
    pub fn merge(&mut self, other: Self) {
        self.rebuilt.extend(other.rebuilt);
        self.unmounted += other.unmounted;
        self.failed_builds += other.failed_builds;
    }

    /// How many times `element` rebuilt.
    #[must_use]
    pub fn rebuild_count(&self, element: ElementId) -> usize {
        self.rebuilt.iter().filter(|id| **id == element).count()
    }
}

/// Bookkeeping for dirty elements, the inactive pool and the running build.
pub struct BuildOwner {
    pub(crate) dirty: Vec<ElementId>,
    pub(crate) needs_resorting: bool,
    pub(crate) inactive: Vec<ElementId>,
    pub(crate) queue: Rc<ScheduleQueue>,
    /// Innermost element currently rebuilding.
    pub(crate) current_target: Option<ElementId>,
    /// Depth of nested lifecycle callbacks allowed to dirty any element.
    pub(crate) allowance: usize,
    /// Parents currently reconciling a child list.
    pub(crate) updating: Vec<ElementId>,
    /// Children taken away by global-key relocation from a parent that is still reconciling,
    /// mapped to that parent.
    pub(crate) forgotten: HashMap<ElementId, ElementId>,
    pub(crate) fatal: Option<TreeError>,
    pub(crate) report: FlushReport,
}

impl BuildOwner {
    pub(crate) fn new(hook: Rc<dyn ScheduleBuild>) -> Self {
        Self {
            dirty: Vec::new(),
            needs_resorting: false,
            inactive: Vec::new(),
            queue: Rc::new(ScheduleQueue::new(hook)),
            current_target: None,
            allowance: 0,
            updating: Vec::new(),
            forgotten: HashMap::new(),
            fatal: None,
            report: FlushReport::default(),
        }
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> BuildPhase {
        self.queue.phase()
    }

    /// Number of elements waiting in the dirty list.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub(crate) fn handle(&self, element: ElementId) -> StateHandle {
        StateHandle {
            element,
            queue: Rc::downgrade(&self.queue),
        }
    }

    /// Keeps the first violation; later ones are usually consequences of it.
    pub(crate) fn record_fatal(&mut self, error: TreeError) {
        tracing::error!(%error, "contract violation during build");
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    pub(crate) fn is_forgotten(&self, child: ElementId) -> bool {
        self.forgotten.contains_key(&child)
    }

    /// Makes `target` the element being built and returns the previous one.
    pub(crate) fn enter_target(&mut self, target: ElementId) -> Option<ElementId> {
        let previous = self.current_target.replace(target);
        self.sync_scope();
        previous
    }

    pub(crate) fn leave_target(&mut self, previous: Option<ElementId>) {
        self.current_target = previous;
        self.sync_scope();
    }

    /// Publishes the current scope to handles. Allowance windows lift it.
    fn sync_scope(&self) {
        let scope = if self.allowance == 0 {
            self.current_target
        } else {
            None
        };
        self.queue.scope.set(scope);
    }
}

impl fmt::Debug for BuildOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOwner")
            .field("phase", &self.phase())
            .field("dirty", &self.dirty.len())
            .field("inactive", &self.inactive.len())
            .finish_non_exhaustive()
    }
}

impl ElementTree {
    /// Rebuilds every dirty element, parents first, then unmounts the inactive pool.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during the pass. The pass is not rolled back,
    /// but its bookkeeping is cleaned up and the inactive pool is flushed before returning.
    pub fn flush(&mut self) -> Result<FlushReport, TreeError> {
        self.build_scope(|_| Ok(()))
    }

    /// Runs `callback` with the owner in the building phase, drains the dirty list, and cleans up.
    pub(crate) fn build_scope(
        &mut self,
        callback: impl FnOnce(&mut Self) -> Result<(), TreeError>,
    ) -> Result<FlushReport, TreeError> {
        debug_assert_ne!(self.owner.phase(), BuildPhase::Building, "nested build pass");
        let span = tracing::debug_span!("flush", elements = self.elements.len());
        let _entered = span.enter();

        self.owner.queue.set_phase(BuildPhase::Building);
        self.owner.report = FlushReport::default();
        let outcome = callback(self).and_then(|()| self.drain_dirty());
        self.finish_build();

        let report = mem::take(&mut self.owner.report);
        let fatal = self.owner.fatal.take();
        outcome?;
        if let Some(error) = fatal {
            return Err(error);
        }
        tracing::debug!(
            rebuilt = report.rebuilt.len(),
            unmounted = report.unmounted,
            failed = report.failed_builds,
            "flush finished"
        );
        Ok(report)
    }

    fn drain_dirty(&mut self) -> Result<(), TreeError> {
        self.absorb_inbox();
        loop {
            self.sort_dirty();
            let Some(mut index) = self.first_dirty_index() else {
                return Ok(());
            };
            let mut count = self.owner.dirty.len();
            while index < count {
                if let Some(error) = self.owner.fatal.take() {
                    return Err(error);
                }
                let element = self.owner.dirty[index];
                self.rebuild(element)?;
                index += 1;
                self.absorb_inbox();
                if count < self.owner.dirty.len() || self.owner.needs_resorting {
                    self.sort_dirty();
                    count = self.owner.dirty.len();
                    while index > 0 && self.is_dirty(self.owner.dirty[index - 1]) {
                        index -= 1;
                    }
                }
            }
            if let Some(error) = self.owner.fatal.take() {
                return Err(error);
            }
        }
    }

    /// Sorts by depth, dirty elements first among equals.
    fn sort_dirty(&mut self) {
        let elements = &self.elements;
        self.owner.dirty.sort_by_key(|id| {
            elements
                .get(*id)
                .map_or((usize::MAX, true), |node| (node.depth, !node.dirty))
        });
        self.owner.needs_resorting = false;
    }

    fn first_dirty_index(&self) -> Option<usize> {
        self.owner
            .dirty
            .iter()
            .position(|id| self.is_rebuildable(*id))
    }

    fn is_rebuildable(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some_and(|node| {
            node.dirty && node.lifecycle == Lifecycle::Active && !node.is_pending()
        })
    }

    /// Turns posts from [`StateHandle`]s into dirty marks.
    fn absorb_inbox(&mut self) {
        for (element, scope) in self.owner.queue.take_inbox() {
            if let Some(target) = scope
                && self.lifecycle(element) == Some(Lifecycle::Active)
            {
                self.check_build_scope(element, target);
            }
            self.mark_dirty(element);
        }
    }

    fn finish_build(&mut self) {
        let mut leftover = Vec::new();
        for id in mem::take(&mut self.owner.dirty) {
            if let Some(node) = self.elements.get_mut(id) {
                node.in_dirty_list = false;
                if node.dirty && node.lifecycle == Lifecycle::Active && !node.is_pending() {
                    node.in_dirty_list = true;
                    leftover.push(id);
                }
            }
        }
        self.owner.needs_resorting = false;
        self.owner.allowance = 0;
        self.owner.leave_target(None);
        self.owner.updating.clear();
        self.owner.forgotten.clear();

        self.owner.report.unmounted += self.finalize_inactive();

        self.owner.dirty = leftover;
        self.owner.queue.set_phase(BuildPhase::Idle);
        if !self.owner.dirty.is_empty() || self.owner.queue.has_mail() {
            self.owner.queue.request_flush();
        }
    }

    /// Unmounts every pooled element, deepest first.
    fn finalize_inactive(&mut self) -> usize {
        let mut pool = mem::take(&mut self.owner.inactive);
        let elements = &self.elements;
        pool.sort_by_key(|id| core::cmp::Reverse(elements.get(*id).map_or(0, |node| node.depth)));
        let mut unmounted = 0;
        for id in pool {
            if self.lifecycle(id) == Some(Lifecycle::Inactive) {
                unmounted += self.unmount_subtree(id);
            }
        }
        unmounted
    }

    /// Marks `element` as needing to rebuild during the next flush.
    ///
    /// While a flush runs, only the element being built and its descendants may be marked,
    /// except from `init_state`, `did_update_widget` and `did_change_dependencies`.
    pub fn mark_needs_build(&mut self, element: ElementId) {
        if self.owner.phase() == BuildPhase::Building
            && self.owner.allowance == 0
            && let Some(target) = self.owner.current_target
        {
            self.check_build_scope(element, target);
        }
        self.mark_dirty(element);
    }

    fn check_build_scope(&mut self, element: ElementId, target: ElementId) {
        if self.config.debug_checks && !self.is_same_or_descendant(element, target) {
            self.owner.record_fatal(TreeError::MarkNeedsBuildOutOfScope { element, target });
        }
    }

    pub(crate) fn mark_dirty(&mut self, element: ElementId) {
        let Some(node) = self.elements.get_mut(element) else {
            return;
        };
        if node.lifecycle != Lifecycle::Active || node.dirty {
            return;
        }
        node.dirty = true;
        self.schedule_build_for(element);
    }

    pub(crate) fn schedule_build_for(&mut self, element: ElementId) {
        let Some(node) = self.elements.get_mut(element) else {
            return;
        };
        if node.in_dirty_list {
            self.owner.needs_resorting = true;
            return;
        }
        node.in_dirty_list = true;
        self.owner.dirty.push(element);
        self.owner.queue.request_flush();
    }

    pub(crate) fn is_same_or_descendant(&self, element: ElementId, ancestor: ElementId) -> bool {
        let mut cursor = Some(element);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.elements.get(id).and_then(|node| node.parent);
        }
        false
    }

    /// Runs `f` with the dirty-marking scope check relaxed.
    pub(crate) fn with_allowance<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.owner.allowance += 1;
        self.owner.sync_scope();
        let result = f(self);
        self.owner.allowance -= 1;
        self.owner.sync_scope();
        result
    }

    /// A handle for marking `element` dirty from outside a build.
    #[must_use]
    pub fn handle(&self, element: ElementId) -> StateHandle {
        self.owner.handle(element)
    }

    /// The build owner.
    #[must_use]
    pub const fn owner(&self) -> &BuildOwner {
        &self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_runs_once_per_idle_transition() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let queue = ScheduleQueue::new(Rc::new(move || counter.set(counter.get() + 1)));
        queue.request_flush();
        queue.request_flush();
        assert_eq!(calls.get(), 1);
        assert_eq!(queue.phase(), BuildPhase::Scheduled);

        queue.set_phase(BuildPhase::Idle);
        queue.request_flush();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn handles_outliving_the_queue_are_inert() {
        let owner = BuildOwner::new(Rc::new(|| {}));
        let handle = owner.handle(ElementId::default());
        assert!(handle.mark_needs_build());
        drop(owner);
        assert!(!handle.mark_needs_build());
    }

    #[test]
    fn reports_merge() {
        let mut report = FlushReport {
            rebuilt: alloc::vec![ElementId::default()],
            unmounted: 1,
            failed_builds: 0,
        };
        report.merge(FlushReport {
            rebuilt: alloc::vec![ElementId::default()],
            unmounted: 2,
            failed_builds: 1,
        });
        assert_eq!(report.rebuild_count(ElementId::default()), 2);
        assert_eq!(report.unmounted, 3);
        assert_eq!(report.failed_builds, 1);
    }
}
