use alloc::rc::Rc;
use core::any::Any;
use core::cell::{Cell, RefCell};
use std::collections::HashMap;

use futures::FutureExt;
use proptest::prelude::*;

use crate::{
    AnyState, AnyWidget, BuildContext, BuildError, BuildPhase, BuildResult, Builder, ElementId,
    ElementTree, ErrorWidget, Fragment, GlobalKey, InheritedWidget, Key, Lifecycle, Mode, Node,
    NotificationListener, NullBackend, ObserverWidget, Preload, ResourceBackend, ResourceHandle,
    ResourceKind, State, StateLifecycle, StatefulWidget, Text, TreeConfig, TreeError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Create,
    Update,
    Attach,
    Detach,
    Release,
}

/// Keeps the child lists a real backend would, and every call made to it.
#[derive(Debug, Default)]
struct Recorder {
    next: u64,
    ops: Vec<Op>,
    kinds: HashMap<ResourceHandle, ResourceKind>,
    lists: HashMap<Option<ResourceHandle>, Vec<ResourceHandle>>,
}

impl Recorder {
    fn count(&self, op: Op) -> usize {
        self.ops.iter().filter(|o| **o == op).count()
    }

    /// Text content or tag of each resource attached under `parent`, in order.
    fn labels(&self, parent: Option<ResourceHandle>) -> Vec<String> {
        self.lists
            .get(&parent)
            .map(|list| {
                list.iter()
                    .map(|handle| match &self.kinds[handle] {
                        ResourceKind::Text { content } => content.clone(),
                        ResourceKind::Element { tag, .. } => tag.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn unlink(&mut self, handle: ResourceHandle) {
        for list in self.lists.values_mut() {
            list.retain(|h| *h != handle);
        }
    }
}

impl ResourceBackend for Recorder {
    fn create(&mut self, _parent: Option<ResourceHandle>, kind: &ResourceKind) -> ResourceHandle {
        self.next += 1;
        let handle = ResourceHandle::from_raw(self.next);
        self.kinds.insert(handle, kind.clone());
        self.ops.push(Op::Create);
        handle
    }

    fn update(&mut self, handle: ResourceHandle, kind: &ResourceKind) {
        self.kinds.insert(handle, kind.clone());
        self.ops.push(Op::Update);
    }

    fn attach(
        &mut self,
        parent: Option<ResourceHandle>,
        child: ResourceHandle,
        after: Option<ResourceHandle>,
    ) {
        self.unlink(child);
        let list = self.lists.entry(parent).or_default();
        let index = after
            .and_then(|after| list.iter().position(|h| *h == after))
            .map_or(0, |i| i + 1);
        list.insert(index, child);
        self.ops.push(Op::Attach);
    }

    fn detach(&mut self, handle: ResourceHandle) {
        self.unlink(handle);
        self.ops.push(Op::Detach);
    }

    fn release(&mut self, handle: ResourceHandle) {
        self.unlink(handle);
        self.kinds.remove(&handle);
        self.ops.push(Op::Release);
    }
}

fn recorder(tree: &ElementTree) -> &Recorder {
    tree.backend_as::<Recorder>().unwrap()
}

fn checked_tree() -> ElementTree {
    ElementTree::with_config(Recorder::default(), TreeConfig::new().debug_checks(true))
}

fn assert_consistent(tree: &ElementTree) {
    let root = tree.root().unwrap();
    assert_eq!(tree.depth(root), Some(0));
    assert_eq!(tree.parent(root), None);
    for id in tree.descendants(root) {
        assert_eq!(tree.lifecycle(id), Some(Lifecycle::Active));
        for child in tree.children(id) {
            assert_eq!(tree.parent(*child), Some(id));
            assert_eq!(tree.depth(*child), tree.depth(id).map(|d| d + 1));
        }
    }
}

type Log = Rc<RefCell<Vec<String>>>;

fn entries(log: &Log, prefix: &str) -> usize {
    log.borrow().iter().filter(|e| e.starts_with(prefix)).count()
}

#[derive(Debug, Clone)]
struct Counter {
    label: &'static str,
    themed: bool,
    child: Option<AnyWidget>,
    key: Option<Key>,
    log: Log,
}

impl Counter {
    fn new(label: &'static str, log: &Log) -> Self {
        Self {
            label,
            themed: false,
            child: None,
            key: None,
            log: log.clone(),
        }
    }

    fn keyed(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn themed(mut self) -> Self {
        self.themed = true;
        self
    }

    fn child(mut self, child: impl Into<AnyWidget>) -> Self {
        self.child = Some(child.into());
        self
    }
}

impl StatefulWidget for Counter {
    fn create_state(&self) -> Box<dyn AnyState> {
        Box::new(CounterState {
            label: self.label,
            count: 0,
            log: self.log.clone(),
        })
    }
}

crate::impl_widget!(Counter, Stateful, key = key);

struct CounterState {
    label: &'static str,
    count: u32,
    log: Log,
}

impl CounterState {
    fn record(&self, event: &str) {
        self.log.borrow_mut().push(format!("{event} {}", self.label));
    }
}

impl State for CounterState {
    type Widget = Counter;

    fn init_state(&mut self, _widget: &Counter, _cx: &mut BuildContext<'_>) {
        self.record("init");
    }

    fn did_change_dependencies(&mut self, _widget: &Counter, _cx: &mut BuildContext<'_>) {
        self.record("deps");
    }

    fn build(&mut self, widget: &Counter, cx: &mut BuildContext<'_>) -> BuildResult {
        self.record("build");
        let mut text = format!("{}:{}", widget.label, self.count);
        if widget.themed
            && let Some(theme) = cx.depend_on::<Theme>()
        {
            text = format!("{text}:{}", theme.color);
        }
        Ok(match &widget.child {
            Some(child) => Fragment::new([Text::new(text).into(), child.clone()]).into(),
            None => Text::new(text).into(),
        })
    }

    fn activate(&mut self) {
        self.record("activate");
    }

    fn deactivate(&mut self) {
        self.record("deactivate");
    }

    fn dispose(&mut self) {
        self.record("dispose");
    }
}

#[derive(Debug)]
struct Theme {
    color: &'static str,
    child: AnyWidget,
}

impl InheritedWidget for Theme {
    fn child(&self) -> AnyWidget {
        self.child.clone()
    }

    fn update_should_notify(&self, old: &AnyWidget) -> bool {
        old.downcast_ref::<Self>()
            .is_none_or(|old| old.color != self.color)
    }
}

crate::impl_widget!(Theme, Inherited);

fn find_counter(tree: &ElementTree, label: &str) -> ElementId {
    tree.descendants(tree.root().unwrap())
        .into_iter()
        .find(|id| {
            tree.widget(*id)
                .and_then(|w| w.downcast_ref::<Counter>())
                .is_some_and(|c| c.label == label)
        })
        .unwrap()
}

fn counters(log: &Log, labels: &[&'static str]) -> Fragment {
    Fragment::new(
        labels
            .iter()
            .map(|label| Counter::new(*label, log).keyed(Key::value(*label))),
    )
}

#[test]
fn keyed_reorder_keeps_elements_and_state() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(counters(&log, &["A", "B", "C"])).unwrap();
    let root = tree.root().unwrap();
    let before = tree.children(root).to_vec();
    let created = recorder(&tree).count(Op::Create);
    assert_eq!(recorder(&tree).labels(None), ["A:0", "B:0", "C:0"]);

    tree.mount_root(counters(&log, &["C", "A", "B"])).unwrap();

    assert_eq!(tree.children(root), [before[2], before[0], before[1]]);
    assert_eq!(recorder(&tree).count(Op::Create), created);
    assert_eq!(recorder(&tree).count(Op::Release), 0);
    assert_eq!(recorder(&tree).labels(None), ["C:0", "A:0", "B:0"]);
    assert_eq!(entries(&log, "init"), 3);
    assert_eq!(entries(&log, "dispose"), 0);
    assert_consistent(&tree);
}

#[test]
fn moves_follow_a_moved_predecessor() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(counters(&log, &["Q", "W", "P", "E"])).unwrap();
    tree.mount_root(counters(&log, &["P", "E", "Q", "W"])).unwrap();
    assert_eq!(recorder(&tree).labels(None), ["P:0", "E:0", "Q:0", "W:0"]);
}

#[test]
fn identical_description_is_a_no_op() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(counters(&log, &["A", "B", "C"])).unwrap();
    let root = tree.root().unwrap();
    let elements = tree.descendants(root);
    let ops = recorder(&tree).ops.len();

    tree.mount_root(counters(&log, &["A", "B", "C"])).unwrap();

    assert_eq!(tree.descendants(root), elements);
    assert_eq!(recorder(&tree).ops.len(), ops);
    assert!(elements.iter().all(|id| !tree.is_dirty(*id)));
    assert_eq!(tree.owner().dirty_len(), 0);
    assert_eq!(tree.owner().phase(), BuildPhase::Idle);
}

#[test]
fn unkeyed_lists_update_by_position() {
    let mut tree = checked_tree();
    tree.mount_root(Fragment::new([Text::new("a"), Text::new("b"), Text::new("c")]))
        .unwrap();
    let root = tree.root().unwrap();
    let first = tree.children(root)[0];

    let report = tree.mount_root(Fragment::new([Text::new("x")])).unwrap();

    assert_eq!(tree.children(root), [first]);
    assert_eq!(report.unmounted, 2);
    assert_eq!(recorder(&tree).labels(None), ["x"]);
    assert_eq!(recorder(&tree).count(Op::Update), 1);
    assert_eq!(recorder(&tree).count(Op::Release), 2);
    assert_eq!(tree.inactive_len(), 0);
}

#[test]
fn global_key_relocation_preserves_state() {
    let log = Log::default();
    let key = GlobalKey::labeled("counter");
    let layout = |left: bool| {
        let counter = || Counter::new("K", &log).keyed(key.clone());
        Fragment::new([
            Node::new("left").children(left.then(counter)),
            Node::new("right").child(Node::new("inner").children((!left).then(counter))),
        ])
    };

    let mut tree = checked_tree();
    tree.mount_root(layout(true)).unwrap();
    let id = tree.global_element(&key).unwrap();
    assert!(tree.update_state::<CounterState>(&key, |state| state.count = 5));
    tree.flush().unwrap();

    let root = tree.root().unwrap();
    let left = tree.children(root)[0];
    let right = tree.children(root)[1];
    let left_handle = tree.resource(left);
    assert_eq!(recorder(&tree).labels(left_handle), ["K:5"]);

    for to_left in [false, true] {
        let report = tree.mount_root(layout(to_left)).unwrap();
        assert_eq!(report.unmounted, 0);
        assert_eq!(tree.global_element(&key), Some(id));
        let parent = if to_left {
            left
        } else {
            tree.children(right)[0]
        };
        assert_eq!(tree.parent(id), Some(parent));
        assert_eq!(tree.depth(id), tree.depth(parent).map(|d| d + 1));
        assert_eq!(tree.with_state(&key, |s: &CounterState| s.count), Some(5));
        assert_eq!(recorder(&tree).labels(tree.resource(parent)), ["K:5"]);
        assert_eq!(tree.inactive_len(), 0);
        assert_consistent(&tree);
    }

    let inner = tree.children(right)[0];
    assert!(recorder(&tree).labels(tree.resource(inner)).is_empty());
    assert_eq!(entries(&log, "init"), 1);
    assert_eq!(entries(&log, "deactivate"), 2);
    assert_eq!(entries(&log, "activate"), 2);
    assert_eq!(entries(&log, "dispose"), 0);
}

#[test]
fn relocated_element_refreshes_its_dependencies() {
    let log = Log::default();
    let key = GlobalKey::new();
    let layout = |first: bool| {
        let counter = || Counter::new("K", &log).themed().keyed(key.clone());
        Theme {
            color: "red",
            child: Fragment::new([
                Node::new("a").children(first.then(counter)),
                Node::new("b").children((!first).then(counter)),
            ])
            .into(),
        }
    };

    let mut tree = checked_tree();
    tree.mount_root(layout(true)).unwrap();
    let theme = tree.root().unwrap();
    let id = tree.global_element(&key).unwrap();
    assert_eq!(tree.dependencies(id), [theme]);

    tree.mount_root(layout(false)).unwrap();

    assert_eq!(tree.global_element(&key), Some(id));
    assert_eq!(tree.dependencies(id), [theme]);
    assert_eq!(tree.dependents(theme), [id]);
    assert_eq!(entries(&log, "deps"), 2);
}

#[derive(Debug)]
struct Nudger {
    key: Option<Key>,
    deps: Rc<Cell<usize>>,
}

impl StatefulWidget for Nudger {
    fn create_state(&self) -> Box<dyn AnyState> {
        Box::new(NudgerState)
    }
}

crate::impl_widget!(Nudger, Stateful, key = key);

/// Marks its parent whenever its dependencies change.
struct NudgerState;

impl State for NudgerState {
    type Widget = Nudger;

    fn did_change_dependencies(&mut self, widget: &Nudger, cx: &mut BuildContext<'_>) {
        widget.deps.set(widget.deps.get() + 1);
        if let Some(parent) = cx.tree().parent(cx.element()) {
            cx.mark_element_needs_build(parent);
        }
    }

    fn build(&mut self, _widget: &Nudger, cx: &mut BuildContext<'_>) -> BuildResult {
        cx.depend_on::<Theme>();
        Ok(Fragment::empty().into())
    }
}

#[test]
fn reactivated_state_may_mark_ancestors_on_dependency_change() {
    let deps = Rc::new(Cell::new(0));
    let key = GlobalKey::new();
    let layout = |first: bool| {
        let nudger = || Nudger {
            key: Some(key.clone().into()),
            deps: deps.clone(),
        };
        Theme {
            color: "red",
            child: Fragment::new([
                Node::new("a").children(first.then(nudger)),
                Node::new("b").children((!first).then(nudger)),
            ])
            .into(),
        }
    };

    let mut tree = checked_tree();
    tree.mount_root(layout(true)).unwrap();
    let id = tree.global_element(&key).unwrap();
    assert_eq!(deps.get(), 1);

    tree.mount_root(layout(false)).unwrap();

    assert_eq!(tree.global_element(&key), Some(id));
    assert_eq!(deps.get(), 2);
    let parent = tree.parent(id).unwrap();
    assert_eq!(
        tree.widget(parent)
            .and_then(|w| w.downcast_ref::<Node>())
            .map(Node::tag),
        Some("b")
    );
}

#[test]
fn parents_rebuild_before_children_and_once_per_flush() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(Counter::new("P", &log).child(Counter::new("Q", &log)))
        .unwrap();
    let parent = tree.root().unwrap();
    let child = find_counter(&tree, "Q");
    assert_eq!(tree.depth(child), Some(2));

    tree.handle(child).mark_needs_build();
    tree.handle(parent).mark_needs_build();
    tree.handle(child).mark_needs_build();
    let report = tree.flush().unwrap();

    assert_eq!(report.rebuild_count(parent), 1);
    assert_eq!(report.rebuild_count(child), 1);
    let position = |id| report.rebuilt.iter().position(|r| *r == id).unwrap();
    assert!(position(parent) < position(child));
    assert_consistent(&tree);
}

#[test]
fn inherited_changes_rebuild_only_dependents() {
    let log = Log::default();
    let content: AnyWidget = Fragment::new([
        AnyWidget::new(Counter::new("D", &log).themed()),
        AnyWidget::new(Counter::new("N", &log)),
    ])
    .into();
    let theme = |color| Theme {
        color,
        child: content.clone(),
    };

    let mut tree = checked_tree();
    tree.mount_root(theme("red")).unwrap();
    let root = tree.root().unwrap();
    let dependent = find_counter(&tree, "D");
    let other = find_counter(&tree, "N");
    assert_eq!(tree.dependents(root), [dependent]);
    assert_eq!(recorder(&tree).labels(None), ["D:0:red", "N:0"]);

    let report = tree.mount_root(theme("blue")).unwrap();
    assert_eq!(report.rebuild_count(dependent), 1);
    assert_eq!(report.rebuild_count(other), 0);
    assert_eq!(recorder(&tree).labels(None), ["D:0:blue", "N:0"]);
    assert_eq!(entries(&log, "deps D"), 2);

    let report = tree.mount_root(theme("blue")).unwrap();
    assert_eq!(report.rebuild_count(dependent), 0);
    assert_eq!(entries(&log, "deps D"), 2);
}

#[derive(Debug)]
struct Account {
    name: &'static str,
    version: u32,
    checks: Rc<Cell<usize>>,
    child: AnyWidget,
}

impl InheritedWidget for Account {
    fn child(&self) -> AnyWidget {
        self.child.clone()
    }

    fn update_should_notify(&self, old: &AnyWidget) -> bool {
        old.downcast_ref::<Self>()
            .is_none_or(|old| old.name != self.name || old.version != self.version)
    }

    fn update_should_notify_dependent(&self, old: &AnyWidget, aspect: &dyn Any) -> bool {
        self.checks.set(self.checks.get() + 1);
        let Some(old) = old.downcast_ref::<Self>() else {
            return true;
        };
        match aspect.downcast_ref::<&'static str>() {
            Some(&"name") => old.name != self.name,
            Some(&"version") => old.version != self.version,
            _ => true,
        }
    }
}

crate::impl_widget!(Account, Inherited);

#[test]
fn repeated_aspect_subscriptions_are_kept_once() {
    let checks = Rc::new(Cell::new(0));
    let builds = Rc::new(Cell::new(0));
    let counter = builds.clone();
    let reader: AnyWidget = Builder::new(move |cx| {
        counter.set(counter.get() + 1);
        let name = cx
            .depend_on_aspect::<Account, _>("name")
            .map_or("", |account| account.name);
        Ok(Text::new(name).into())
    })
    .into();
    let account = |name, version| Account {
        name,
        version,
        checks: checks.clone(),
        child: reader.clone(),
    };

    let mut tree = checked_tree();
    tree.mount_root(account("ada", 1)).unwrap();
    let root = tree.root().unwrap();
    let subscriber = tree.children(root)[0];
    for _ in 0..50 {
        tree.handle(subscriber).mark_needs_build();
        tree.flush().unwrap();
    }
    assert_eq!(builds.get(), 51);
    assert_eq!(tree.dependents(root), [subscriber]);

    let report = tree.mount_root(account("ada", 2)).unwrap();
    assert_eq!(checks.get(), 1);
    assert_eq!(report.rebuild_count(subscriber), 0);
    assert_eq!(recorder(&tree).labels(None), ["ada"]);

    let report = tree.mount_root(account("grace", 2)).unwrap();
    assert_eq!(checks.get(), 2);
    assert_eq!(report.rebuild_count(subscriber), 1);
    assert_eq!(recorder(&tree).labels(None), ["grace"]);
}

#[test]
fn failed_builds_show_the_error_widget() {
    let mut tree = checked_tree();
    let report = tree
        .mount_root(Builder::new(|_| Err(BuildError::msg("boom"))))
        .unwrap();

    assert_eq!(report.failed_builds, 1);
    let root = tree.root().unwrap();
    let placeholder = tree.children(root)[0];
    assert_eq!(
        tree.widget(placeholder)
            .and_then(|w| w.downcast_ref::<ErrorWidget>())
            .map(ErrorWidget::message),
        Some("boom")
    );
    assert_eq!(recorder(&tree).labels(None), ["error"]);
    assert_eq!(recorder(&tree).labels(tree.resource(placeholder)), ["boom"]);
}

#[test]
fn error_widget_is_configurable() {
    let config = TreeConfig::new()
        .error_widget(|error| Text::new(format!("oops: {error}")).into());
    let mut tree = ElementTree::with_config(Recorder::default(), config);
    tree.mount_root(Builder::new(|_| Err(BuildError::msg("boom"))))
        .unwrap();
    assert_eq!(recorder(&tree).labels(None), ["oops: boom"]);
}

#[test]
fn scheduler_runs_once_per_idle_period() {
    let log = Log::default();
    let calls = Rc::new(Cell::new(0));
    let hook = calls.clone();
    let config = TreeConfig::new().scheduler(move || hook.set(hook.get() + 1));
    let mut tree = ElementTree::with_config(Recorder::default(), config);
    tree.mount_root(Counter::new("A", &log)).unwrap();
    assert_eq!(calls.get(), 0);

    let root = tree.root().unwrap();
    let handle = tree.handle(root);
    assert!(handle.mark_needs_build());
    assert!(handle.mark_needs_build());
    assert_eq!(calls.get(), 1);
    assert_eq!(tree.owner().phase(), BuildPhase::Scheduled);

    let report = tree.flush().unwrap();
    assert_eq!(report.rebuild_count(root), 1);
    assert_eq!(tree.owner().phase(), BuildPhase::Idle);

    handle.mark_needs_build();
    assert_eq!(calls.get(), 2);
}

#[test]
fn handles_of_unmounted_elements_do_nothing() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(Counter::new("A", &log)).unwrap();
    let handle = tree.handle(tree.root().unwrap());

    tree.unmount_root().unwrap();
    handle.mark_needs_build();
    let report = tree.flush().unwrap();

    assert!(report.rebuilt.is_empty());
    assert!(tree.is_empty());
    assert_eq!(entries(&log, "dispose"), 1);
    assert_eq!(
        recorder(&tree).count(Op::Release),
        recorder(&tree).count(Op::Create)
    );
}

#[test]
fn state_lifecycle_reaches_ready() {
    let log = Log::default();
    let mut tree = checked_tree();
    tree.mount_root(Counter::new("A", &log)).unwrap();
    let root = tree.root().unwrap();
    assert_eq!(tree.state_lifecycle(root), Some(StateLifecycle::Ready));
    assert_eq!(tree.state::<CounterState>(root).map(|s| s.count), Some(0));
    assert!(tree.state::<LoaderState>(root).is_none());
}

#[test]
fn marking_an_ancestor_while_building_is_rejected() {
    let mut tree = ElementTree::with_config(NullBackend::default(), TreeConfig::new().debug_checks(true));
    let result = tree.mount_root(Fragment::new([Builder::new(|cx| {
        if let Some(parent) = cx.tree().parent(cx.element()) {
            cx.mark_element_needs_build(parent);
        }
        Ok(Fragment::empty().into())
    })]));
    assert!(matches!(
        result,
        Err(TreeError::MarkNeedsBuildOutOfScope { .. })
    ));
}

#[test]
fn handles_marking_an_ancestor_while_building_are_rejected() {
    let mut tree = ElementTree::with_config(NullBackend::default(), TreeConfig::new().debug_checks(true));
    let result = tree.mount_root(Fragment::new([Builder::new(|cx| {
        if let Some(parent) = cx.tree().parent(cx.element()) {
            cx.tree().handle(parent).mark_needs_build();
        }
        Ok(Fragment::empty().into())
    })]));
    assert!(matches!(
        result,
        Err(TreeError::MarkNeedsBuildOutOfScope { .. })
    ));
}

#[test]
fn interrupted_flush_still_unmounts_replaced_children() {
    let mut tree = checked_tree();
    tree.mount_root(Fragment::new(
        ["a", "b", "c"].map(|label| Text::new(label).with_key(Key::value(label))),
    ))
    .unwrap();
    let root = tree.root().unwrap();
    let replaced = tree.children(root).to_vec();
    assert_eq!(replaced.len(), 3);

    let result = tree.mount_root(Fragment::new([
        AnyWidget::new(Text::new("x").with_key(Key::value("x"))),
        AnyWidget::new(Builder::new(|cx| {
            if let Some(parent) = cx.tree().parent(cx.element()) {
                cx.mark_element_needs_build(parent);
            }
            Ok(Fragment::empty().into())
        })),
    ]));

    assert!(matches!(
        result,
        Err(TreeError::MarkNeedsBuildOutOfScope { .. })
    ));
    assert_eq!(tree.inactive_len(), 0);
    assert!(replaced.iter().all(|id| !tree.contains(*id)));
    assert_eq!(recorder(&tree).count(Op::Release), 3);
    assert_eq!(recorder(&tree).labels(None), ["x"]);
}

#[derive(Debug)]
struct Eager;

impl StatefulWidget for Eager {
    fn create_state(&self) -> Box<dyn AnyState> {
        Box::new(EagerState)
    }
}

crate::impl_widget!(Eager, Stateful);

struct EagerState;

impl State for EagerState {
    type Widget = Eager;

    fn init_state(&mut self, _widget: &Eager, cx: &mut BuildContext<'_>) {
        if let Some(parent) = cx.tree().parent(cx.element()) {
            cx.mark_element_needs_build(parent);
        }
    }

    fn build(&mut self, _widget: &Eager, _cx: &mut BuildContext<'_>) -> BuildResult {
        Ok(Fragment::empty().into())
    }
}

#[test]
fn init_state_may_mark_ancestors() {
    let mut tree = ElementTree::with_config(NullBackend::default(), TreeConfig::new().debug_checks(true));
    let report = tree.mount_root(Fragment::new([Eager])).unwrap();
    let root = tree.root().unwrap();
    assert_eq!(report.rebuild_count(root), 2);
}

#[test]
fn duplicate_global_keys_are_fatal_under_checks() {
    let key = GlobalKey::new();
    let widgets = || {
        Fragment::new([
            AnyWidget::new(Text::new("a").with_key(key.clone())),
            AnyWidget::new(Node::new("b").with_key(key.clone())),
        ])
    };

    let mut tree = checked_tree();
    let result = tree.mount_root(widgets());
    assert!(matches!(result, Err(TreeError::DuplicateGlobalKey { .. })));

    let mut tree =
        ElementTree::with_config(Recorder::default(), TreeConfig::new().debug_checks(false));
    tree.mount_root(widgets()).unwrap();
    let root = tree.root().unwrap();
    let survivor = tree.global_element(&key).unwrap();
    assert_eq!(tree.children(root), [survivor]);
    assert_eq!(recorder(&tree).labels(None), ["b"]);
}

#[test]
fn global_key_inside_its_own_subtree_is_a_cycle() {
    let key = GlobalKey::new();
    let mut tree = checked_tree();
    tree.mount_root(Fragment::new([Node::new("outer").with_key(key.clone())]))
        .unwrap();

    let nested = Node::new("outer")
        .with_key(key.clone())
        .child(Node::new("outer").with_key(key.clone()));
    let result = tree.mount_root(Fragment::new([nested]));
    assert!(matches!(result, Err(TreeError::GlobalKeyCycle { .. })));
}

type Events = Rc<RefCell<Vec<(&'static str, ElementId)>>>;

#[derive(Debug)]
struct Watcher {
    events: Events,
    child: AnyWidget,
}

impl ObserverWidget for Watcher {
    fn child(&self) -> AnyWidget {
        self.child.clone()
    }

    fn will_rebuild(&self, element: ElementId) {
        self.events.borrow_mut().push(("will", element));
    }

    fn did_rebuild(&self, element: ElementId) {
        self.events.borrow_mut().push(("did", element));
    }

    fn did_unmount(&self, element: ElementId) {
        self.events.borrow_mut().push(("unmount", element));
    }
}

crate::impl_widget!(Watcher, Observer);

#[test]
fn observers_see_descendant_rebuilds() {
    let log = Log::default();
    let events = Events::default();
    let mut tree = checked_tree();
    tree.mount_root(Watcher {
        events: events.clone(),
        child: Counter::new("A", &log).into(),
    })
    .unwrap();
    let watcher = tree.root().unwrap();
    let counter = find_counter(&tree, "A");
    assert!(events.borrow().iter().all(|(_, id)| *id != watcher));

    events.borrow_mut().clear();
    tree.handle(counter).mark_needs_build();
    tree.flush().unwrap();
    assert_eq!(events.borrow().first(), Some(&("will", counter)));
    assert!(events.borrow().contains(&("did", counter)));

    events.borrow_mut().clear();
    tree.unmount_root().unwrap();
    assert!(events.borrow().contains(&("unmount", counter)));
    assert!(events.borrow().iter().all(|(_, id)| *id != watcher));
}

struct Ping(u32);

#[test]
fn notifications_bubble_to_listeners() {
    let seen = Rc::new(Cell::new(0));
    let consumed = Rc::new(Cell::new(false));
    let unclaimed = Rc::new(Cell::new(true));
    let (s, c, u) = (seen.clone(), consumed.clone(), unclaimed.clone());

    let mut tree = checked_tree();
    tree.mount_root(NotificationListener::new(
        Node::new("panel").child(Builder::new(move |cx| {
            c.set(cx.dispatch_notification(&Ping(7)));
            u.set(cx.dispatch_notification(&"ignored"));
            Ok(Fragment::empty().into())
        })),
        move |ping: &Ping| {
            s.set(ping.0);
            true
        },
    ))
    .unwrap();

    assert_eq!(seen.get(), 7);
    assert!(consumed.get());
    assert!(!unclaimed.get());
}

#[derive(Debug)]
struct Loader {
    value: u32,
    nested: bool,
}

impl StatefulWidget for Loader {
    fn create_state(&self) -> Box<dyn AnyState> {
        Box::new(LoaderState { loaded: None })
    }
}

crate::impl_widget!(Loader, Stateful);

struct LoaderState {
    loaded: Option<u32>,
}

impl State for LoaderState {
    type Widget = Loader;

    fn build(&mut self, widget: &Loader, _cx: &mut BuildContext<'_>) -> BuildResult {
        let text = Text::new(
            self.loaded
                .map_or_else(|| "loading".to_owned(), |value| value.to_string()),
        );
        if widget.nested && self.loaded.is_some() {
            let inner = Loader {
                value: widget.value + 1,
                nested: false,
            };
            return Ok(Fragment::new([AnyWidget::new(text), inner.into()]).into());
        }
        Ok(text.into())
    }

    fn preload(&mut self, widget: &Loader) -> Option<Preload<Self>> {
        let value = widget.value;
        Some(
            async move {
                let apply: Box<dyn FnOnce(&mut Self)> =
                    Box::new(move |state: &mut Self| state.loaded = Some(value));
                apply
            }
            .boxed_local(),
        )
    }
}

#[test]
fn pre_render_waits_for_preloads() {
    let config = TreeConfig::new().mode(Mode::PreRender).debug_checks(true);
    let mut tree = ElementTree::with_config(Recorder::default(), config);
    tree.mount_root(Loader {
        value: 1,
        nested: true,
    })
    .unwrap();

    let root = tree.root().unwrap();
    assert!(tree.has_pending_preloads());
    assert!(tree.is_pending(root));
    assert!(tree.children(root).is_empty());
    assert!(recorder(&tree).labels(None).is_empty());

    futures::executor::block_on(tree.settle()).unwrap();

    assert!(!tree.has_pending_preloads());
    assert!(!tree.is_pending(root));
    assert_eq!(recorder(&tree).labels(None), ["1", "2"]);
}

#[test]
fn interactive_mode_builds_without_preloading() {
    let mut tree = checked_tree();
    tree.mount_root(Loader {
        value: 1,
        nested: true,
    })
    .unwrap();
    assert!(!tree.has_pending_preloads());
    assert_eq!(recorder(&tree).labels(None), ["loading"]);
}

#[test]
fn ancestor_queries_walk_up() {
    let log = Log::default();
    let found = Rc::new(Cell::new(None));
    let colors = Rc::new(RefCell::new(Vec::new()));
    let (f, c) = (found.clone(), colors.clone());
    let probe = Builder::new(move |cx| {
        f.set(cx.find_ancestor_state::<CounterState>().map(|s| s.count));
        c.borrow_mut().extend(cx.find_inherited::<Theme>().map(|t| t.color));
        Ok(Fragment::empty().into())
    });

    let mut tree = checked_tree();
    tree.mount_root(Theme {
        color: "green",
        child: Counter::new("outer", &log).child(probe).into(),
    })
    .unwrap();

    assert_eq!(found.get(), Some(0));
    assert_eq!(*colors.borrow(), ["green"]);
    assert!(tree.dependents(tree.root().unwrap()).is_empty());
}

proptest! {
    #[test]
    fn keyed_permutations_keep_identity_and_order(
        order in (0..10usize).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let row = |order: &[usize]| {
            Fragment::new(order.iter().map(|i| Text::new(i.to_string()).with_key(Key::value(*i))))
        };
        let initial: Vec<usize> = (0..order.len()).collect();
        let mut tree = ElementTree::new(Recorder::default());
        tree.mount_root(row(&initial)).unwrap();
        let root = tree.root().unwrap();
        let ids = tree.children(root).to_vec();
        let created = recorder(&tree).count(Op::Create);

        tree.mount_root(row(&order)).unwrap();

        let expected: Vec<ElementId> = order.iter().map(|i| ids[*i]).collect();
        prop_assert_eq!(tree.children(root), expected.as_slice());
        prop_assert_eq!(recorder(&tree).count(Op::Create), created);
        prop_assert_eq!(recorder(&tree).count(Op::Release), 0);
        let labels: Vec<String> = order.iter().map(ToString::to_string).collect();
        prop_assert_eq!(recorder(&tree).labels(None), labels);
    }
}
