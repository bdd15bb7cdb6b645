//! Driving an element tree from a host loop.

use alloc::rc::Rc;
use core::cell::Cell;

use canopy_core::{
    AnyWidget, ElementTree, FlushReport, Mode, ResourceBackend, TreeConfig, TreeError,
};
use canopy_memory::MemoryBackend;

/// An element tree plus the flag its scheduling hook raises.
///
/// Marking an element dirty, from a [`StateHandle`](canopy_core::StateHandle), a signal or
/// [`ElementTree::update_state`], only raises the flag. The host decides when to call
/// [`pump`](Self::pump), typically once per frame or event-loop turn.
#[derive(Debug)]
pub struct Runtime {
    tree: ElementTree,
    requested: Rc<Cell<bool>>,
}

impl Runtime {
    /// Creates a runtime whose mode is read from `CANOPY_MODE`.
    pub fn new(backend: impl ResourceBackend) -> Self {
        Self::with_config(backend, TreeConfig::new().mode(Mode::from_env()))
    }

    /// Creates a runtime from an explicit configuration. Its scheduling hook is replaced.
    pub fn with_config(backend: impl ResourceBackend, config: TreeConfig) -> Self {
        let requested = Rc::new(Cell::new(false));
        let flag = requested.clone();
        let config = config.scheduler(move || flag.set(true));
        Self {
            tree: ElementTree::with_config(backend, config),
            requested,
        }
    }

    /// Mounts `widget` as the root, or reconciles the current root against it.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during the pass.
    pub fn mount(&mut self, widget: impl Into<AnyWidget>) -> Result<FlushReport, TreeError> {
        self.tree.mount_root(widget)
    }

    /// Whether a flush was requested since the last [`pump`](Self::pump).
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        self.requested.get()
    }

    /// Flushes if a flush was requested. Returns `None` when there was nothing to do.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation hit during the flush.
    pub fn pump(&mut self) -> Result<Option<FlushReport>, TreeError> {
        if !self.requested.replace(false) {
            return Ok(None);
        }
        let report = self.tree.flush()?;
        tracing::debug!(rebuilt = report.rebuilt.len(), unmounted = report.unmounted, "pumped");
        Ok(Some(report))
    }

    /// The tree.
    #[must_use]
    pub const fn tree(&self) -> &ElementTree {
        &self.tree
    }

    /// The tree, mutably.
    pub const fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    /// The backend downcast to its concrete type.
    #[must_use]
    pub fn backend<B: ResourceBackend>(&self) -> Option<&B> {
        self.tree.backend_as()
    }
}

/// Renders `widget` to markup in [`Mode::PreRender`], waiting for every preload.
///
/// ```
/// use canopy::{Node, Text, render_to_string};
///
/// let html = render_to_string(Node::new("h1").child(Text::new("Hello")))?;
/// assert_eq!(html, "<h1>Hello</h1>");
/// # Ok::<(), canopy::TreeError>(())
/// ```
///
/// # Errors
///
/// Returns the first contract violation hit while building.
pub fn render_to_string(widget: impl Into<AnyWidget>) -> Result<String, TreeError> {
    let config = TreeConfig::new().mode(Mode::PreRender);
    let mut tree = ElementTree::with_config(MemoryBackend::new(), config);
    tree.mount_root(widget)?;
    futures::executor::block_on(tree.settle())?;
    Ok(tree
        .backend_as::<MemoryBackend>()
        .map(MemoryBackend::to_markup)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use canopy_core::{
        AnyState, BuildContext, BuildResult, Fragment, GlobalKey, Preload, State, StatefulWidget,
        Text, impl_widget,
    };
    use futures::FutureExt;

    use super::*;

    #[derive(Debug)]
    struct Clicks {
        key: Option<canopy_core::Key>,
    }

    impl StatefulWidget for Clicks {
        fn create_state(&self) -> Box<dyn AnyState> {
            Box::new(ClicksState { clicks: 0 })
        }
    }

    impl_widget!(Clicks, Stateful, key = key);

    struct ClicksState {
        clicks: u32,
    }

    impl State for ClicksState {
        type Widget = Clicks;

        fn build(&mut self, _widget: &Clicks, _cx: &mut BuildContext<'_>) -> BuildResult {
            Ok(Text::new(format!("clicked {} times", self.clicks)).into())
        }
    }

    #[test]
    fn pump_flushes_only_when_requested() {
        let key = GlobalKey::new();
        let mut runtime = Runtime::with_config(MemoryBackend::new(), TreeConfig::new());
        runtime
            .mount(Clicks {
                key: Some(key.clone().into()),
            })
            .unwrap();
        assert!(!runtime.needs_flush());
        assert_eq!(runtime.pump().unwrap(), None);

        assert!(
            runtime
                .tree_mut()
                .update_state::<ClicksState>(&key, |state| state.clicks += 2)
        );
        assert!(runtime.needs_flush());
        let report = runtime.pump().unwrap().unwrap();
        assert_eq!(report.rebuilt.len(), 2);
        assert!(!runtime.needs_flush());

        let markup = runtime.backend::<MemoryBackend>().unwrap().to_markup();
        assert_eq!(markup, "clicked 2 times");
    }

    #[derive(Debug)]
    struct Profile;

    impl StatefulWidget for Profile {
        fn create_state(&self) -> Box<dyn AnyState> {
            Box::new(ProfileState { name: None })
        }
    }

    impl_widget!(Profile, Stateful);

    struct ProfileState {
        name: Option<String>,
    }

    impl State for ProfileState {
        type Widget = Profile;

        fn build(&mut self, _widget: &Profile, _cx: &mut BuildContext<'_>) -> BuildResult {
            Ok(match &self.name {
                Some(name) => Text::new(name.clone()).into(),
                None => Fragment::empty().into(),
            })
        }

        fn preload(&mut self, _widget: &Profile) -> Option<Preload<Self>> {
            Some(
                async {
                    let apply: Box<dyn FnOnce(&mut Self)> =
                        Box::new(|state: &mut Self| state.name = Some("Ada".to_owned()));
                    apply
                }
                .boxed_local(),
            )
        }
    }

    #[test]
    fn render_to_string_waits_for_preloads() {
        let html = render_to_string(canopy_core::Node::new("div").child(Profile)).unwrap();
        assert_eq!(html, "<div>Ada</div>");
    }
}
