//! Widgets driven by reactive signals.

use core::fmt;
use core::marker::PhantomData;

use canopy_core::{
    AnyState, AnyWidget, BuildContext, BuildResult, Key, State, StatefulWidget, Widget, WidgetKind,
};
use nami::Signal;

/// Rebuilds its child whenever `signal` changes.
///
/// The subscription lives in the element's state: it is made when the element mounts, renewed
/// when the widget is replaced, and dropped when the element is unmounted.
///
/// ```
/// use canopy::{Runtime, Text, Watch};
/// use canopy_memory::MemoryBackend;
///
/// let count = nami::binding(0);
/// let mut runtime = Runtime::new(MemoryBackend::new());
/// runtime.mount(Watch::new(count.clone(), |n: i32| Text::new(n.to_string()).into()))?;
///
/// count.set(3);
/// runtime.pump()?;
/// assert_eq!(runtime.backend::<MemoryBackend>().unwrap().to_markup(), "3");
/// # Ok::<(), canopy::TreeError>(())
/// ```
pub struct Watch<S, F> {
    signal: S,
    build: F,
    key: Option<Key>,
}

impl<S, F> Watch<S, F>
where
    S: Signal + 'static,
    F: Fn(S::Output) -> AnyWidget + 'static,
{
    /// Builds the child from the current value of `signal`.
    pub const fn new(signal: S, build: F) -> Self {
        Self {
            signal,
            build,
            key: None,
        }
    }

    /// Attaches a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl<S, F> fmt::Debug for Watch<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("signal", &core::any::type_name::<S>())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<S, F> StatefulWidget for Watch<S, F>
where
    S: Signal + 'static,
    F: Fn(S::Output) -> AnyWidget + 'static,
{
    fn create_state(&self) -> Box<dyn AnyState> {
        Box::new(WatchState::<S, F> {
            guard: None,
            _build: PhantomData,
        })
    }
}

impl<S, F> Widget for Watch<S, F>
where
    S: Signal + 'static,
    F: Fn(S::Output) -> AnyWidget + 'static,
{
    fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    fn kind(&self) -> WidgetKind<'_> {
        WidgetKind::Stateful(self)
    }
}

struct WatchState<S: Signal, F> {
    guard: Option<S::Guard>,
    _build: PhantomData<fn() -> F>,
}

impl<S, F> WatchState<S, F>
where
    S: Signal + 'static,
    F: Fn(S::Output) -> AnyWidget + 'static,
{
    fn subscribe(&mut self, widget: &Watch<S, F>, cx: &BuildContext<'_>) {
        let handle = cx.handle();
        self.guard = Some(widget.signal.watch(move |_| {
            handle.mark_needs_build();
        }));
    }
}

impl<S, F> State for WatchState<S, F>
where
    S: Signal + 'static,
    F: Fn(S::Output) -> AnyWidget + 'static,
{
    type Widget = Watch<S, F>;

    fn init_state(&mut self, widget: &Watch<S, F>, cx: &mut BuildContext<'_>) {
        self.subscribe(widget, cx);
    }

    fn did_update_widget(
        &mut self,
        _old: &Watch<S, F>,
        widget: &Watch<S, F>,
        cx: &mut BuildContext<'_>,
    ) {
        self.subscribe(widget, cx);
    }

    fn build(&mut self, widget: &Watch<S, F>, _cx: &mut BuildContext<'_>) -> BuildResult {
        Ok((widget.build)(widget.signal.get()))
    }

    fn dispose(&mut self) {
        self.guard = None;
    }
}
