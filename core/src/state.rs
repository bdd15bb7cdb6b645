//! Long-lived state owned by stateful elements.
//!
//! A [`State`] is created once when its element is created, survives every update of the
//! element's widget, and is disposed when the element is unmounted. The tree talks to states
//! through the object-safe [`AnyState`], which is implemented for every `State` automatically.

use core::any::Any;
use core::fmt;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::context::BuildContext;
use crate::widget::{AnyWidget, BuildResult, Widget};

/// A deferred first-build input: once the future resolves, the returned closure is applied to
/// the state before it builds for the first time.
pub type Preload<S> = LocalBoxFuture<'static, Box<dyn FnOnce(&mut S)>>;

/// Type-erased [`Preload`].
pub type ErasedPreload = LocalBoxFuture<'static, Box<dyn FnOnce(&mut dyn AnyState)>>;

/// Lifecycle of a state container. Transitions are strictly monotonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateLifecycle {
    /// Allocated, `init_state` has not run yet.
    Created,
    /// `init_state` ran.
    Initialized,
    /// Dependencies resolved for the first time; the state may build.
    Ready,
    /// Disposed. Terminal.
    Defunct,
}

impl StateLifecycle {
    /// Moves to `next`, refusing to go backwards.
    pub(crate) fn advance(&mut self, next: Self) -> bool {
        debug_assert!(next >= *self, "state lifecycle cannot move from {self:?} to {next:?}");
        if next < *self {
            return false;
        }
        *self = next;
        true
    }
}

impl fmt::Display for StateLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Ready => "ready",
            Self::Defunct => "defunct",
        })
    }
}

/// Mutable state behind a [`StatefulWidget`](crate::StatefulWidget).
///
/// ```
/// use canopy_core::{BuildContext, BuildResult, State, Text, impl_widget};
///
/// #[derive(Debug)]
/// struct Counter;
/// impl_widget!(Counter, Stateful);
///
/// impl canopy_core::StatefulWidget for Counter {
///     fn create_state(&self) -> Box<dyn canopy_core::AnyState> {
///         Box::new(CounterState { count: 0 })
///     }
/// }
///
/// struct CounterState {
///     count: u32,
/// }
///
/// impl State for CounterState {
///     type Widget = Counter;
///
///     fn build(&mut self, _widget: &Counter, _cx: &mut BuildContext<'_>) -> BuildResult {
///         Ok(Text::new(self.count.to_string()).into())
///     }
/// }
/// ```
pub trait State: 'static {
    /// The widget type this state belongs to.
    type Widget: Widget;

    /// Called once, right after the element is mounted.
    fn init_state(&mut self, widget: &Self::Widget, cx: &mut BuildContext<'_>) {
        let _ = (widget, cx);
    }

    /// Called after `init_state` and whenever an inherited value this state depends on changed.
    fn did_change_dependencies(&mut self, widget: &Self::Widget, cx: &mut BuildContext<'_>) {
        let _ = (widget, cx);
    }

    /// Called when the element was updated with a new widget of the same type and key.
    fn did_update_widget(
        &mut self,
        old: &Self::Widget,
        widget: &Self::Widget,
        cx: &mut BuildContext<'_>,
    ) {
        let _ = (old, widget, cx);
    }

    /// Builds the child description.
    ///
    /// # Errors
    ///
    /// A returned error replaces the child with the tree's error widget.
    fn build(&mut self, widget: &Self::Widget, cx: &mut BuildContext<'_>) -> BuildResult;

    /// Called when the element is reinserted after having been deactivated.
    fn activate(&mut self) {}

    /// Called when the element is removed from the tree, possibly temporarily.
    fn deactivate(&mut self) {}

    /// Called once when the element is unmounted for good.
    fn dispose(&mut self) {}

    /// Asynchronous input for the first build. Only consulted in
    /// [`Mode::PreRender`](crate::Mode::PreRender).
    fn preload(&mut self, widget: &Self::Widget) -> Option<Preload<Self>> {
        let _ = widget;
        None
    }
}

/// Object-safe view of a [`State`] used by the element tree.
///
/// Implemented for every `State`; there is no reason to implement it by hand.
pub trait AnyState: Any {
    #[doc(hidden)]
    fn dyn_init_state(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>);
    #[doc(hidden)]
    fn dyn_did_change_dependencies(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>);
    #[doc(hidden)]
    fn dyn_did_update_widget(
        &mut self,
        old: &AnyWidget,
        widget: &AnyWidget,
        cx: &mut BuildContext<'_>,
    );
    #[doc(hidden)]
    fn dyn_build(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>) -> BuildResult;
    #[doc(hidden)]
    fn dyn_activate(&mut self);
    #[doc(hidden)]
    fn dyn_deactivate(&mut self);
    #[doc(hidden)]
    fn dyn_dispose(&mut self);
    #[doc(hidden)]
    fn dyn_preload(&mut self, widget: &AnyWidget) -> Option<ErasedPreload>;
    /// The Rust type name of the state, used in diagnostics.
    fn state_type_name(&self) -> &'static str;
}

impl<S: State> AnyState for S {
    fn dyn_init_state(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>) {
        if let Some(widget) = typed::<S>(widget) {
            State::init_state(self, widget, cx);
        }
    }

    fn dyn_did_change_dependencies(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>) {
        if let Some(widget) = typed::<S>(widget) {
            State::did_change_dependencies(self, widget, cx);
        }
    }

    fn dyn_did_update_widget(
        &mut self,
        old: &AnyWidget,
        widget: &AnyWidget,
        cx: &mut BuildContext<'_>,
    ) {
        if let (Some(old), Some(widget)) = (typed::<S>(old), typed::<S>(widget)) {
            State::did_update_widget(self, old, widget, cx);
        }
    }

    fn dyn_build(&mut self, widget: &AnyWidget, cx: &mut BuildContext<'_>) -> BuildResult {
        let typed = typed::<S>(widget).ok_or_else(|| {
            crate::BuildError::Message(format!(
                "{} cannot build from a {}",
                core::any::type_name::<S>(),
                widget.type_name()
            ))
        })?;
        State::build(self, typed, cx)
    }

    fn dyn_activate(&mut self) {
        State::activate(self);
    }

    fn dyn_deactivate(&mut self) {
        State::deactivate(self);
    }

    fn dyn_dispose(&mut self) {
        State::dispose(self);
    }

    fn dyn_preload(&mut self, widget: &AnyWidget) -> Option<ErasedPreload> {
        let widget = typed::<S>(widget)?;
        let future = State::preload(self, widget)?;
        Some(
            future
                .map(|apply| -> Box<dyn FnOnce(&mut dyn AnyState)> {
                    Box::new(move |state: &mut dyn AnyState| {
                        let state: &mut dyn Any = state;
                        if let Some(state) = state.downcast_mut::<S>() {
                            apply(state);
                        }
                    })
                })
                .boxed_local(),
        )
    }

    fn state_type_name(&self) -> &'static str {
        core::any::type_name::<S>()
    }
}

fn typed<S: State>(widget: &AnyWidget) -> Option<&S::Widget> {
    let typed = widget.downcast_ref::<S::Widget>();
    if typed.is_none() {
        tracing::error!(
            state = core::any::type_name::<S>(),
            widget = widget.type_name(),
            "state received a widget of the wrong type"
        );
    }
    typed
}

impl fmt::Debug for dyn AnyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyState")
            .field("type", &self.state_type_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        let mut lifecycle = StateLifecycle::Created;
        assert!(lifecycle.advance(StateLifecycle::Initialized));
        assert!(lifecycle.advance(StateLifecycle::Ready));
        assert!(lifecycle.advance(StateLifecycle::Defunct));
        assert_eq!(lifecycle.to_string(), "defunct");
    }
}
