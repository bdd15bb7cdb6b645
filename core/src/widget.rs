//! Immutable description nodes.
//!
//! A [`Widget`] is a cheap, immutable snapshot of desired UI. Application code produces a fresh
//! widget tree on every rebuild; the [`ElementTree`](crate::ElementTree) diffs it against the
//! persistent element tree and throws the descriptions away afterwards.
//!
//! Every widget belongs to one of a closed set of kinds, reported through [`Widget::kind`]:
//!
//! | Kind | Trait | Element behaviour |
//! |------|-------|-------------------|
//! | Stateless | [`StatelessWidget`] | builds a single child from the description alone |
//! | Stateful | [`StatefulWidget`] | owns a long-lived [`State`](crate::State) that builds the child |
//! | Inherited | [`InheritedWidget`] | provides a value to descendants and notifies subscribers |
//! | Proxy | [`ProxyWidget`] | wraps a child and may intercept bubbling notifications |
//! | Observer | [`ObserverWidget`] | wraps a child and observes rebuilds of every descendant |
//! | Fragment | [`FragmentWidget`] | a list of children without a backing resource |
//! | Resource | [`ResourceWidget`] | owns a backing resource and a list of children |

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt::{self, Debug};

use crate::context::BuildContext;
use crate::element::ElementId;
use crate::error::BuildError;
use crate::key::Key;
use crate::resource::ResourceKind;
use crate::state::AnyState;

/// Result of a build callback.
pub type BuildResult = Result<AnyWidget, BuildError>;

/// An immutable description node.
pub trait Widget: Any + Debug {
    /// The identity token of this widget, if any.
    fn key(&self) -> Option<&Key> {
        None
    }

    /// Reports which kind of element this widget inflates to.
    fn kind(&self) -> WidgetKind<'_>;

    /// Decides whether an element updated from `old` to `self` has to rebuild.
    ///
    /// Defaults to always rebuilding.
    fn should_rebuild(&self, old: &dyn Widget) -> bool {
        let _ = old;
        true
    }

    /// The Rust type name of this widget, used in diagnostics.
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl dyn Widget {
    /// Returns the widget as `T` if it has that concrete type.
    #[must_use]
    pub fn downcast_ref<T: Widget>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref()
    }
}

/// The closed set of element kinds a widget can inflate to.
#[derive(Clone, Copy)]
pub enum WidgetKind<'a> {
    /// See [`StatelessWidget`].
    Stateless(&'a dyn StatelessWidget),
    /// See [`StatefulWidget`].
    Stateful(&'a dyn StatefulWidget),
    /// See [`InheritedWidget`].
    Inherited(&'a dyn InheritedWidget),
    /// See [`ProxyWidget`].
    Proxy(&'a dyn ProxyWidget),
    /// See [`ObserverWidget`].
    Observer(&'a dyn ObserverWidget),
    /// See [`FragmentWidget`].
    Fragment(&'a dyn FragmentWidget),
    /// See [`ResourceWidget`].
    Resource(&'a dyn ResourceWidget),
}

impl Debug for WidgetKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stateless(_) => "Stateless",
            Self::Stateful(_) => "Stateful",
            Self::Inherited(_) => "Inherited",
            Self::Proxy(_) => "Proxy",
            Self::Observer(_) => "Observer",
            Self::Fragment(_) => "Fragment",
            Self::Resource(_) => "Resource",
        })
    }
}

/// A widget whose child depends only on its own configuration and on inherited values.
pub trait StatelessWidget {
    /// Builds the child description.
    ///
    /// # Errors
    ///
    /// A returned error replaces the child with the tree's error widget.
    fn build(&self, cx: &mut BuildContext<'_>) -> BuildResult;
}

/// A widget that owns a long-lived [`State`](crate::State).
pub trait StatefulWidget {
    /// Creates the state container. Called once per element, when it is created.
    fn create_state(&self) -> Box<dyn AnyState>;
}

/// A widget that provides a value to its descendants.
///
/// Descendants subscribe with [`BuildContext::depend_on`]; when the provider is updated and
/// [`update_should_notify`](Self::update_should_notify) returns `true`, every subscriber is
/// marked dirty.
pub trait InheritedWidget {
    /// The wrapped child.
    fn child(&self) -> AnyWidget;

    /// Whether subscribers must rebuild after the provider changed from `old` to `self`.
    fn update_should_notify(&self, old: &AnyWidget) -> bool;

    /// Finer-grained check for subscribers that registered an aspect.
    fn update_should_notify_dependent(&self, old: &AnyWidget, aspect: &dyn Any) -> bool {
        let _ = (old, aspect);
        true
    }
}

/// A widget that wraps a single child and may intercept bubbling notifications.
pub trait ProxyWidget {
    /// The wrapped child.
    fn child(&self) -> AnyWidget;

    /// Called for notifications dispatched from descendants. Returning `true` stops bubbling.
    fn on_notification(&self, notification: &dyn Any) -> bool {
        let _ = notification;
        false
    }
}

/// A widget that observes the rebuilds and unmounts of all its descendants.
pub trait ObserverWidget {
    /// The wrapped child.
    fn child(&self) -> AnyWidget;

    /// A descendant is about to rebuild.
    fn will_rebuild(&self, element: ElementId) {
        let _ = element;
    }

    /// A descendant finished rebuilding.
    fn did_rebuild(&self, element: ElementId) {
        let _ = element;
    }

    /// A descendant was unmounted for good.
    fn did_unmount(&self, element: ElementId) {
        let _ = element;
    }
}

/// A widget made of an ordered list of children and nothing else.
pub trait FragmentWidget {
    /// The ordered children.
    fn children(&self) -> Vec<AnyWidget>;
}

/// A widget that owns a backing resource (a render or DOM node).
pub trait ResourceWidget {
    /// Describes the resource this widget wants.
    fn resource(&self) -> ResourceKind;

    /// The ordered children, attached inside this widget's resource.
    fn children(&self) -> Vec<AnyWidget> {
        Vec::new()
    }
}

/// A shared, type-erased widget.
#[derive(Clone)]
pub struct AnyWidget(Rc<dyn Widget>);

impl AnyWidget {
    /// Wraps a widget.
    pub fn new<W: Widget>(widget: W) -> Self {
        Self(Rc::new(widget))
    }

    /// The identity token of the wrapped widget.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.0.key()
    }

    /// The element kind of the wrapped widget.
    #[must_use]
    pub fn kind(&self) -> WidgetKind<'_> {
        self.0.kind()
    }

    /// The concrete type of the wrapped widget.
    #[must_use]
    pub fn widget_type(&self) -> TypeId {
        let any: &dyn Any = &*self.0;
        any.type_id()
    }

    /// The concrete type name of the wrapped widget.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Borrows the wrapped widget as a trait object.
    #[must_use]
    pub fn as_widget(&self) -> &dyn Widget {
        &*self.0
    }

    /// Returns the wrapped widget as `T` if it has that concrete type.
    #[must_use]
    pub fn downcast_ref<T: Widget>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Returns a shared handle to the wrapped widget if it has type `T`.
    #[must_use]
    pub fn downcast<T: Widget>(&self) -> Option<Rc<T>> {
        let any: Rc<dyn Any> = self.0.clone();
        any.downcast().ok()
    }

    /// Whether both handles point at the very same description node.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Whether an element configured with `old` can be updated in place to `new`.
    ///
    /// Holds iff both widgets have the same concrete type and equal keys (two absent keys are
    /// equal).
    #[must_use]
    pub fn can_update(old: &Self, new: &Self) -> bool {
        old.widget_type() == new.widget_type() && old.key() == new.key()
    }
}

impl Debug for AnyWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl<W: Widget> From<W> for AnyWidget {
    fn from(value: W) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{Fragment, Text};

    #[test]
    fn can_update_requires_same_type_and_key() {
        let a = AnyWidget::new(Text::new("a"));
        let b = AnyWidget::new(Text::new("b"));
        assert!(AnyWidget::can_update(&a, &b));

        let keyed = AnyWidget::new(Text::new("a").with_key(Key::value(1)));
        assert!(!AnyWidget::can_update(&a, &keyed));
        assert!(AnyWidget::can_update(
            &keyed,
            &AnyWidget::new(Text::new("z").with_key(Key::value(1)))
        ));

        let fragment = AnyWidget::new(Fragment::empty());
        assert!(!AnyWidget::can_update(&a, &fragment));
    }

    #[test]
    fn downcast_returns_concrete_widget() {
        let widget = AnyWidget::new(Text::new("hello"));
        assert_eq!(widget.downcast_ref::<Text>().map(Text::text), Some("hello"));
        assert!(widget.downcast::<Fragment>().is_none());
        assert!(AnyWidget::ptr_eq(&widget, &widget.clone()));
    }
}
