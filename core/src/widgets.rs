//! Primitive widgets every host understands.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use core::marker::PhantomData;

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::key::Key;
use crate::resource::ResourceKind;
use crate::widget::{
    AnyWidget, BuildResult, FragmentWidget, ProxyWidget, ResourceWidget, StatelessWidget,
};

/// A text leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    text: String,
    key: Option<Key>,
}

impl Text {
    /// Creates a text leaf.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            key: None,
        }
    }

    /// Attaches a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The text content.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl ResourceWidget for Text {
    fn resource(&self) -> ResourceKind {
        ResourceKind::text(self.text.clone())
    }
}

crate::impl_widget!(Text, Resource, key = key);

/// A tagged node with attributes and children, backed by one resource.
///
/// ```
/// use canopy_core::{Node, Text};
///
/// let list = Node::new("ul")
///     .attr("class", "todo")
///     .children((1..=3).map(|i| Node::new("li").child(Text::new(i.to_string()))));
/// ```
#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    children: Vec<AnyWidget>,
    key: Option<Key>,
}

impl Node {
    /// Creates an empty node.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            key: None,
        }
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Appends a child.
    #[must_use]
    pub fn child(mut self, child: impl Into<AnyWidget>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends several children.
    #[must_use]
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AnyWidget>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Attaches a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl ResourceWidget for Node {
    fn resource(&self) -> ResourceKind {
        ResourceKind::Element {
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
        }
    }

    fn children(&self) -> Vec<AnyWidget> {
        self.children.clone()
    }
}

crate::impl_widget!(Node, Resource, key = key);

/// An ordered list of children without a resource of its own.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    children: Vec<AnyWidget>,
    key: Option<Key>,
}

impl Fragment {
    /// Creates a fragment.
    pub fn new<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AnyWidget>,
    {
        Self {
            children: children.into_iter().map(Into::into).collect(),
            key: None,
        }
    }

    /// A fragment with no children, for builds that produce nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attaches a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl FragmentWidget for Fragment {
    fn children(&self) -> Vec<AnyWidget> {
        self.children.clone()
    }
}

crate::impl_widget!(Fragment, Fragment, key = key);

type BuildFn = Rc<dyn Fn(&mut BuildContext<'_>) -> BuildResult>;

/// A stateless widget built by a closure.
#[derive(Clone)]
pub struct Builder {
    build: BuildFn,
    key: Option<Key>,
}

impl Builder {
    /// Creates a builder.
    pub fn new(build: impl Fn(&mut BuildContext<'_>) -> BuildResult + 'static) -> Self {
        Self {
            build: Rc::new(build),
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

impl StatelessWidget for Builder {
    fn build(&self, cx: &mut BuildContext<'_>) -> BuildResult {
        (self.build)(cx)
    }
}

crate::impl_debug!(Builder);
crate::impl_widget!(Builder, Stateless, key = key);

/// Intercepts notifications of type `N` dispatched from below.
pub struct NotificationListener<N> {
    on_notification: Rc<dyn Fn(&N) -> bool>,
    child: AnyWidget,
    _notification: PhantomData<fn(&N)>,
}

impl<N: 'static> NotificationListener<N> {
    /// Wraps `child`. The callback returns `true` to stop the notification from bubbling further.
    pub fn new(
        child: impl Into<AnyWidget>,
        on_notification: impl Fn(&N) -> bool + 'static,
    ) -> Self {
        Self {
            on_notification: Rc::new(on_notification),
            child: child.into(),
            _notification: PhantomData,
        }
    }
}

impl<N: 'static> ProxyWidget for NotificationListener<N> {
    fn child(&self) -> AnyWidget {
        self.child.clone()
    }

    fn on_notification(&self, notification: &dyn Any) -> bool {
        notification
            .downcast_ref::<N>()
            .is_some_and(|notification| (self.on_notification)(notification))
    }
}

impl<N: 'static> crate::Widget for NotificationListener<N> {
    fn kind(&self) -> crate::WidgetKind<'_> {
        crate::WidgetKind::Proxy(self)
    }
}

impl<N> fmt::Debug for NotificationListener<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationListener")
            .field("notification", &core::any::type_name::<N>())
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

/// The placeholder shown in place of a child whose build failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorWidget {
    message: String,
}

impl ErrorWidget {
    /// Creates a placeholder showing `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates a placeholder describing `error`.
    #[must_use]
    pub fn from_error(error: &BuildError) -> Self {
        Self::new(error.to_string())
    }

    /// The message shown.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ResourceWidget for ErrorWidget {
    fn resource(&self) -> ResourceKind {
        ResourceKind::Element {
            tag: String::from("error"),
            attributes: BTreeMap::from([(String::from("message"), self.message.clone())]),
        }
    }

    fn children(&self) -> Vec<AnyWidget> {
        alloc::vec![Text::new(self.message.clone()).into()]
    }
}

crate::impl_widget!(ErrorWidget, Resource);
