/// Implements a basic `Debug` trait for types using their type name.
///
/// Useful for widgets holding closures, whose fields cannot be printed.
#[macro_export]
macro_rules! impl_debug {
    ($ty:ty) => {
        impl core::fmt::Debug for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(core::any::type_name::<Self>())
            }
        }
    };
}

/// Implements [`Widget`](crate::Widget) for a type that already implements the trait of its kind.
///
/// # Usage
///
/// ```ignore
/// // No key
/// impl_widget!(Greeting, Stateless);
///
/// // Key read from an `Option<Key>` field
/// impl_widget!(Row, Resource, key = key);
/// ```
#[macro_export]
macro_rules! impl_widget {
    ($ty:ty, $kind:ident) => {
        impl $crate::Widget for $ty {
            fn kind(&self) -> $crate::WidgetKind<'_> {
                $crate::WidgetKind::$kind(self)
            }
        }
    };

    ($ty:ty, $kind:ident, key = $field:ident) => {
        impl $crate::Widget for $ty {
            fn key(&self) -> Option<&$crate::Key> {
                self.$field.as_ref()
            }

            fn kind(&self) -> $crate::WidgetKind<'_> {
                $crate::WidgetKind::$kind(self)
            }
        }
    };
}
