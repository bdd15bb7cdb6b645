#![doc = include_str!("../README.md")]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::future_not_send)]

extern crate alloc;

pub mod logging;
pub mod runtime;
pub mod watch;

#[doc(inline)]
pub use runtime::{Runtime, render_to_string};
#[doc(inline)]
pub use watch::Watch;

#[doc(inline)]
pub use canopy_core::*;
pub use canopy_memory as memory;

pub mod prelude {
    //! The types most applications need, for glob import.
    //!
    //! ```rust
    //! use canopy::prelude::*;
    //!
    //! let page = Node::new("main").child(Text::new("hi"));
    //! assert_eq!(render_to_string(page).unwrap(), "<main>hi</main>");
    //! ```
    pub use super::{Runtime, Watch, render_to_string};
    pub use canopy_core::{
        AnyWidget, BuildContext, BuildError, BuildResult, Builder, Fragment, GlobalKey, Key, Node,
        State, StatefulWidget, StatelessWidget, Text, TreeConfig, TreeError, impl_widget,
    };
    pub use canopy_memory::MemoryBackend;
}
