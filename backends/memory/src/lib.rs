//! An in-memory [`ResourceBackend`] for Canopy.
//!
//! [`MemoryBackend`] keeps every resource in a plain arena, mirrors the child lists the element
//! tree asks for, and counts each operation. It is what tests assert against and what
//! server-side rendering serializes with [`MemoryBackend::to_markup`].
//!
//! ```
//! use canopy_core::{ElementTree, Node, Text};
//! use canopy_memory::MemoryBackend;
//!
//! let mut tree = ElementTree::new(MemoryBackend::new());
//! tree.mount_root(Node::new("p").attr("class", "greeting").child(Text::new("hello")))?;
//!
//! let backend = tree.backend_as::<MemoryBackend>().unwrap();
//! assert_eq!(backend.to_markup(), r#"<p class="greeting">hello</p>"#);
//! assert_eq!(backend.counts().created, 2);
//! # Ok::<(), canopy_core::TreeError>(())
//! ```

mod markup;
mod tree;

pub use tree::{MemoryBackend, MemoryNode, OpCounts};
