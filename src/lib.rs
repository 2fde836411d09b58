//! Comboreq: compact, URL-safe encoding of AMD module-aggregation
//! requests.
//!
//! The crate provides:
//! - A path-folding trie codec for module names (`trie`)
//! - A run-length codec for server-assigned numeric module ids (`idlist`)
//! - A trit-packed codec for named feature flags (`features`)
//! - Request assembly with URL-length budgeting (`request`) and the
//!   mirror diagnostics decoder (`decode`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use comboreq::{Batch, ModuleIdMap, RequestBuilder, decode_request};
//!
//! let mut id_map = ModuleIdMap::new(vec![0xC0, 0xDE]);
//! id_map.insert("app/main", 1)?;
//!
//! let mut batch = Batch::new();
//! batch.add_module("app/main").add_module("app/widgets/panel");
//! batch.set_feature("touch", true);
//!
//! let mut builder = RequestBuilder::new("/combo").id_map(id_map.clone());
//! let urls = builder.build(batch)?;
//!
//! let decoded = decode_request(&urls[0], &id_map, &[])?;
//! assert_eq!(decoded.modules[1].name, "app/widgets/panel");
//! # Ok::<(), comboreq::CodecError>(())
//! ```

pub mod decode;
pub mod error;
pub mod features;
pub mod idlist;
pub mod module;
pub mod request;
pub mod trie;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export key types for convenience.
pub use decode::{DecodedRequest, decode_request};
pub use error::CodecError;
pub use features::{CookieStore, FeatureSet};
pub use module::{ModuleIdMap, ModuleRequest};
pub use request::{Batch, RequestBuilder, UrlProcessor};
pub use trie::FoldedTrie;
