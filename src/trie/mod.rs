// Folded-trie representation of a requested module list.
//
// Many module names share path prefixes, so the ordered name list is
// folded into a path-hierarchical trie before serialization.
//
// # Modules
//
// - `fold` — module list ↔ trie (PathFolder)
// - `text` — trie ↔ compact delimiter-based wire grammar

pub mod fold;
pub mod text;

pub use fold::{Dir, FoldedTrie, Leaf, Node, fold, unfold};
