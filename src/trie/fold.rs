// Path folding: an ordered module list becomes a nested,
// position-indexed trie.
//
// A leaf that collides with a longer path is carried as the directory's
// `self_leaf` rather than under a sentinel key; the `.` key exists only
// in the wire grammar (see `text`).

use std::collections::BTreeMap;

use crate::error::CodecError;
use crate::module::{HARD_MAX_MODULES, ModuleRequest};

/// Terminal trie entry: the module's position in the batch and, for
/// plugin-prefixed modules, the ordinal of the prefix in the trie's
/// prefix table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub position: u32,
    pub plugin: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Leaf),
    Dir(Dir),
}

/// Interior trie node.  `self_leaf` holds a module whose full name ends
/// at this directory (i.e. is a strict prefix of another module's name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dir {
    pub children: BTreeMap<String, Node>,
    pub self_leaf: Option<Leaf>,
}

impl Dir {
    fn with_self_leaf(leaf: Leaf) -> Self {
        Self {
            children: BTreeMap::new(),
            self_leaf: Some(leaf),
        }
    }
}

/// A folded module list: the trie root plus the plugin-prefix table
/// (ordinal order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldedTrie {
    pub root: Dir,
    pub prefixes: Vec<String>,
}

impl FoldedTrie {
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.self_leaf.is_none()
    }

    /// Insert one module at the given batch position.
    ///
    /// Walks/creates directory nodes for all but the last path segment.
    /// A leaf found along the way is pushed down into a new directory's
    /// `self_leaf`.  Inserting the same full name twice is fatal.
    pub fn insert(&mut self, module: &ModuleRequest, position: u32) -> Result<(), CodecError> {
        module.validate()?;

        let plugin = match &module.prefix {
            Some(prefix) => Some(self.prefix_ordinal(prefix)),
            None => None,
        };
        let leaf = Leaf { position, plugin };

        let segments: Vec<&str> = module.name.split('/').collect();
        let Some((&last, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut dir = &mut self.root;
        for &seg in parents {
            // A `.` path component stays at the current directory.
            if seg == "." {
                continue;
            }
            let node = dir
                .children
                .entry(seg.to_string())
                .or_insert_with(|| Node::Dir(Dir::default()));
            if let Node::Leaf(existing) = *node {
                *node = Node::Dir(Dir::with_self_leaf(existing));
            }
            dir = match node {
                Node::Dir(d) => d,
                Node::Leaf(_) => unreachable!("leaf was just converted to a dir"),
            };
        }

        // A terminal `.` segment names the current directory itself.
        let slot = if last == "." {
            &mut dir.self_leaf
        } else {
            match dir.children.get_mut(last) {
                None => {
                    dir.children.insert(last.to_string(), Node::Leaf(leaf));
                    return Ok(());
                }
                Some(Node::Leaf(_)) => {
                    return Err(CodecError::DuplicateName(module.to_mid()));
                }
                Some(Node::Dir(d)) => &mut d.self_leaf,
            }
        };
        if slot.is_some() {
            return Err(CodecError::DuplicateName(module.to_mid()));
        }
        *slot = Some(leaf);
        Ok(())
    }

    /// Ordinal for a plugin prefix, assigning the next sequential one on
    /// first sight.
    fn prefix_ordinal(&mut self, prefix: &str) -> u32 {
        match self.prefixes.iter().position(|p| p == prefix) {
            Some(i) => i as u32,
            None => {
                self.prefixes.push(prefix.to_string());
                (self.prefixes.len() - 1) as u32
            }
        }
    }
}

/// Fold an ordered module list; position `i` is the module's index.
pub fn fold(modules: &[ModuleRequest]) -> Result<FoldedTrie, CodecError> {
    let mut trie = FoldedTrie::default();
    for (i, module) in modules.iter().enumerate() {
        trie.insert(module, i as u32)?;
    }
    Ok(trie)
}

/// Walk a trie back to positioned module requests, filling `out` at each
/// leaf's absolute position.  Used by the diagnostics decoder; holes are
/// the caller's problem (a batch may also carry id-encoded modules).
pub fn unfold(
    trie: &FoldedTrie,
    out: &mut Vec<Option<ModuleRequest>>,
) -> Result<(), CodecError> {
    for (seg, node) in &trie.root.children {
        // Keys starting with `/` are processing directives, not paths.
        if seg.starts_with('/') {
            continue;
        }
        walk(node, seg, &trie.prefixes, out)?;
    }
    Ok(())
}

fn walk(
    node: &Node,
    path: &str,
    prefixes: &[String],
    out: &mut Vec<Option<ModuleRequest>>,
) -> Result<(), CodecError> {
    match node {
        Node::Leaf(leaf) => assign(out, leaf, path, prefixes),
        Node::Dir(dir) => {
            if let Some(leaf) = &dir.self_leaf {
                assign(out, leaf, path, prefixes)?;
            }
            for (seg, child) in &dir.children {
                walk(child, &format!("{path}/{seg}"), prefixes, out)?;
            }
            Ok(())
        }
    }
}

fn assign(
    out: &mut Vec<Option<ModuleRequest>>,
    leaf: &Leaf,
    path: &str,
    prefixes: &[String],
) -> Result<(), CodecError> {
    if leaf.position >= HARD_MAX_MODULES {
        return Err(CodecError::PositionOutOfRange(leaf.position));
    }
    let prefix = match leaf.plugin {
        Some(ord) => Some(
            prefixes
                .get(ord as usize)
                .ok_or(CodecError::UnknownPluginOrdinal(ord))?
                .clone(),
        ),
        None => None,
    };
    let idx = leaf.position as usize;
    if out.len() <= idx {
        out.resize(idx + 1, None);
    }
    if out[idx].is_some() {
        return Err(CodecError::PositionOverwrite(idx));
    }
    out[idx] = Some(ModuleRequest {
        name: path.to_string(),
        prefix,
    });
    Ok(())
}
