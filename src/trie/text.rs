// Wire grammar for folded tries.
//
// `(key!value*key2!value2...)` — nested dirs are parenthesized
// sub-expressions, `*` separates siblings (stands for comma, which would
// get percent-encoded), keys appear in lexicographic order so identical
// inputs always serialize identically.
//
// `!`, `(` and `)` are grammar delimiters, so keys escape them as `|`,
// `<` and `>`; the empty key renders as `""`.  A leaf is a bare integer,
// a plugin-prefixed leaf is `position-pluginOrdinal`.  A directory's
// self leaf travels under the reserved key `.`, and the plugin-prefix
// table under `/pre/` (the slashes keep it out of the path namespace).

use std::collections::BTreeMap;

use crate::error::CodecError;
use crate::trie::fold::{Dir, FoldedTrie, Leaf, Node};

/// Reserved root key for the prefix→ordinal table.  Must match the
/// server-side property name.
pub const PLUGIN_PREFIXES_KEY: &str = "/pre/";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize a folded trie.  The result contains no URL-hostile
/// characters other than what percent-encoding of a query arg handles.
pub fn encode(trie: &FoldedTrie) -> String {
    let mut items = dir_items(&trie.root);
    if !trie.prefixes.is_empty() {
        let pre: BTreeMap<String, String> = trie
            .prefixes
            .iter()
            .enumerate()
            .map(|(ordinal, name)| (name.clone(), ordinal.to_string()))
            .collect();
        items.insert(PLUGIN_PREFIXES_KEY.to_string(), join_items(&pre));
    }
    join_items(&items)
}

/// Render a directory's entries keyed by their unescaped names, so the
/// sibling sort order matches the raw names (escaping happens at
/// emission).
fn dir_items(dir: &Dir) -> BTreeMap<String, String> {
    let mut items: BTreeMap<String, String> = dir
        .children
        .iter()
        .map(|(key, node)| (key.clone(), render_node(node)))
        .collect();
    if let Some(leaf) = &dir.self_leaf {
        items.insert(".".to_string(), render_leaf(leaf));
    }
    items
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Leaf(leaf) => render_leaf(leaf),
        Node::Dir(dir) => join_items(&dir_items(dir)),
    }
}

fn render_leaf(leaf: &Leaf) -> String {
    match leaf.plugin {
        Some(ordinal) => format!("{}-{}", leaf.position, ordinal),
        None => leaf.position.to_string(),
    }
}

fn join_items(items: &BTreeMap<String, String>) -> String {
    let mut out = String::from("(");
    for (i, (key, value)) in items.iter().enumerate() {
        if i > 0 {
            out.push('*');
        }
        out.push_str(&escape_key(key));
        out.push('!');
        out.push_str(value);
    }
    out.push(')');
    out
}

fn escape_key(key: &str) -> String {
    if key.is_empty() {
        return "\"\"".to_string();
    }
    key.chars()
        .map(|c| match c {
            '!' => '|',
            '(' => '<',
            ')' => '>',
            other => other,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse the wire grammar back into a folded trie, extracting and
/// reverse-mapping the `/pre/` prefix table first.
pub fn decode(text: &str) -> Result<FoldedTrie, CodecError> {
    let mut parser = Parser { text, pos: 0 };
    let mut root = parser.parse_dir()?;
    if parser.pos != text.len() {
        return Err(parser.err("trailing characters after trie"));
    }
    let prefixes = extract_prefixes(&mut root)?;
    Ok(FoldedTrie { root, prefixes })
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), CodecError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(match byte {
                b'(' => "expected `(`",
                b'!' => "expected `!`",
                _ => "unexpected character",
            }))
        }
    }

    fn err(&self, msg: &'static str) -> CodecError {
        CodecError::BadTrieSyntax { pos: self.pos, msg }
    }

    fn parse_dir(&mut self) -> Result<Dir, CodecError> {
        self.expect(b'(')?;
        let mut dir = Dir::default();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(dir);
        }
        loop {
            let key = self.parse_key()?;
            self.expect(b'!')?;
            let node = if self.peek() == Some(b'(') {
                Node::Dir(self.parse_dir()?)
            } else {
                Node::Leaf(self.parse_leaf()?)
            };
            if key == "." {
                let Node::Leaf(leaf) = node else {
                    return Err(self.err("`.` entry must be a leaf"));
                };
                if dir.self_leaf.replace(leaf).is_some() {
                    return Err(self.err("duplicate `.` entry"));
                }
            } else if dir.children.insert(key, node).is_some() {
                return Err(self.err("duplicate key in dir"));
            }
            match self.peek() {
                Some(b'*') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(dir);
                }
                _ => return Err(self.err("expected `*` or `)`")),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'!' | b'(' | b')' | b'*') {
                break;
            }
            self.pos += 1;
        }
        let raw = &self.text[start..self.pos];
        if raw.is_empty() {
            return Err(self.err("empty key"));
        }
        if raw == "\"\"" {
            return Ok(String::new());
        }
        Ok(raw
            .chars()
            .map(|c| match c {
                '|' => '!',
                '<' => '(',
                '>' => ')',
                other => other,
            })
            .collect())
    }

    fn parse_leaf(&mut self) -> Result<Leaf, CodecError> {
        let position = self.parse_u32()?;
        let plugin = if self.peek() == Some(b'-') {
            self.pos += 1;
            Some(self.parse_u32()?)
        } else {
            None
        };
        Ok(Leaf { position, plugin })
    }

    fn parse_u32(&mut self) -> Result<u32, CodecError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err("expected a number"));
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| self.err("number out of range"))
    }
}

/// Pull the `/pre/` table out of a freshly parsed root dir and invert it
/// into ordinal order.
fn extract_prefixes(root: &mut Dir) -> Result<Vec<String>, CodecError> {
    let bad = || CodecError::BadTrieSyntax {
        pos: 0,
        msg: "invalid plugin prefix table",
    };
    let Some(node) = root.children.remove(PLUGIN_PREFIXES_KEY) else {
        return Ok(Vec::new());
    };
    let Node::Dir(table) = node else {
        return Err(bad());
    };
    if table.self_leaf.is_some() {
        return Err(bad());
    }
    let mut prefixes: Vec<Option<String>> = vec![None; table.children.len()];
    for (name, entry) in table.children {
        let Node::Leaf(Leaf {
            position,
            plugin: None,
        }) = entry
        else {
            return Err(bad());
        };
        let slot = prefixes.get_mut(position as usize).ok_or_else(bad)?;
        if slot.replace(name).is_some() {
            return Err(bad());
        }
    }
    // All ordinals 0..len must be assigned.
    prefixes.into_iter().collect::<Option<Vec<_>>>().ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleRequest;
    use crate::trie::fold::{fold, unfold};

    fn modules(names: &[&str]) -> Vec<ModuleRequest> {
        names.iter().map(|n| ModuleRequest::from_mid(n)).collect()
    }

    fn roundtrip(names: &[&str]) {
        let mods = modules(names);
        let trie = fold(&mods).unwrap();
        let text = encode(&trie);
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, trie, "trie mismatch for {text}");
        let mut out = Vec::new();
        unfold(&decoded, &mut out).unwrap();
        assert_eq!(out.into_iter().map(Option::unwrap).collect::<Vec<_>>(), mods);
    }

    #[test]
    fn encodes_siblings_sorted() {
        let trie = fold(&modules(&["foo/bar", "foo/baz/yyy", "foo/baz/xxx", "dir"])).unwrap();
        assert_eq!(encode(&trie), "(dir!3*foo!(bar!0*baz!(xxx!2*yyy!1)))");
    }

    #[test]
    fn encodes_self_leaf_under_dot() {
        let trie = fold(&modules(&["foo/bar", "foo/baz/bar", "foo/baz"])).unwrap();
        assert_eq!(encode(&trie), "(foo!(bar!0*baz!(.!2*bar!1)))");
    }

    #[test]
    fn encodes_prefix_table() {
        let trie = fold(&modules(&["text!a/b", "css!a/c"])).unwrap();
        assert_eq!(encode(&trie), "(/pre/!(css!1*text!0)*a!(b!0-0*c!1-1))");
    }

    #[test]
    fn escapes_delimiter_characters() {
        let trie = fold(&modules(&["a!b(c)"])).unwrap();
        let text = encode(&trie);
        assert_eq!(text, "(a|b<c>!0)");
        let mut out = Vec::new();
        unfold(&decode(&text).unwrap(), &mut out).unwrap();
        assert_eq!(out[0].as_ref().unwrap().name, "a!b(c)");
    }

    #[test]
    fn empty_name_renders_as_quotes() {
        let trie = fold(&modules(&[""])).unwrap();
        assert_eq!(encode(&trie), "(\"\"!0)");
        roundtrip(&[""]);
    }

    #[test]
    fn roundtrips() {
        roundtrip(&["foo/bar", "foo/baz/yyy", "foo/baz/xxx", "dir"]);
        roundtrip(&["foo/bar", "foo/baz/bar", "foo/baz"]);
        roundtrip(&["text!a/b", "css!a/c", "text!d", "plain"]);
        roundtrip(&["a"]);
    }

    #[test]
    fn decodes_empty_dir() {
        assert!(decode("()").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_text() {
        for text in ["", "(", "(a!)", "(a!0", "(a!0]", "(!0)", "(a!0**b!1)", "(a!x)", "(a!0)x"] {
            assert!(
                matches!(decode(text), Err(CodecError::BadTrieSyntax { .. })),
                "expected syntax error for {text:?}"
            );
        }
    }

    #[test]
    fn rejects_bad_prefix_table() {
        // Ordinal 1 assigned twice, ordinal 0 missing.
        assert!(decode("(/pre/!(css!1*text!1)*a!(b!0-0))").is_err());
        // Table must be a dir.
        assert!(decode("(/pre/!3*a!0)").is_err());
    }

    #[test]
    fn rejects_number_overflow() {
        assert!(matches!(
            decode("(a!99999999999)"),
            Err(CodecError::BadTrieSyntax { .. })
        ));
    }
}
