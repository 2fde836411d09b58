// Module descriptors and the server-assigned numeric id map.

use std::collections::HashMap;

use crate::error::CodecError;

/// Characters that may not appear in a module name.  Must match the set
/// rejected by the server-side request parser.
pub const INVALID_NAME_CHARS: &[char] = &['{', '}', ',', ':', '|', '<', '>', '*'];

/// Hard limit on decoded module-list positions.  Guards decoder memory
/// against hostile position values.
pub const HARD_MAX_MODULES: u32 = 1 << 20;

/// A requested unit of code: a slash-delimited path name and an optional
/// loader-plugin prefix.  List order is load order; a module's 0-based
/// index in the batch is its `position`, preserved through encode/decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRequest {
    pub name: String,
    pub prefix: Option<String>,
}

impl ModuleRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: Some(prefix.into()),
        }
    }

    /// The `prefix!name` module id string, as an AMD loader writes it.
    pub fn to_mid(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}!{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Parse a `prefix!name` module id string.  Everything before the
    /// first `!` is the plugin prefix.
    pub fn from_mid(mid: &str) -> Self {
        match mid.split_once('!') {
            Some((prefix, name)) => Self::with_prefix(prefix, name),
            None => Self::new(mid),
        }
    }

    /// Reject names (and prefixes) containing reserved delimiter
    /// characters.
    pub fn validate(&self) -> Result<(), CodecError> {
        let bad = |s: &str| s.contains(INVALID_NAME_CHARS);
        if bad(&self.name) || self.prefix.as_deref().is_some_and(bad) {
            return Err(CodecError::InvalidModuleName(self.to_mid()));
        }
        Ok(())
    }
}

impl From<&str> for ModuleRequest {
    fn from(mid: &str) -> Self {
        Self::from_mid(mid)
    }
}

/// Server-assigned mapping from module or plugin name to a stable non-zero
/// numeric id, versioned by a fixed-length hash token.
///
/// The reverse mapping is maintained eagerly so decode never scans.
#[derive(Debug, Clone, Default)]
pub struct ModuleIdMap {
    ids: HashMap<String, u32>,
    names: HashMap<u32, String>,
    hash: Vec<u8>,
}

impl ModuleIdMap {
    /// Create an empty map with the given version-hash token.
    pub fn new(hash: Vec<u8>) -> Self {
        Self {
            ids: HashMap::new(),
            names: HashMap::new(),
            hash,
        }
    }

    /// Register a name/id pair.  Re-registering the same pair is a no-op;
    /// re-assigning a name to a different id is fatal.  An id of zero is
    /// reserved for the plugin sentinel and is ignored.
    pub fn insert(&mut self, name: impl Into<String>, id: u32) -> Result<(), CodecError> {
        if id == 0 {
            return Ok(());
        }
        let name = name.into();
        match self.ids.get(&name) {
            Some(&existing) if existing != id => Err(CodecError::DuplicateName(name)),
            Some(_) => Ok(()),
            None => {
                self.names.insert(id, name.clone());
                self.ids.insert(name, id);
                Ok(())
            }
        }
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// The version-hash token identifying this map.
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
