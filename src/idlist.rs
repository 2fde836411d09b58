// Run-length codec for server-assigned numeric module ids.
//
// The encoded list is a sequence of segments, each
// `[position][count][id-1][id-2]...`, where `position` is the module-list
// position of the first module in the segment and the following `count`
// ids cover contiguous positions.  A plugin-prefixed module is written as
// a `0` sentinel followed by the plugin id and the module id.
//
// All integers share one width: 16-bit big-endian unless any emitted
// value exceeds 0xFFFF, in which case the whole stream is 32-bit.  The
// byte layout before base64url framing is
// `[versionHashBytes?][widthFlag][segments...]` — the hash token is the
// id map's version and is only present on the main `moduleIds` arg.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::debug;

use crate::error::CodecError;
use crate::module::{HARD_MAX_MODULES, ModuleIdMap, ModuleRequest};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Accumulates id-encodable modules into run-length segments.
///
/// The request builder offers every module of a batch via [`try_add`];
/// modules it declines fall through to the path folder.
///
/// [`try_add`]: IdListBuilder::try_add
#[derive(Debug, Default)]
pub struct IdListBuilder {
    values: Vec<u32>,
    /// Index in `values` of the current segment's `position` entry.
    seg_start: Option<usize>,
}

impl IdListBuilder {
    /// Add the module at `position` if its name (and prefix, if any)
    /// resolves to a non-zero id.  Returns `false` when it does not
    /// participate.
    pub fn try_add(&mut self, module: &ModuleRequest, position: u32, map: &ModuleIdMap) -> bool {
        let Some(name_id) = map.id_of(&module.name) else {
            return false;
        };
        let plugin_id = match &module.prefix {
            Some(prefix) => match map.id_of(prefix) {
                Some(id) => Some(id),
                None => return false,
            },
            None => None,
        };

        match self.seg_start {
            // Contiguous with the current segment: bump its count.
            Some(seg) if self.values[seg] + self.values[seg + 1] == position => {
                self.values[seg + 1] += 1;
            }
            _ => {
                self.seg_start = Some(self.values.len());
                self.values.push(position);
                self.values.push(1);
            }
        }
        if let Some(plugin_id) = plugin_id {
            self.values.push(0);
            self.values.push(plugin_id);
        }
        self.values.push(name_id);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Frame the accumulated segments, optionally prepending the id
    /// map's version-hash token, and base64url-encode without padding.
    pub fn finish(&self, hash: Option<&[u8]>) -> String {
        let wide = self.values.iter().any(|&v| v > 0xFFFF);
        let elem = if wide { 4 } else { 2 };
        let mut bytes =
            Vec::with_capacity(hash.map_or(0, <[u8]>::len) + 1 + self.values.len() * elem);
        if let Some(hash) = hash {
            bytes.extend_from_slice(hash);
        }
        bytes.push(wide as u8);
        for &value in &self.values {
            if wide {
                bytes.extend_from_slice(&value.to_be_bytes());
            } else {
                bytes.extend_from_slice(&(value as u16).to_be_bytes());
            }
        }
        debug!(
            "id list: {} values, {}-bit width, hash {}",
            self.values.len(),
            if wide { 32 } else { 16 },
            if hash.is_some() { "present" } else { "absent" },
        );
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an id list, filling `out` at each absolute position.
///
/// With `expect_hash`, the leading token must equal the local map's
/// version hash.  Occupied positions, unknown ids and ragged streams are
/// all fatal.
pub fn decode(
    encoded: &str,
    map: &ModuleIdMap,
    expect_hash: bool,
    out: &mut Vec<Option<ModuleRequest>>,
) -> Result<(), CodecError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    let mut rest: &[u8] = &bytes;

    if expect_hash {
        let hash = map.hash();
        if rest.len() < hash.len() {
            return Err(CodecError::TruncatedIdList);
        }
        let (token, tail) = rest.split_at(hash.len());
        if token != hash {
            return Err(CodecError::InvalidIdListHash);
        }
        rest = tail;
    }

    let (&flag, rest) = rest.split_first().ok_or(CodecError::TruncatedIdList)?;
    let wide = match flag {
        0 => false,
        1 => true,
        other => return Err(CodecError::InvalidWidthFlag(other)),
    };
    let elem = if wide { 4 } else { 2 };
    if rest.len() % elem != 0 {
        return Err(CodecError::TruncatedIdList);
    }
    let values: Vec<u32> = rest
        .chunks_exact(elem)
        .map(|chunk| {
            if wide {
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
            } else {
                u32::from(u16::from_be_bytes([chunk[0], chunk[1]]))
            }
        })
        .collect();

    let mut i = 0;
    while i < values.len() {
        if i + 2 > values.len() {
            return Err(CodecError::TruncatedIdList);
        }
        let position = values[i];
        let count = values[i + 1];
        i += 2;
        let end = position
            .checked_add(count)
            .filter(|&end| end <= HARD_MAX_MODULES)
            .ok_or(CodecError::PositionOutOfRange(position))?;

        for idx in position..end {
            let id = *values.get(i).ok_or(CodecError::TruncatedIdList)?;
            i += 1;
            let (prefix, name) = if id == 0 {
                // Sentinel: next two values are plugin id and module id.
                let plugin_id = *values.get(i).ok_or(CodecError::TruncatedIdList)?;
                i += 1;
                let plugin = map
                    .name_of(plugin_id)
                    .ok_or(CodecError::UnknownPluginOrdinal(plugin_id))?;
                let module_id = *values.get(i).ok_or(CodecError::TruncatedIdList)?;
                i += 1;
                // Module id 0 after the sentinel is a plugin-only request.
                let name = if module_id == 0 {
                    String::new()
                } else {
                    map.name_of(module_id)
                        .ok_or(CodecError::UnknownId(module_id))?
                        .to_string()
                };
                (Some(plugin.to_string()), name)
            } else {
                let name = map
                    .name_of(id)
                    .ok_or(CodecError::UnknownId(id))?
                    .to_string();
                (None, name)
            };

            let idx = idx as usize;
            if out.len() <= idx {
                out.resize(idx + 1, None);
            }
            if out[idx].is_some() {
                return Err(CodecError::PositionOverwrite(idx));
            }
            out[idx] = Some(ModuleRequest { name, prefix });
        }
    }
    Ok(())
}
