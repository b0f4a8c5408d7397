/// Reader for `NSKeyedArchiver` archives stored as binary property lists.
///
/// ```text
/// "bplist00" <objects...> <offset table> <32-byte trailer>
///
/// trailer  [6] offset int size  [7] object ref size
///          [8..16] object count  [16..24] top object  [24..32] table offset
/// ```
///
/// The archive's top dictionary maps `$top` to `{ root: UID }` and
/// `$objects` to the flat object array the UIDs index into. The root is
/// either a string or an `NSString`/`NSAttributedString` dictionary that
/// points at one through `NS.string` or `NSString`.

use crate::Strategy;

const MAGIC: &[u8] = b"bplist00";
const TRAILER_LEN: usize = 32;
const ROOT_KEY: &str = "root";
const NULL_OBJECT: &str = "$null";
const STRING_KEYS: [&str; 2] = ["NS.string", "NSString"];
const MAX_DEPTH: usize = 8;

pub struct KeyedArchive;

impl Strategy for KeyedArchive {
    fn name(&self) -> &'static str {
        "keyed-archive"
    }

    fn decode(&self, blob: &[u8]) -> Option<String> {
        let plist = Plist::parse(blob)?;

        let Value::Dict(top) = plist.object(plist.top)? else {
            return None;
        };
        let Value::Dict(top_keys) = plist.dict_get(&top, "$top")? else {
            return None;
        };
        let Value::Uid(root) = plist.dict_get(&top_keys, ROOT_KEY)? else {
            return None;
        };
        let Value::Array(objects) = plist.dict_get(&top, "$objects")? else {
            return None;
        };

        plist.archived_string(&objects, root, 0)
    }
}

/// Decoded object. Only the kinds an archive needs are kept apart.
enum Value {
    Str(String),
    Uid(u64),
    Array(Vec<u64>),
    Dict(Vec<(u64, u64)>),
    Other,
}

struct Plist<'a> {
    data: &'a [u8],
    offset_size: usize,
    ref_size: usize,
    object_count: u64,
    top: u64,
    table_offset: usize,
}

impl<'a> Plist<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if !data.starts_with(MAGIC) || data.len() < MAGIC.len() + TRAILER_LEN {
            return None;
        }
        let trailer = &data[data.len() - TRAILER_LEN..];

        let offset_size = usize::from(trailer[6]);
        let ref_size = usize::from(trailer[7]);
        let object_count = be_uint(&trailer[8..16])?;
        let top = be_uint(&trailer[16..24])?;
        let table_offset = usize::try_from(be_uint(&trailer[24..32])?).ok()?;

        if !(1..=8).contains(&offset_size) || !(1..=8).contains(&ref_size) || top >= object_count {
            return None;
        }

        let table_len = usize::try_from(object_count).ok()?.checked_mul(offset_size)?;
        if table_offset.checked_add(table_len)? > data.len() - TRAILER_LEN {
            return None;
        }

        Some(Self {
            data,
            offset_size,
            ref_size,
            object_count,
            top,
            table_offset,
        })
    }

    fn offset(&self, index: u64) -> Option<usize> {
        if index >= self.object_count {
            return None;
        }
        let start = self.table_offset + usize::try_from(index).ok()? * self.offset_size;
        let offset = be_uint(self.data.get(start..start + self.offset_size)?)?;
        usize::try_from(offset).ok()
    }

    fn object(&self, index: u64) -> Option<Value> {
        let pos = self.offset(index)?;
        let marker = *self.data.get(pos)?;
        let info = marker & 0x0f;
        let pos = pos + 1;

        match marker >> 4 {
            // ASCII string
            0x5 => {
                let (len, start) = self.length(info, pos)?;
                let bytes = self.data.get(start..start.checked_add(len)?)?;
                String::from_utf8(bytes.to_vec()).ok().map(Value::Str)
            }
            // UTF-16BE string, length in code units
            0x6 => {
                let (len, start) = self.length(info, pos)?;
                let bytes = self.data.get(start..start.checked_add(len.checked_mul(2)?)?)?;
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).ok().map(Value::Str)
            }
            0x8 => {
                let len = usize::from(info) + 1;
                let uid = be_uint(self.data.get(pos..pos + len)?)?;
                Some(Value::Uid(uid))
            }
            0xA => {
                let (count, start) = self.length(info, pos)?;
                Some(Value::Array(self.refs(start, count)?))
            }
            0xD => {
                let (count, start) = self.length(info, pos)?;
                let keys = self.refs(start, count)?;
                let values = self.refs(start + count * self.ref_size, count)?;
                Some(Value::Dict(keys.into_iter().zip(values).collect()))
            }
            _ => Some(Value::Other),
        }
    }

    /// Collection and string lengths: inline in the marker's low nibble,
    /// or 0xF followed by an integer object.
    fn length(&self, info: u8, pos: usize) -> Option<(usize, usize)> {
        if info != 0x0f {
            return Some((usize::from(info), pos));
        }
        let marker = *self.data.get(pos)?;
        if marker >> 4 != 0x1 {
            return None;
        }
        let width = 1usize << (marker & 0x0f);
        let len = be_uint(self.data.get(pos + 1..pos + 1 + width)?)?;
        Some((usize::try_from(len).ok()?, pos + 1 + width))
    }

    fn refs(&self, start: usize, count: usize) -> Option<Vec<u64>> {
        let end = start.checked_add(count.checked_mul(self.ref_size)?)?;
        let bytes = self.data.get(start..end)?;
        bytes.chunks_exact(self.ref_size).map(be_uint).collect()
    }

    fn dict_get(&self, entries: &[(u64, u64)], key: &str) -> Option<Value> {
        let (_, value) = entries
            .iter()
            .find(|(k, _)| matches!(self.object(*k), Some(Value::Str(s)) if s == key))?;
        self.object(*value)
    }

    fn archived_string(&self, objects: &[u64], uid: u64, depth: usize) -> Option<String> {
        if depth > MAX_DEPTH {
            return None;
        }
        let index = *objects.get(usize::try_from(uid).ok()?)?;

        match self.object(index)? {
            Value::Str(s) if s == NULL_OBJECT => None,
            Value::Str(s) => Some(s),
            Value::Dict(entries) => {
                STRING_KEYS.iter().find_map(|key| match self.dict_get(&entries, key)? {
                    Value::Uid(inner) => self.archived_string(objects, inner, depth + 1),
                    Value::Str(s) => Some(s),
                    _ => None,
                })
            }
            _ => None,
        }
    }
}

/// Big-endian unsigned integer of up to eight bytes.
fn be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}
