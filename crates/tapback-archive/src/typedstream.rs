/// Reader for the legacy `NSArchiver` typedstream format.
///
/// Only the path needed to reach the root string is followed:
///
/// ```text
/// header      04 0B "streamtyped" 81 E8 03
/// root group  84 01 '@'                       type encoding "@"
/// object      84 <class chain> <groups...> 86
/// class       84 <shared name> <version> <superclass | 85>
/// NSString    84 01 '+' <len> <utf-8 bytes>   type "+" then the text
/// ```
///
/// An `NSAttributedString` root holds its plain text as the first `@`
/// group, so the reader descends one object and stops as soon as the text
/// is known. Attribute runs that follow are never parsed.

use crate::Strategy;

const STREAMER_VERSION: i64 = 4;
const SIGNATURE: &[u8] = b"streamtyped";

const TAG_I16: u8 = 0x81;
const TAG_I32: u8 = 0x82;
const TAG_NEW: u8 = 0x84;
const TAG_NIL: u8 = 0x85;

/// Integer value of the first back-reference head byte (0x92).
const REFERENCE_BASE: i64 = -110;

const MAX_DEPTH: usize = 8;
const MAX_CLASS_CHAIN: usize = 32;

pub struct TypedStream;

impl Strategy for TypedStream {
    fn name(&self) -> &'static str {
        "typedstream"
    }

    fn decode(&self, blob: &[u8]) -> Option<String> {
        Reader::new(blob).root_text()
    }
}

/// Entries of the shared object table. Objects and classes share one
/// table, numbered in order of first appearance.
enum Shared<'a> {
    Class {
        name: &'a [u8],
        superclass: Option<usize>,
    },
    Object {
        text: Option<String>,
    },
}

enum Family {
    String,
    AttributedString,
    Other,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    strings: Vec<&'a [u8]>,
    shared: Vec<Shared<'a>>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strings: Vec::new(),
            shared: Vec::new(),
        }
    }

    fn root_text(mut self) -> Option<String> {
        self.header()?;
        if self.shared_string()? != b"@" {
            return None;
        }
        self.object_text(0)
    }

    fn header(&mut self) -> Option<()> {
        if self.integer()? != STREAMER_VERSION {
            return None;
        }
        if self.unshared_string()? != SIGNATURE {
            return None;
        }
        // System version, 1000 in every store seen so far.
        self.integer()?;
        Some(())
    }

    // -- Primitives --

    fn byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn integer_with_head(&mut self, head: u8) -> Option<i64> {
        match head {
            TAG_I16 => {
                let b = self.bytes(2)?;
                Some(i64::from(i16::from_le_bytes([b[0], b[1]])))
            }
            TAG_I32 => {
                let b = self.bytes(4)?;
                Some(i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            }
            _ => Some(i64::from(head as i8)),
        }
    }

    fn integer(&mut self) -> Option<i64> {
        let head = self.byte()?;
        self.integer_with_head(head)
    }

    fn reference(&mut self, head: u8) -> Option<usize> {
        let value = self.integer_with_head(head)?;
        usize::try_from(value - REFERENCE_BASE).ok()
    }

    fn unshared_string(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.integer()?).ok()?;
        self.bytes(len)
    }

    /// Type encodings and class names. A nil string is treated as malformed.
    fn shared_string(&mut self) -> Option<&'a [u8]> {
        match self.byte()? {
            TAG_NEW => {
                let s = self.unshared_string()?;
                self.strings.push(s);
                Some(s)
            }
            TAG_NIL => None,
            head => {
                let index = self.reference(head)?;
                self.strings.get(index).copied()
            }
        }
    }

    // -- Objects --

    fn object_text(&mut self, depth: usize) -> Option<String> {
        if depth > MAX_DEPTH {
            return None;
        }

        match self.byte()? {
            TAG_NEW => {
                // The object takes its slot before its class is read.
                let slot = self.shared.len();
                self.shared.push(Shared::Object { text: None });

                let class = self.class(0)?;
                let text = match self.family(class) {
                    Family::String => self.string_contents()?,
                    Family::AttributedString => self.attributed_contents(depth)?,
                    Family::Other => return None,
                };

                self.shared[slot] = Shared::Object {
                    text: Some(text.clone()),
                };
                Some(text)
            }
            TAG_NIL => None,
            head => {
                let index = self.reference(head)?;
                match self.shared.get(index)? {
                    Shared::Object { text } => text.clone(),
                    Shared::Class { .. } => None,
                }
            }
        }
    }

    /// Outer `None` means malformed input, inner `None` a nil class.
    fn class(&mut self, chain: usize) -> Option<Option<usize>> {
        if chain > MAX_CLASS_CHAIN {
            return None;
        }

        match self.byte()? {
            TAG_NIL => Some(None),
            TAG_NEW => {
                let name = self.shared_string()?;
                let _version = self.integer()?;

                let slot = self.shared.len();
                self.shared.push(Shared::Class {
                    name,
                    superclass: None,
                });
                let superclass = self.class(chain + 1)?;
                self.shared[slot] = Shared::Class { name, superclass };
                Some(Some(slot))
            }
            head => {
                let index = self.reference(head)?;
                matches!(self.shared.get(index)?, Shared::Class { .. }).then_some(Some(index))
            }
        }
    }

    fn family(&self, mut class: Option<usize>) -> Family {
        // Bounded walk: a crafted superclass reference can point back at itself.
        for _ in 0..=self.shared.len() {
            let Some(Shared::Class { name, superclass }) = class.and_then(|i| self.shared.get(i))
            else {
                break;
            };
            match *name {
                b"NSString" => return Family::String,
                b"NSAttributedString" => return Family::AttributedString,
                _ => class = *superclass,
            }
        }
        Family::Other
    }

    fn string_contents(&mut self) -> Option<String> {
        if self.shared_string()? != b"+" {
            return None;
        }
        let bytes = self.unshared_string()?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn attributed_contents(&mut self, depth: usize) -> Option<String> {
        if self.shared_string()? != b"@" {
            return None;
        }
        self.object_text(depth + 1)
    }
}
