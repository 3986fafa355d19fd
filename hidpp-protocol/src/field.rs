//! Declarative bitfield descriptors and message schemas.
//!
//! A schema is a flat, ordered list of field descriptors; the on-wire
//! layout concatenates their bit ranges in declaration order. Schema
//! inheritance is expressed by [`Schema::extend`] returning a new list,
//! never by dispatch over a type hierarchy.

use crate::bits::BitVec;
use crate::error::{ProtocolError, Result};
use crate::hex::HexBuf;

/// A predicate attached to a field, run on assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Value fits in one byte (0..=255).
    Byte,
    /// Value is exactly this many bytes.
    HexList(usize),
    /// Integer value within an inclusive range.
    Int { min: i64, max: i64 },
    /// List value of exactly this many elements.
    List(usize),
}

impl Check {
    fn apply(&self, name: &str, value: &FieldValue) -> Result<()> {
        let fail = |reason: String| {
            Err(ProtocolError::InvalidValue {
                field: name.to_string(),
                reason,
            })
        };
        match self {
            Check::Byte => match value {
                FieldValue::Uint(v) if *v <= 0xFF => Ok(()),
                FieldValue::Bytes(b) if b.len() == 1 => Ok(()),
                _ => fail("expected a single byte value".into()),
            },
            Check::HexList(n) | Check::List(n) => match value {
                FieldValue::Bytes(b) if b.len() == *n => Ok(()),
                FieldValue::Bytes(b) => fail(format!("expected {n} bytes, got {}", b.len())),
                FieldValue::Uint(_) => Ok(()),
            },
            Check::Int { min, max } => match value {
                FieldValue::Uint(v) => {
                    let v = *v as i64;
                    if v >= *min && v <= *max {
                        Ok(())
                    } else {
                        fail(format!("{v} outside {min}..={max}"))
                    }
                }
                FieldValue::Bytes(b) => {
                    let v = b.as_uint()? as i64;
                    if v >= *min && v <= *max {
                        Ok(())
                    } else {
                        fail(format!("{v} outside {min}..={max}"))
                    }
                }
            },
        }
    }
}

/// A value being assigned to a field.
///
/// Integers are converted to a fixed-width `HexBuf` on assignment (the
/// conversion happens on set, never on get).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(u64),
    Bytes(HexBuf),
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::Uint(v as u64)
    }
}

impl From<HexBuf> for FieldValue {
    fn from(v: HexBuf) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(HexBuf::from(v))
    }
}

/// Descriptor of one bitfield within a message.
///
/// Two descriptors are equal iff all attributes match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    pub fid: u8,
    /// Width in bits; `None` marks a variable-length terminal field.
    pub bit_length: Option<u16>,
    pub default: Option<HexBuf>,
    pub title: &'static str,
    pub name: &'static str,
    pub checks: Vec<Check>,
    pub optional: bool,
    pub aliases: &'static [&'static str],
}

impl FieldDesc {
    pub fn new(fid: u8, name: &'static str, title: &'static str, bit_length: u16) -> Self {
        Self {
            fid,
            bit_length: Some(bit_length),
            default: None,
            title,
            name,
            checks: Vec::new(),
            optional: false,
            aliases: &[],
        }
    }

    /// A variable-length field; must be the last field of its schema.
    pub fn variable(fid: u8, name: &'static str, title: &'static str) -> Self {
        Self {
            fid,
            bit_length: None,
            default: None,
            title,
            name,
            checks: Vec::new(),
            optional: false,
            aliases: &[],
        }
    }

    pub fn with_checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_default(mut self, default: HexBuf) -> Self {
        self.default = Some(default);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Run every check in order; the first failure wins.
    pub fn validate(&self, value: &FieldValue) -> Result<()> {
        for check in &self.checks {
            check.apply(self.name, value)?;
        }
        Ok(())
    }

    /// Convert an accepted value to its wire bits.
    pub fn to_bits(&self, value: &FieldValue) -> Result<BitVec> {
        match (self.bit_length, value) {
            (Some(bits), FieldValue::Uint(v)) => BitVec::from_uint(*v, bits as usize),
            (Some(bits), FieldValue::Bytes(b)) => {
                let width_bytes = (bits as usize).div_ceil(8);
                if b.len() > width_bytes {
                    return Err(ProtocolError::InvalidValue {
                        field: self.name.to_string(),
                        reason: format!("{} bytes exceed {bits} bits", b.len()),
                    });
                }
                let padded = b.pad_left(width_bytes);
                let bv = BitVec::from_bytes(padded.as_slice());
                // drop leading pad bits for non-byte-aligned fields
                bv.get_slice(width_bytes * 8 - bits as usize, width_bytes * 8)
            }
            (None, FieldValue::Bytes(b)) => Ok(BitVec::from_bytes(b.as_slice())),
            (None, FieldValue::Uint(v)) => Ok(BitVec::from_bytes(&v.to_be_bytes())),
        }
    }
}

/// An ordered, immutable field list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<FieldDesc>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDesc>) -> Result<Self> {
        // variable-length fields must be terminal
        for (i, f) in fields.iter().enumerate() {
            if f.bit_length.is_none() && i + 1 != fields.len() {
                return Err(ProtocolError::InvalidReport(format!(
                    "variable-length field '{}' is not terminal",
                    f.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Concatenate this schema with additional fields, yielding a new one.
    pub fn extend(&self, more: Vec<FieldDesc>) -> Result<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(more);
        Schema::new(fields)
    }

    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    pub fn field_by_id(&self, fid: u8) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| f.fid == fid)
    }

    /// Look up by name or alias.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDesc> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.aliases.contains(&name))
    }

    /// Total width in bits; `None` when a variable-length field is present.
    pub fn total_bits(&self) -> Option<usize> {
        self.fields
            .iter()
            .map(|f| f.bit_length.map(|b| b as usize))
            .sum()
    }
}
