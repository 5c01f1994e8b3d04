//! The fixed-length record stored in heap pages.
//!
//! Every slot on disk is exactly [`RECORD_SIZE`] bytes. String fields are
//! NUL-terminated within their fixed widths; bytes past the terminator are
//! not part of the value.

/// Every record on disk is exactly this many bytes.
pub const RECORD_SIZE: usize = 64;

const NAME_LEN: usize = 32;
const EMAIL_LEN: usize = 24;

/// A 64-byte user record: `id`, `name`, `age`, `email`.
///
/// `id` is assigned at insert time and treated as the record's identity;
/// updates replace `name`, `email` and `age` but never `id`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    pub id: i32,
    pub name: [u8; NAME_LEN],
    pub age: i32,
    pub email: [u8; EMAIL_LEN],
}

impl Record {
    /// Build a record, truncating `name` and `email` to their field widths
    /// (keeping one byte for the NUL terminator) and zero-padding the rest.
    pub fn new(id: i32, name: &str, age: i32, email: &str) -> Self {
        let mut record = Self {
            id,
            name: [0; NAME_LEN],
            age,
            email: [0; EMAIL_LEN],
        };
        copy_truncated(&mut record.name, name.as_bytes());
        copy_truncated(&mut record.email, email.as_bytes());
        record
    }

    /// The `name` field up to its NUL terminator.
    pub fn name(&self) -> &str {
        field_str(&self.name)
    }

    /// The `email` field up to its NUL terminator.
    pub fn email(&self) -> &str {
        field_str(&self.email)
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[0..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.name);
        bytes[36..40].copy_from_slice(&self.age.to_le_bytes());
        bytes[40..64].copy_from_slice(&self.email);
        bytes
    }

    /// Decode a record from a slot. `bytes` must hold at least
    /// [`RECORD_SIZE`] bytes; slot accessors always hand out exact slices.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            id: i32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            name: bytes[4..36].try_into().unwrap(),
            age: i32::from_le_bytes(bytes[36..40].try_into().unwrap()),
            email: bytes[40..64].try_into().unwrap(),
        }
    }

    /// Encode this record into a slot-sized destination slice.
    pub fn write_to(&self, dest: &mut [u8]) {
        dest[..RECORD_SIZE].copy_from_slice(&self.to_bytes());
    }
}

fn copy_truncated(dest: &mut [u8], src: &[u8]) {
    let len = src.len().min(dest.len() - 1);
    dest[..len].copy_from_slice(&src[..len]);
}

fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("")
}
