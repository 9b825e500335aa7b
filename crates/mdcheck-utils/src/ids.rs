//! Opaque record identifiers: 128 random bits as 32 lowercase hex chars.

use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
