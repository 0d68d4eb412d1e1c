//! Extension field registry.
//!
//! Extensions are proto2 fields declared outside the message they extend.
//! The decoders consult a caller-supplied registry whenever a field number
//! (binary) or field name (JSON, text) is not part of the message's own
//! catalog; a hit decodes like a regular field but lands in the message's
//! extension set instead of its field map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::FieldDescriptor;

/// Maps `(extendee full name, field number)` and `(extendee full name,
/// name)` to extension descriptors.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    by_number: HashMap<(String, u32), Arc<FieldDescriptor>>,
    by_name: HashMap<(String, String), Arc<FieldDescriptor>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Registers an extension of `extendee`. The descriptor's `name` should
    /// be the fully qualified extension name (`my.pkg.ext_field`); lookups
    /// also work through the JSON name.
    pub fn register(&mut self, extendee: &str, mut field: FieldDescriptor) {
        field.is_extension = true;
        let field = Arc::new(field);
        self.by_number
            .insert((extendee.to_owned(), field.number), field.clone());
        self.by_name
            .insert((extendee.to_owned(), field.name.clone()), field.clone());
        if field.json_name != field.name {
            self.by_name
                .insert((extendee.to_owned(), field.json_name.clone()), field);
        }
    }

    pub fn by_number(&self, extendee: &str, number: u32) -> Option<&Arc<FieldDescriptor>> {
        self.by_number.get(&(extendee.to_owned(), number))
    }

    pub fn by_name(&self, extendee: &str, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.by_name.get(&(extendee.to_owned(), name.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}
