//! The field-traversal protocol shared by every encoder.
//!
//! A message describes "I have field N of type T with this value" through
//! typed callbacks; the engine drives them in ascending field-number order
//! without knowing the message's layout. Binary size calculation, binary
//! encoding, JSON emission, and text emission are all visitors.
//!
//! The trait is deliberately small: one generic method over the [`Value`]
//! union plus an unknown-fields hook, instead of a family of near-identical
//! per-wire-type methods.

use crate::descriptor::{FieldDescriptor, FieldKind, Label, Syntax};
use crate::value::{DynamicMessage, Value};

/// Synchronous field visitor.
pub trait Visitor {
    type Error;

    /// Called once per populated field, ascending by field number.
    fn visit_field(&mut self, field: &FieldDescriptor, value: &Value) -> Result<(), Self::Error>;

    /// Called once at the end with the raw preserved unknown-field bytes;
    /// not called when there are none.
    fn visit_unknown(&mut self, raw: &[u8]) -> Result<(), Self::Error> {
        let _ = raw;
        Ok(())
    }
}

/// Asynchronous field visitor for traversals whose steps need to suspend,
/// e.g. when an accessor streams a large field from upstream.
///
/// Field callbacks are awaited one at a time, never concurrently, in the
/// same ascending field-number order as [`Visitor`]. Cancelling the
/// enclosing task aborts the traversal between callbacks; no partial-field
/// state is exposed.
#[allow(async_fn_in_trait)]
pub trait AsyncVisitor {
    type Error;

    async fn visit_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> Result<(), Self::Error>;

    async fn visit_unknown(&mut self, raw: &[u8]) -> Result<(), Self::Error>;
}

/// Whether an encoder emits this field at all.
///
/// Proto3 implicit-presence singular fields equal to their default are
/// skipped; proto2 fields, oneof members, and anything message-typed emit
/// whenever present. Empty repeated and map fields are always skipped.
pub(crate) fn is_emitted(syntax: Syntax, field: &FieldDescriptor, value: &Value) -> bool {
    match field.label {
        Label::Repeated => match value {
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            _ => true,
        },
        Label::Optional | Label::Required => {
            if syntax == Syntax::Proto2
                || field.oneof.is_some()
                || matches!(field.kind, FieldKind::Message(_) | FieldKind::Group(_))
            {
                true
            } else {
                !value.is_default(&field.kind)
            }
        }
    }
}

/// Walks `message`'s populated fields and extensions, merged in ascending
/// field-number order, calling back into `visitor`.
pub fn traverse<V: Visitor>(message: &DynamicMessage, visitor: &mut V) -> Result<(), V::Error> {
    let syntax = message.descriptor().syntax();
    let mut extensions = message.extensions().peekable();

    for (number, value) in message.fields() {
        // Extensions with lower numbers go first.
        while let Some(ext) = extensions.peek() {
            if ext.field.number < number {
                visitor.visit_field(&ext.field, &ext.value)?;
                extensions.next();
            } else {
                break;
            }
        }

        // A number the descriptor does not declare has no wire type; skip it
        // rather than guess.
        let Some(field) = message.descriptor().field(number) else {
            continue;
        };
        if is_emitted(syntax, field, value) {
            visitor.visit_field(field, value)?;
        }
    }
    for ext in extensions {
        visitor.visit_field(&ext.field, &ext.value)?;
    }

    if !message.unknown().is_empty() {
        visitor.visit_unknown(message.unknown().as_bytes())?;
    }
    Ok(())
}

/// Asynchronous twin of [`traverse`].
pub async fn traverse_async<V: AsyncVisitor>(
    message: &DynamicMessage,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let syntax = message.descriptor().syntax();
    let mut extensions = message.extensions().peekable();

    for (number, value) in message.fields() {
        while let Some(ext) = extensions.peek() {
            if ext.field.number < number {
                visitor.visit_field(&ext.field, &ext.value).await?;
                extensions.next();
            } else {
                break;
            }
        }

        let Some(field) = message.descriptor().field(number) else {
            continue;
        };
        if is_emitted(syntax, field, value) {
            visitor.visit_field(field, value).await?;
        }
    }
    for ext in extensions {
        visitor.visit_field(&ext.field, &ext.value).await?;
    }

    if !message.unknown().is_empty() {
        visitor.visit_unknown(message.unknown().as_bytes()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;

    use super::*;
    use crate::descriptor::{MessageDescriptor, ScalarKind};

    fn descriptor() -> Arc<MessageDescriptor> {
        MessageDescriptor::new(
            "test.Order",
            Syntax::Proto3,
            vec![],
            vec![
                FieldDescriptor::new(1, "first", crate::descriptor::FieldKind::Scalar(ScalarKind::Int32)),
                FieldDescriptor::new(5, "fifth", crate::descriptor::FieldKind::Scalar(ScalarKind::Int32)),
                FieldDescriptor::new(9, "ninth", crate::descriptor::FieldKind::Scalar(ScalarKind::Int32)),
            ],
        )
    }

    struct Recorder {
        numbers: Vec<u32>,
    }

    impl Visitor for Recorder {
        type Error = Infallible;

        fn visit_field(&mut self, field: &FieldDescriptor, _: &Value) -> Result<(), Infallible> {
            self.numbers.push(field.number);
            Ok(())
        }
    }

    #[test]
    fn visits_in_field_number_order() {
        let mut msg = DynamicMessage::new(descriptor());
        msg.set(9, Value::I32(3));
        msg.set(1, Value::I32(1));
        msg.set(5, Value::I32(2));

        let mut recorder = Recorder { numbers: vec![] };
        traverse(&msg, &mut recorder).unwrap();
        assert_eq!(recorder.numbers, vec![1, 5, 9]);
    }

    #[test]
    fn proto3_defaults_are_skipped() {
        let mut msg = DynamicMessage::new(descriptor());
        msg.set(1, Value::I32(0));
        msg.set(5, Value::I32(7));

        let mut recorder = Recorder { numbers: vec![] };
        traverse(&msg, &mut recorder).unwrap();
        assert_eq!(recorder.numbers, vec![5]);
    }

    #[test]
    fn undeclared_numbers_are_skipped() {
        // set() does not validate field numbers, so the traversal must not
        // assume every stored number has a descriptor entry.
        let mut msg = DynamicMessage::new(descriptor());
        msg.set(1, Value::I32(1));
        msg.set(99, Value::I32(5));

        let mut recorder = Recorder { numbers: vec![] };
        traverse(&msg, &mut recorder).unwrap();
        assert_eq!(recorder.numbers, vec![1]);
    }

    #[test]
    fn extensions_are_merged_by_number() {
        let mut msg = DynamicMessage::new(descriptor());
        msg.set(1, Value::I32(1));
        msg.set(9, Value::I32(3));
        let ext = Arc::new(
            FieldDescriptor::new(
                7,
                "test.ext_field",
                crate::descriptor::FieldKind::Scalar(ScalarKind::Int32),
            ),
        );
        msg.set_extension(ext, Value::I32(2));

        let mut recorder = Recorder { numbers: vec![] };
        traverse(&msg, &mut recorder).unwrap();
        assert_eq!(recorder.numbers, vec![1, 7, 9]);
    }
}
