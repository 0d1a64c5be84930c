//! Structural equality between property values and whole records.

use crate::field_value::FieldValue;
use crate::record::Record;

/// Compare two optional property values. An absent value and `Null` are equal.
pub fn values_equal(a: Option<&FieldValue>, b: Option<&FieldValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) => v.is_null(),
    }
}

/// Compare two records property by property over the union of their field names.
pub fn records_equal<R: Record>(a: &R, b: &R) -> bool {
    let fields_a = a.fields();
    let fields_b = b.fields();
    fields_a
        .iter()
        .chain(fields_b.iter().filter(|d| !fields_a.iter().any(|o| o.name == d.name)))
        .all(|d| values_equal(a.get_field(d.name).as_ref(), b.get_field(d.name).as_ref()))
}

/// Names of the properties whose values differ between two records.
pub fn differing_fields<'a, R: Record>(a: &'a R, b: &R) -> Vec<&'a str> {
    a.fields()
        .into_iter()
        .filter(|d| !values_equal(a.get_field(d.name).as_ref(), b.get_field(d.name).as_ref()))
        .map(|d| d.name)
        .collect()
}
