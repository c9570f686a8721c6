//! Assertion functions for comparing pipeline outputs.

use crate::element::Element;
use std::cmp::Ordering;

/// Assert that two element sequences are equal in order and content.
///
/// # Panics
///
/// Panics if the sequences differ in length or at any index.
///
/// # Example
///
/// ```
/// use ironpipe::testing::{assert_elements_equal, int_values};
///
/// assert_elements_equal(&int_values([1, 2, 3]), &int_values([1, 2, 3]));
/// ```
pub fn assert_elements_equal(actual: &[Element], expected: &[Element]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Sequence length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Sequence mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that two element sequences hold the same elements with the same
/// multiplicities, ignoring order.
///
/// # Panics
///
/// Panics if the sorted sequences differ.
///
/// # Example
///
/// ```
/// use ironpipe::testing::{assert_same_multiset, int_values};
///
/// assert_same_multiset(&int_values([3, 1, 1, 2]), &int_values([1, 2, 1, 3]));
/// ```
pub fn assert_same_multiset(actual: &[Element], expected: &[Element]) {
    let mut a = actual.to_vec();
    let mut e = expected.to_vec();
    a.sort_by(total_cmp);
    e.sort_by(total_cmp);
    assert_eq!(
        a, e,
        "Multiset mismatch:\n  Expected (sorted): {e:?}\n  Actual (sorted): {a:?}"
    );
}

/// Assert that every chunk of `size` consecutive elements in `actual` is a
/// permutation of the corresponding chunk of `expected`.
///
/// # Panics
///
/// Panics on a length mismatch or if any chunk's multiset differs.
pub fn assert_chunkwise_permutation(actual: &[Element], expected: &[Element], size: usize) {
    assert_eq!(actual.len(), expected.len(), "Sequence length mismatch");
    for (i, (a, e)) in actual.chunks(size).zip(expected.chunks(size)).enumerate() {
        let mut a = a.to_vec();
        let mut e = e.to_vec();
        a.sort_by(total_cmp);
        e.sort_by(total_cmp);
        assert_eq!(a, e, "Chunk {i} is not a permutation of its input");
    }
}

/// Total order over elements, used only to sort for comparison.
fn total_cmp(a: &Element, b: &Element) -> Ordering {
    fn rank(e: &Element) -> u8 {
        match e {
            Element::Null => 0,
            Element::Bool(_) => 1,
            Element::Int(_) => 2,
            Element::Float(_) => 3,
            Element::Text(_) => 4,
            Element::Bytes(_) => 5,
            Element::List(_) => 6,
        }
    }
    match (a, b) {
        (Element::Bool(x), Element::Bool(y)) => x.cmp(y),
        (Element::Int(x), Element::Int(y)) => x.cmp(y),
        (Element::Float(x), Element::Float(y)) => x.total_cmp(y),
        (Element::Text(x), Element::Text(y)) => x.cmp(y),
        (Element::Bytes(x), Element::Bytes(y)) => x.cmp(y),
        (Element::List(x), Element::List(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(p, q)| total_cmp(p, q))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
