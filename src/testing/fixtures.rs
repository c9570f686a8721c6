//! Fixtures: element sequences and named functions used across tests and docs.

use crate::element::Element;
use crate::udf::{FlatMapFn, MapFn, PredicateFn};
use anyhow::anyhow;
use std::ops::Range;

/// `Element::Int` for every value of `range`.
///
/// ```
/// use ironpipe::testing::ints;
///
/// assert_eq!(ints(0..3).len(), 3);
/// ```
#[must_use]
pub fn ints(range: Range<i64>) -> Vec<Element> {
    range.map(Element::Int).collect()
}

/// `Element::Int` for each value given.
pub fn int_values<I: IntoIterator<Item = i64>>(values: I) -> Vec<Element> {
    values.into_iter().map(Element::Int).collect()
}

/// `Element::List` of ints, as produced by `batch`, `window` and `zip`.
pub fn int_list<I: IntoIterator<Item = i64>>(values: I) -> Element {
    Element::List(int_values(values))
}

fn int_of(e: &Element) -> anyhow::Result<i64> {
    e.as_i64().ok_or_else(|| anyhow!("expected an int, got {}", e.kind()))
}

/// `x -> 2x`, registered as `double`.
#[must_use]
pub fn double() -> MapFn {
    MapFn::new("double", |e: Element| Ok(Element::Int(int_of(&e)? * 2)))
}

/// `x -> x + 1`, registered as `increment`.
#[must_use]
pub fn increment() -> MapFn {
    MapFn::new("increment", |e: Element| Ok(Element::Int(int_of(&e)? + 1)))
}

/// `x -> x * x`, registered as `square`.
#[must_use]
pub fn square() -> MapFn {
    MapFn::new("square", |e: Element| {
        let v = int_of(&e)?;
        Ok(Element::Int(v * v))
    })
}

/// Keeps even ints, registered as `is_even`.
#[must_use]
pub fn is_even() -> PredicateFn {
    PredicateFn::new("is_even", |e: &Element| Ok(int_of(e)? % 2 == 0))
}

/// `n -> [n, n]`, registered as `duplicate`.
#[must_use]
pub fn duplicate() -> FlatMapFn {
    FlatMapFn::new("duplicate", |e: Element| Ok(vec![e.clone(), e]))
}

/// Map that fails on the int `bad` and passes everything else through,
/// registered as `fail_on_<bad>`.
#[must_use]
pub fn fail_on(bad: i64) -> MapFn {
    MapFn::new(format!("fail_on_{bad}"), move |e: Element| {
        if e.as_i64() == Some(bad) {
            Err(anyhow!("refusing to process {bad}"))
        } else {
            Ok(e)
        }
    })
}

/// Splits a text element on whitespace, registered as `split_words`.
#[must_use]
pub fn split_words() -> FlatMapFn {
    FlatMapFn::new("split_words", |e: Element| {
        let text = e.as_str().ok_or_else(|| anyhow!("expected text, got {}", e.kind()))?;
        Ok(text.split_whitespace().map(Element::from).collect())
    })
}
