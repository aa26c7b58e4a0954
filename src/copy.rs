//! Deep copy and structural equality.
//!
//! Both walk the tree with an explicit stack so that deeply nested input
//! cannot exhaust the call stack.

use crate::container::{copy_key, Array, Key, List};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::zone::Zone;
use core::slice;

enum Source<'s, 'a> {
    List(slice::Iter<'s, Value<'a>>),
    Array(slice::Iter<'s, (Key, Value<'a>)>),
}

// A container being copied: where the remaining children come from, the
// copy built so far, and the key it will be filed under in its parent.
struct Frame<'s, 'a> {
    src: Source<'s, 'a>,
    dst: Value<'static>,
    key: Option<Key>,
}

fn open<'s, 'a>(
    zone: &Zone,
    v: &'s Value<'a>,
    key: Option<Key>,
) -> Result<Frame<'s, 'a>, (Error, Option<Key>)> {
    let (src, dst) = match v {
        Value::List(l) => (
            Source::List(l.iter()),
            List::with_capacity(zone, l.len()).map(Value::List),
        ),
        Value::Array(a) => (
            Source::Array(a.entries.iter()),
            Array::with_capacity(zone, a.len()).map(Value::Array),
        ),
        _ => unreachable!("only containers open a frame"),
    };
    match dst {
        Ok(dst) => Ok(Frame { src, dst, key }),
        Err(e) => Err((e, key)),
    }
}

fn copy_scalar(zone: &Zone, v: &Value<'_>) -> Result<Value<'static>> {
    Ok(match v {
        Value::Null => Value::Null,
        Value::Boolean(b) => Value::Boolean(*b),
        Value::Number(n) => Value::Number(*n),
        Value::OwnedString(s) => tri!(Value::string_copy(zone, &**s)),
        // the copy must not alias the caller's memory
        Value::StringReference(s) => tri!(Value::string_copy(zone, *s)),
        Value::List(_) | Value::Array(_) => unreachable!("containers are copied through frames"),
    })
}

// Capacity for every child was reserved when the parent frame was opened,
// so filing a child never allocates.
fn file(parent: &mut Value<'static>, key: Option<Key>, child: Value<'static>) {
    match (parent, key) {
        (Value::List(l), None) => l.items.push(child),
        (Value::Array(a), Some(k)) => a.entries.push((k, child)),
        _ => unreachable!("key presence matches the parent kind"),
    }
}

fn unwind(zone: &Zone, stack: Vec<Frame<'_, '_>>) {
    for mut frame in stack.into_iter().rev() {
        frame.dst.destroy(zone);
        if let Some(k) = frame.key {
            zone.release(k.len());
        }
    }
}

impl<'a> Value<'a> {
    /// Deep copy. String references become owned strings, so the copy never
    /// borrows anything and is `'static`. On failure everything copied so
    /// far is released.
    pub fn copy(&self, zone: &Zone) -> Result<Value<'static>> {
        if !matches!(self, Value::List(_) | Value::Array(_)) {
            return copy_scalar(zone, self);
        }
        let mut stack = match open(zone, self, None) {
            Ok(root) => vec![root],
            Err((e, _)) => return Err(e),
        };
        while let Some(top) = stack.last_mut() {
            let next = match &mut top.src {
                Source::List(it) => it.next().map(|v| (None, v)),
                Source::Array(it) => it.next().map(|(k, v)| (Some(&**k), v)),
            };
            let Some((key, child)) = next else {
                if let Some(Frame { key, dst, .. }) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => file(&mut parent.dst, key, dst),
                        None => return Ok(dst),
                    }
                }
                continue;
            };
            let key = match key.map(|k| copy_key(zone, k)).transpose() {
                Ok(key) => key,
                Err(e) => {
                    unwind(zone, stack);
                    return Err(e);
                }
            };
            let copied = if matches!(child, Value::List(_) | Value::Array(_)) {
                match open(zone, child, key) {
                    Ok(frame) => {
                        stack.push(frame);
                        continue;
                    }
                    Err(failed) => Err(failed),
                }
            } else {
                match copy_scalar(zone, child) {
                    Ok(v) => Ok((key, v)),
                    Err(e) => Err((e, key)),
                }
            };
            match copied {
                Ok((key, v)) => {
                    if let Some(parent) = stack.last_mut() {
                        file(&mut parent.dst, key, v);
                    }
                }
                Err((e, key)) => {
                    if let Some(k) = key {
                        zone.release(k.len());
                    }
                    unwind(zone, stack);
                    return Err(e);
                }
            }
        }
        unreachable!("the root frame returns its copy when it closes")
    }

    /// Deep copy into a created node.
    pub fn create_copy(&self, zone: &Zone) -> Result<Box<Value<'static>>> {
        let copy = tri!(self.copy(zone));
        Value::create(zone, copy)
    }

    /// Deep copy into caller storage. `dst` is destroyed only once the copy
    /// exists, so on failure it is left as it was.
    pub fn copy_into(&self, zone: &Zone, dst: &mut Value<'_>) -> Result<()> {
        let copy = tri!(self.copy(zone));
        dst.destroy(zone);
        *dst = copy;
        Ok(())
    }

    /// Structural equality.
    ///
    /// - Kinds must match, except that owned strings and string references
    ///   compare by bytes alone.
    /// - Numbers compare with exact `==`: there is no tolerance, `NaN` is
    ///   never equal to itself and `0.0 == -0.0`.
    /// - `List`s compare element by element, in order.
    /// - `Array`s ignore order: same length, every key present on both
    ///   sides, and the first value under each key equal.
    pub fn equals(&self, other: &Value<'_>) -> bool {
        let mut stack: Vec<(&Value<'_>, &Value<'_>)> = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            match (a, b) {
                (Value::Null, Value::Null) => {}
                (Value::Boolean(x), Value::Boolean(y)) if x == y => {}
                (Value::Number(x), Value::Number(y)) if x == y => {}
                (Value::List(x), Value::List(y)) if x.len() == y.len() => {
                    stack.extend(x.iter().zip(y.iter()).rev());
                }
                (Value::Array(x), Value::Array(y)) if x.len() == y.len() => {
                    if y.keys().any(|k| !x.contains_key(k)) {
                        return false;
                    }
                    let mut pairs = Vec::with_capacity(x.len());
                    for k in x.keys() {
                        match (x.get(k), y.get(k)) {
                            (Some(v), Some(w)) => pairs.push((v, w)),
                            _ => return false,
                        }
                    }
                    stack.extend(pairs.into_iter().rev());
                }
                (a, b) if a.is_string() && b.is_string() => {
                    if a.as_bytes() != b.as_bytes() {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl PartialEq<Value<'_>> for Value<'_> {
    fn eq(&self, other: &Value<'_>) -> bool {
        self.equals(other)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::json;

    #[test]
    fn test_copy_materializes_references() {
        let z = Zone::new("t");
        let text = String::from("borrowed");
        let mut list = Value::list();
        list.as_list_mut()
            .unwrap()
            .push_move(&z, Value::string_ref(&text))
            .unwrap();
        let mut copy = list.copy(&z).unwrap();
        assert!(copy[0].is_owned_string());
        assert_ne!(copy[0].as_bytes().unwrap().as_ptr(), text.as_ptr());
        assert_eq!(copy, list);
        copy.destroy(&z);
        list.destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_copy_failure_at_every_step_is_balanced() {
        let src_zone = Zone::new("src");
        let mut src = json!(&src_zone, {
            "a": [1, "two", {"three": [3, 3.5]}],
            "b": {"c": null, "d": [true, false, []]},
            "e": "tail"
        })
        .unwrap();
        let full = Zone::new("count");
        let mut whole = src.copy(&full).unwrap();
        let needed = full.total_allocations();
        whole.destroy(&full);
        for n in 0..needed {
            let z = Zone::failing_after("f", n);
            assert!(src.copy(&z).is_err(), "copy with {} grants", n);
            assert!(z.is_balanced(), "leak after failing at {}", n);
        }
        src.destroy(&src_zone);
        assert!(src_zone.is_balanced());
    }

    #[test]
    fn test_copy_into_replaces() {
        let z = Zone::new("t");
        let mut dst = Value::string_copy(&z, "old").unwrap();
        let src = Value::number(4.0);
        src.copy_into(&z, &mut dst).unwrap();
        assert_eq!(dst.as_f64(), Some(4.0));
        assert!(z.is_balanced());
    }

    #[test]
    fn test_strict_numbers() {
        assert_ne!(Value::number(f64::NAN), Value::number(f64::NAN));
        assert_eq!(Value::number(0.0), Value::number(-0.0));
        assert_ne!(Value::number(0.1 + 0.2), Value::number(0.3));
    }

    #[test]
    fn test_kinds_must_match() {
        assert_ne!(Value::Null, Value::boolean(false));
        assert_ne!(Value::number(0.0), Value::boolean(false));
        assert_ne!(Value::list(), Value::array());
        assert_eq!(Value::string_ref("s"), Value::from("s"));
    }

    #[test]
    fn test_duplicate_keys_compare_first_match() {
        let z = Zone::new("t");
        let mut a = Value::array();
        let mut b = Value::array();
        {
            let a = a.as_array_mut().unwrap();
            a.insert_move(&z, "k", Value::number(1.0)).unwrap();
            a.insert_move(&z, "k", Value::number(2.0)).unwrap();
            let b = b.as_array_mut().unwrap();
            b.insert_move(&z, "k", Value::number(1.0)).unwrap();
            b.insert_move(&z, "j", Value::number(2.0)).unwrap();
        }
        assert_ne!(a, b);
        assert_ne!(b, a);
        a.destroy(&z);
        b.destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_duplicate_keys_later_entries_are_not_compared() {
        let z = Zone::new("t");
        let mut a = Value::array();
        let mut b = Value::array();
        {
            let a = a.as_array_mut().unwrap();
            a.insert_move(&z, "k", Value::number(1.0)).unwrap();
            a.insert_move(&z, "k", Value::number(2.0)).unwrap();
            let b = b.as_array_mut().unwrap();
            b.insert_move(&z, "k", Value::number(1.0)).unwrap();
            b.insert_move(&z, "k", Value::number(5.0)).unwrap();
        }
        // only the first entry per key takes part
        assert_eq!(a, b);
        assert_ne!(a.to_string(), b.to_string());
        a.destroy(&z);
        b.destroy(&z);
        assert!(z.is_balanced());
    }
}
