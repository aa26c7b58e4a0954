// Based on the similar macro from serde_json, with every node charged to a
// zone.

use crate::container::{Array, List};
use crate::error::{Rejected, Result};
use crate::value::Value;
use crate::zone::Zone;

/// Conversion into a tree node, for the leaves of [`json!`](crate::json).
pub trait IntoValue {
    fn into_value(self, zone: &Zone) -> Result<Value<'static>>;
}

impl IntoValue for Value<'static> {
    fn into_value(self, _: &Zone) -> Result<Value<'static>> {
        Ok(self)
    }
}

impl IntoValue for bool {
    fn into_value(self, _: &Zone) -> Result<Value<'static>> {
        Ok(Value::Boolean(self))
    }
}

impl IntoValue for &str {
    fn into_value(self, zone: &Zone) -> Result<Value<'static>> {
        Value::string_copy(zone, self)
    }
}

impl IntoValue for String {
    fn into_value(self, zone: &Zone) -> Result<Value<'static>> {
        Value::string(zone, self)
    }
}

impl IntoValue for &String {
    fn into_value(self, zone: &Zone) -> Result<Value<'static>> {
        Value::string_copy(zone, self)
    }
}

macro_rules! impl_into_value_num {
    ($($t:ty),*) => {$(
        impl IntoValue for $t {
            fn into_value(self, _: &Zone) -> Result<Value<'static>> {
                Ok(Value::Number(self as f64))
            }
        }
    )*};
}
impl_into_value_num!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

#[doc(hidden)]
pub mod __private {
    use super::*;
    pub use std::vec;

    // Children are built before their parent. On the first failure every
    // child that did get built is destroyed and that failure is reported.

    pub fn list(zone: &Zone, items: Vec<Result<Value<'static>>>) -> Result<Value<'static>> {
        let mut list = List::new();
        let mut failed = None;
        for item in items {
            match item {
                Ok(mut v) if failed.is_some() => v.destroy(zone),
                Ok(v) => {
                    if let Err(Rejected { mut value, error }) = list.push_move(zone, v) {
                        value.destroy(zone);
                        failed = Some(error);
                    }
                }
                Err(e) => {
                    failed.get_or_insert(e);
                }
            }
        }
        let mut out = Value::List(list);
        match failed {
            None => Ok(out),
            Some(e) => {
                out.destroy(zone);
                Err(e)
            }
        }
    }

    pub fn array(zone: &Zone, entries: Vec<(Vec<u8>, Result<Value<'static>>)>) -> Result<Value<'static>> {
        let mut array = Array::new();
        let mut failed = None;
        for (key, item) in entries {
            match item {
                Ok(mut v) if failed.is_some() => v.destroy(zone),
                Ok(v) => {
                    if let Err(Rejected { mut value, error }) = array.insert_move(zone, key, v) {
                        value.destroy(zone);
                        failed = Some(error);
                    }
                }
                Err(e) => {
                    failed.get_or_insert(e);
                }
            }
        }
        let mut out = Value::Array(array);
        match failed {
            None => Ok(out),
            Some(e) => {
                out.destroy(zone);
                Err(e)
            }
        }
    }

    pub fn key<K: AsRef<[u8]> + ?Sized>(k: &K) -> Vec<u8> {
        k.as_ref().to_vec()
    }
}

/// Builds a tree charged to a zone from JSON-like syntax. Evaluates to
/// `Result<Value<'static>>`; if any node is refused, nothing stays charged.
///
/// ```
/// use zonejson::{json, Zone};
/// let zone = Zone::new("doc");
/// let name = "widget";
/// let mut v = json!(&zone, {"name": name, "sizes": [1, 2.5, null]}).unwrap();
/// assert_eq!(v["sizes"][1].as_f64(), Some(2.5));
/// v.destroy(&zone);
/// assert!(zone.is_balanced());
/// ```
#[macro_export]
macro_rules! json {
    ($zone:expr, $($tt:tt)+) => {{
        let __zone: &$crate::Zone = $zone;
        $crate::__json_value!(__zone; $($tt)+)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __json_value {
    ($z:ident; null) => (::core::result::Result::Ok::<_, $crate::Error>($crate::Value::Null));
    ($z:ident; true) => (::core::result::Result::Ok::<_, $crate::Error>($crate::Value::Boolean(true)));
    ($z:ident; false) => (::core::result::Result::Ok::<_, $crate::Error>($crate::Value::Boolean(false)));
    ($z:ident; {}) => (::core::result::Result::Ok::<_, $crate::Error>($crate::Value::array()));
    ($z:ident; []) => (::core::result::Result::Ok::<_, $crate::Error>($crate::Value::list()));
    ($z:ident; [ $($tt:tt)+ ]) => {
        $crate::__munch_json_array!($z [] $($tt)+)
    };
    ($z:ident; { $($tt:tt)+ }) => {{
        let mut entries = $crate::__private::vec::Vec::new();
        $crate::__munch_json_object!($z entries () ($($tt)+) ($($tt)+));
        $crate::__private::array($z, entries)
    }};
    ($z:ident; $other:expr) => {
        $crate::IntoValue::into_value($other, $z)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __munch_json_array {
    ($z:ident [$($elems:expr,)*]) => {
        $crate::__private::list($z, $crate::__private::vec![$($elems,)*])
    };
    ($z:ident [$($elems:expr),*]) => {
        $crate::__private::list($z, $crate::__private::vec![$($elems,)*])
    };
    ($z:ident [$($elems:expr,)*] null $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; null)] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] true $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; true)] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] false $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; false)] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] [$($array:tt)*] $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; [$($array)*])] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] {$($map:tt)*} $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; {$($map)*})] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] $next:expr, $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; $next),] $($rest)*)
    };
    ($z:ident [$($elems:expr,)*] $last:expr) => {
        $crate::__munch_json_array!($z [$($elems,)* $crate::__json_value!($z; $last)])
    };
    ($z:ident [$($elems:expr),*] , $($rest:tt)*) => {
        $crate::__munch_json_array!($z [$($elems,)*] $($rest)*)
    };
    ($z:ident [$($elems:expr),*] $unexpected:tt $($rest:tt)*) => {
        $crate::json_unexpected!($unexpected)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __munch_json_object {
    ($z:ident $entries:ident () () ()) => {};
    ($z:ident $entries:ident [$($key:tt)+] ($value:expr) , $($rest:tt)*) => {
        $entries.push(($crate::__private::key(&($($key)+)), $value));
        $crate::__munch_json_object!($z $entries () ($($rest)*) ($($rest)*));
    };
    ($z:ident $entries:ident [$($key:tt)+] ($value:expr) $unexpected:tt $($rest:tt)*) => {
        $crate::json_unexpected!($unexpected);
    };
    ($z:ident $entries:ident [$($key:tt)+] ($value:expr)) => {
        $entries.push(($crate::__private::key(&($($key)+)), $value));
    };
    ($z:ident $entries:ident ($($key:tt)+) (: null $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; null)) $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: true $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; true)) $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: false $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; false)) $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: [$($array:tt)*] $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; [$($array)*])) $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: {$($map:tt)*} $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; {$($map)*})) $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: $value:expr , $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; $value)) , $($rest)*);
    };
    ($z:ident $entries:ident ($($key:tt)+) (: $value:expr) $copy:tt) => {
        $crate::__munch_json_object!($z $entries [$($key)+] ($crate::__json_value!($z; $value)));
    };
    ($z:ident $entries:ident ($($key:tt)+) (:) $copy:tt) => {
        $crate::json_unexpected!();
    };
    ($z:ident $entries:ident ($($key:tt)+) () $copy:tt) => {
        $crate::json_unexpected!();
    };
    ($z:ident $entries:ident () (: $($rest:tt)*) ($colon:tt $($copy:tt)*)) => {
        $crate::json_unexpected!($colon);
    };
    ($z:ident $entries:ident ($($key:tt)*) (, $($rest:tt)*) ($comma:tt $($copy:tt)*)) => {
        $crate::json_unexpected!($comma);
    };
    ($z:ident $entries:ident () (($key:expr) : $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries ($key) (: $($rest)*) (: $($rest)*));
    };
    ($z:ident $entries:ident ($($key:tt)*) (: $($unexpected:tt)+) $copy:tt) => {
        $crate::json_expect_expr_comma!($($unexpected)+);
    };
    ($z:ident $entries:ident ($($key:tt)*) ($tt:tt $($rest:tt)*) $copy:tt) => {
        $crate::__munch_json_object!($z $entries ($($key)* $tt) ($($rest)*) ($($rest)*));
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! json_expect_expr_comma {
    ($e:expr , $($tt:tt)*) => {};
}

#[macro_export]
#[doc(hidden)]
macro_rules! json_unexpected {
    () => {};
}

#[cfg(test)]
mod test {
    use crate::{Value, Zone};

    #[test]
    fn test_json_macro_shapes() {
        let z = Zone::new("t");
        let owned = String::from("own");
        let mut v = json!(&z, {
            "a": [1, -2, 3.5],
            "b": {"c": null, "d": true},
            "e": owned,
            "f": [],
            "g": {}
        })
        .unwrap();
        assert_eq!(v["a"][1].as_f64(), Some(-2.0));
        assert!(v["b"]["c"].is_null());
        assert_eq!(v["b"]["d"].as_bool(), Some(true));
        assert_eq!(v["e"].as_str(), Some("own"));
        assert!(v["f"].as_list().is_some_and(|l| l.is_empty()));
        assert!(v["g"].as_array().is_some_and(|a| a.is_empty()));
        v.destroy(&z);
        assert!(z.is_balanced());
    }

    #[test]
    fn test_json_macro_keeps_entry_order() {
        let z = Zone::new("t");
        let mut v = json!(&z, {"z": 1, "a": 2, "m": 3}).unwrap();
        let keys: Vec<&[u8]> = v.as_array().unwrap().keys().collect();
        assert_eq!(keys, vec![&b"z"[..], &b"a"[..], &b"m"[..]]);
        v.destroy(&z);
    }

    #[test]
    fn test_json_macro_failure_is_balanced() {
        for n in 0..12 {
            let z = Zone::failing_after("f", n);
            if let Ok(mut v) = json!(&z, {"k": ["abc", {"x": "yz"}], "l": "m"}) {
                v.destroy(&z);
            }
            assert!(z.is_balanced(), "leak after {} grants", n);
        }
        let z = Zone::new("t");
        assert_eq!(json!(&z, 3).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_json_macro_bare_literals() {
        let z = Zone::new("t");
        assert!(json!(&z, null).unwrap().is_null());
        assert_eq!(json!(&z, true).unwrap().as_bool(), Some(true));
        assert_eq!(json!(&z, false).unwrap().as_bool(), Some(false));
        assert!(json!(&z, {}).unwrap().as_array().unwrap().is_empty());
        assert!(json!(&z, []).unwrap().as_list().unwrap().is_empty());
        assert!(z.is_balanced());
    }
}
