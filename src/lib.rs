//! An in-memory JSON tree whose every allocation is charged to a [`Zone`].
//!
//! Nodes are [`Value`]s. Containers come in two kinds: [`Array`] (a JSON
//! object, keyed and insertion ordered) and [`List`] (a JSON array). Strings
//! are either owned or borrowed from the caller ([`Value::StringReference`]).
//! Every operation that can allocate reports refusal as
//! [`Error::AllocationFailure`] and leaves the zone balanced.
//!
//! ## Basic Usage
//! ```
//! use zonejson::{json, parse, Writer, Zone};
//! let zone = Zone::new("doc");
//! let mut v = parse(&zone, r#"{"foo": [1, 2, {"bar": 3}]}"#).unwrap();
//! let mut expected = json!(&zone, {"foo": [1, 2, {"bar": 3}]}).unwrap();
//! assert_eq!(v, expected);
//!
//! let mut w = Writer::new(false);
//! zonejson::stringify(&mut w, &v).unwrap();
//! assert_eq!(w.as_bytes(), br#"{"foo":[1,2,{"bar":3}]}"#);
//!
//! v.destroy(&zone);
//! expected.destroy(&zone);
//! assert!(zone.is_balanced());
//! ```
//!
//! ## Ownership
//!
//! Inserting into a container follows one of three policies: `*_copy`
//! stores a deep copy, `*_move` takes the value and hands it back inside
//! [`Rejected`] on failure, `*_move_or_free` takes a created node and frees
//! it on failure. See [`List`] and [`Array`].

macro_rules! opt_extract {
    ($this:expr, $pat:pat => $res:expr) => {
        if let $pat = $this {
            $res
        } else {
            None
        }
    };
}

// `?` expansion currently harms both compile time (lots of llvm instrs
// generated) and runtime :(
macro_rules! tri {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Err(e),
        }
    };
}
#[macro_use]
mod mac;

pub mod container;
mod copy;
pub mod error;
pub mod read;
pub mod value;
pub mod write;
pub mod zone;

pub use container::{Array, Key, KeyOnFailure, List};
pub use error::{Error, Rejected, Result};
#[doc(hidden)]
pub use mac::__private;
pub use mac::IntoValue;
pub use read::{parse, parse_borrowed, parse_file, parse_with, Dialect, Reader};
pub use value::{Kind, Value};
pub use write::{print, save, stringify, stringify_inner, Writer};
pub use zone::Zone;
