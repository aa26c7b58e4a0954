use crate::container::{Array, List};
use crate::error::Result;
use crate::zone::Zone;
use core::fmt;
use core::mem;

/// A JSON node.
///
/// `Array` is a JSON object (keyed, insertion ordered) and `List` a JSON
/// array. Strings are bytes: `OwnedString` owns them, `StringReference`
/// borrows them from the caller for `'a` and never copies or frees them.
pub enum Value<'a> {
    Null,
    Boolean(bool),
    Number(f64),
    OwnedString(Box<[u8]>),
    StringReference(&'a [u8]),
    Array(Array<'a>),
    List(List<'a>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Null,
    Boolean,
    Number,
    OwnedString,
    StringReference,
    Array,
    List,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::OwnedString => "string",
            Kind::StringReference => "string reference",
            Kind::Array => "array",
            Kind::List => "list",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Initialisation: the caller provides the storage for the node itself, only
// internal buffers are charged.
impl<'a> Value<'a> {
    /// Bytes charged for the shell of a created node.
    pub const NODE_SIZE: usize = mem::size_of::<Value<'static>>();

    pub const fn null() -> Self {
        Self::Null
    }
    pub const fn boolean(b: bool) -> Self {
        Self::Boolean(b)
    }
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Adopts `bytes` as the string's buffer. The zone is charged for it
    /// now; if it refuses, the buffer is dropped.
    pub fn string(zone: &Zone, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        tri!(zone.allocate(bytes.len()));
        Ok(Self::OwnedString(bytes.into_boxed_slice()))
    }

    /// Duplicates `bytes` into a new owned string.
    pub fn string_copy(zone: &Zone, bytes: &(impl AsRef<[u8]> + ?Sized)) -> Result<Self> {
        let bytes = bytes.as_ref();
        tri!(zone.allocate(bytes.len()));
        Ok(Self::OwnedString(bytes.into()))
    }

    /// Borrows `bytes`. Nothing is copied or charged.
    pub fn string_ref(bytes: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self::StringReference(bytes.as_ref())
    }

    pub fn list() -> Self {
        Self::List(List::new())
    }
    pub fn list_with_capacity(zone: &Zone, slots: usize) -> Result<Self> {
        List::with_capacity(zone, slots).map(Self::List)
    }
    pub fn array() -> Self {
        Self::Array(Array::new())
    }
    pub fn array_with_capacity(zone: &Zone, slots: usize) -> Result<Self> {
        Array::with_capacity(zone, slots).map(Self::Array)
    }
}

// Creation: the node itself is charged to the zone as well.
impl<'a> Value<'a> {
    /// Boxes `value` as a created node. If the zone refuses the shell,
    /// `value` is destroyed so none of its buffers stay charged.
    pub fn create(zone: &Zone, mut value: Value<'a>) -> Result<Box<Self>> {
        if let Err(e) = zone.allocate(Self::NODE_SIZE) {
            value.destroy(zone);
            return Err(e);
        }
        Ok(Box::new(value))
    }

    pub fn create_null(zone: &Zone) -> Result<Box<Self>> {
        Self::create(zone, Self::Null)
    }
    pub fn create_boolean(zone: &Zone, b: bool) -> Result<Box<Self>> {
        Self::create(zone, Self::Boolean(b))
    }
    pub fn create_number(zone: &Zone, n: f64) -> Result<Box<Self>> {
        Self::create(zone, Self::Number(n))
    }
    pub fn create_string(zone: &Zone, bytes: impl Into<Vec<u8>>) -> Result<Box<Self>> {
        let s = tri!(Self::string(zone, bytes));
        Self::create(zone, s)
    }
    pub fn create_string_copy(zone: &Zone, bytes: &(impl AsRef<[u8]> + ?Sized)) -> Result<Box<Self>> {
        let s = tri!(Self::string_copy(zone, bytes));
        Self::create(zone, s)
    }
    pub fn create_string_ref(zone: &Zone, bytes: &'a (impl AsRef<[u8]> + ?Sized)) -> Result<Box<Self>> {
        Self::create(zone, Self::string_ref(bytes))
    }
    pub fn create_list(zone: &Zone) -> Result<Box<Self>> {
        Self::create(zone, Self::list())
    }
    pub fn create_list_with_capacity(zone: &Zone, slots: usize) -> Result<Box<Self>> {
        let l = tri!(Self::list_with_capacity(zone, slots));
        Self::create(zone, l)
    }
    pub fn create_array(zone: &Zone) -> Result<Box<Self>> {
        Self::create(zone, Self::array())
    }
    pub fn create_array_with_capacity(zone: &Zone, slots: usize) -> Result<Box<Self>> {
        let a = tri!(Self::array_with_capacity(zone, slots));
        Self::create(zone, a)
    }
}

// Teardown.
impl<'a> Value<'a> {
    /// Releases everything this node owns and leaves `Null` behind. The
    /// storage of the node itself stays with the caller.
    ///
    /// Walks the tree with an explicit stack, children in stored order.
    /// Referenced bytes are never touched.
    pub fn destroy(&mut self, zone: &Zone) {
        let mut stack = vec![mem::take(self)];
        while let Some(node) = stack.pop() {
            match node {
                Value::OwnedString(s) => zone.release(s.len()),
                Value::List(list) => {
                    zone.release(list.buffer_bytes());
                    stack.extend(list.items.into_iter().rev());
                }
                Value::Array(array) => {
                    zone.release(array.buffer_bytes());
                    for (key, value) in array.entries.into_iter().rev() {
                        zone.release(key.len());
                        stack.push(value);
                    }
                }
                Value::Null | Value::Boolean(_) | Value::Number(_) | Value::StringReference(_) => {}
            }
        }
    }

    /// Destroys a created node and releases its shell.
    pub fn free(mut self: Box<Self>, zone: &Zone) {
        self.destroy(zone);
        zone.release(Self::NODE_SIZE);
    }

    /// Unboxes a created node, releasing the shell but keeping the content.
    pub fn into_inner(self: Box<Self>, zone: &Zone) -> Value<'a> {
        zone.release(Self::NODE_SIZE);
        *self
    }
}

impl<'a> Value<'a> {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Boolean(_) => Kind::Boolean,
            Self::Number(_) => Kind::Number,
            Self::OwnedString(_) => Kind::OwnedString,
            Self::StringReference(_) => Kind::StringReference,
            Self::Array(_) => Kind::Array,
            Self::List(_) => Kind::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }
    /// True for both owned strings and string references.
    pub fn is_string(&self) -> bool {
        matches!(self, Self::OwnedString(_) | Self::StringReference(_))
    }
    pub fn is_owned_string(&self) -> bool {
        matches!(self, Self::OwnedString(_))
    }
    pub fn is_string_ref(&self) -> bool {
        matches!(self, Self::StringReference(_))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        opt_extract!(self, Self::Boolean(b) => Some(*b))
    }
    pub fn as_f64(&self) -> Option<f64> {
        opt_extract!(self, Self::Number(n) => Some(*n))
    }
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::OwnedString(s) => Some(&**s),
            Self::StringReference(s) => Some(*s),
            _ => None,
        }
    }
    /// The string content, if this is a string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| core::str::from_utf8(b).ok())
    }
    pub fn as_array(&self) -> Option<&Array<'a>> {
        opt_extract!(self, Self::Array(a) => Some(a))
    }
    pub fn as_list(&self) -> Option<&List<'a>> {
        opt_extract!(self, Self::List(l) => Some(l))
    }
    pub fn as_array_mut(&mut self) -> Option<&mut Array<'a>> {
        opt_extract!(self, Self::Array(a) => Some(a))
    }
    pub fn as_list_mut(&mut self) -> Option<&mut List<'a>> {
        opt_extract!(self, Self::List(l) => Some(l))
    }

    /// First value under `key` if this is an `Array`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&Value<'a>> {
        self.as_array().and_then(|a| a.get(key))
    }
    /// Element `i` if this is a `List`.
    pub fn at(&self, i: usize) -> Option<&Value<'a>> {
        self.as_list().and_then(|l| l.get(i))
    }
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut Value<'a>> {
        self.as_array_mut().and_then(|a| a.get_mut(key))
    }
    pub fn at_mut(&mut self, i: usize) -> Option<&mut Value<'a>> {
        self.as_list_mut().and_then(|l| l.get_mut(i))
    }

    /// Moves the content out, leaving `Null`. Ownership moves with it.
    pub fn take(&mut self) -> Value<'a> {
        mem::replace(self, Self::Null)
    }
}

static NULL: Value<'static> = Value::Null;

impl<'a> core::ops::Index<usize> for Value<'a> {
    type Output = Value<'a>;
    fn index(&self, i: usize) -> &Value<'a> {
        self.at(i).unwrap_or(&NULL)
    }
}
impl<'a> core::ops::Index<&str> for Value<'a> {
    type Output = Value<'a>;
    fn index(&self, key: &str) -> &Value<'a> {
        self.get(key).unwrap_or(&NULL)
    }
}

impl Default for Value<'_> {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::OwnedString(s) => f
                .debug_tuple("OwnedString")
                .field(&String::from_utf8_lossy(s))
                .finish(),
            Self::StringReference(s) => f
                .debug_tuple("StringReference")
                .field(&String::from_utf8_lossy(s))
                .finish(),
            Self::Array(a) => f
                .debug_map()
                .entries(a.iter().map(|(k, v)| (String::from_utf8_lossy(k), v)))
                .finish(),
            Self::List(l) => f.debug_list().entries(l.iter()).finish(),
        }
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Self::StringReference(s.as_bytes())
    }
}
impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(s: &'a [u8]) -> Self {
        Self::StringReference(s)
    }
}

macro_rules! impl_into_num {
    ($($t:ident),*) => {$(
        impl From<$t> for Value<'_> {
            fn from(t: $t) -> Self { Value::Number(t as f64) }
        }
    )*};
}

impl_into_num!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
