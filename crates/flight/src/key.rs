use crate::error::KeyError;
use faststr::FastStr;
use std::fmt::{self, Debug, Display};
use std::hash::Hash;

/// Identity of one logical fetch.
///
/// Two calls that would produce the same result must produce equal keys.
/// `validate` runs before a key enters the cache; a degenerate key is
/// rejected instead of silently sharing a slot with other requests.
pub trait RequestKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {
    fn validate(&self) -> Result<(), KeyError> {
        Ok(())
    }
}

impl RequestKey for String {
    fn validate(&self) -> Result<(), KeyError> {
        non_empty(self)
    }
}

impl RequestKey for &'static str {
    fn validate(&self) -> Result<(), KeyError> {
        non_empty(self)
    }
}

impl RequestKey for FastStr {
    fn validate(&self) -> Result<(), KeyError> {
        non_empty(self)
    }
}

macro_rules! integer_keys {
    ($($ty:ty),* $(,)?) => {
        $(impl RequestKey for $ty {})*
    };
}

integer_keys!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl<A: RequestKey, B: RequestKey> RequestKey for (A, B) {
    fn validate(&self) -> Result<(), KeyError> {
        self.0.validate()?;
        self.1.validate()
    }
}

impl<A: RequestKey, B: RequestKey, C: RequestKey> RequestKey for (A, B, C) {
    fn validate(&self) -> Result<(), KeyError> {
        self.0.validate()?;
        self.1.validate()?;
        self.2.validate()
    }
}

fn non_empty(s: &str) -> Result<(), KeyError> {
    if s.trim().is_empty() {
        return Err(KeyError::new("empty key"));
    }
    Ok(())
}

/// One primitive component of a [`CompositeKey`].
///
/// Floats are stored as their bit pattern so the key stays `Eq + Hash`;
/// `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(FastStr),
    Int(i64),
    Uint(u64),
    Bool(bool),
    Float(u64),
}

impl KeyPart {
    fn check(&self) -> Result<(), KeyError> {
        match self {
            Self::Float(bits) if !f64::from_bits(*bits).is_finite() => {
                Err(KeyError::new("non-finite number in key"))
            }
            _ => Ok(()),
        }
    }
}

impl Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(FastStr::new(value))
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<FastStr> for KeyPart {
    fn from(value: FastStr) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        let value = if value == 0.0 { 0.0 } else { value };
        Self::Float(value.to_bits())
    }
}

impl From<f32> for KeyPart {
    fn from(value: f32) -> Self {
        Self::from(f64::from(value))
    }
}

macro_rules! signed_parts {
    ($($ty:ty),*) => {
        $(impl From<$ty> for KeyPart {
            fn from(value: $ty) -> Self {
                Self::Int(value as i64)
            }
        })*
    };
}

macro_rules! unsigned_parts {
    ($($ty:ty),*) => {
        $(impl From<$ty> for KeyPart {
            fn from(value: $ty) -> Self {
                Self::Uint(value as u64)
            }
        })*
    };
}

signed_parts!(i8, i16, i32, i64, isize);
unsigned_parts!(u8, u16, u32, u64, usize);

/// Structured key: a namespace plus ordered parts.
///
/// ```
/// use flight::CompositeKey;
///
/// let key = CompositeKey::builder("mold-order-detail")
///     .part(42u64)
///     .part(0u32)
///     .part(20u32)
///     .build()
///     .unwrap();
/// assert_eq!(key.to_string(), "mold-order-detail:42:0:20");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    namespace: FastStr,
    parts:     Vec<KeyPart>,
}

impl CompositeKey {
    pub fn builder(namespace: impl Into<FastStr>) -> CompositeKeyBuilder {
        CompositeKeyBuilder {
            namespace: namespace.into(),
            parts:     Vec::new(),
            error:     None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }
}

impl Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for part in &self.parts {
            write!(f, ":{part}")?;
        }
        Ok(())
    }
}

impl RequestKey for CompositeKey {}

/// Collects parts and reports the first problem at [`build`](Self::build).
#[derive(Debug)]
pub struct CompositeKeyBuilder {
    namespace: FastStr,
    parts:     Vec<KeyPart>,
    error:     Option<KeyError>,
}

impl CompositeKeyBuilder {
    pub fn part(mut self, part: impl Into<KeyPart>) -> Self {
        let part = part.into();
        if self.error.is_none() {
            if let Err(e) = part.check() {
                self.error = Some(e);
            }
        }
        self.parts.push(part);
        self
    }

    /// A part the caller may not have yet. `None` poisons the key.
    pub fn opt_part<P: Into<KeyPart>>(mut self, name: &str, part: Option<P>) -> Self {
        match part {
            Some(part) => self.part(part),
            None => {
                if self.error.is_none() {
                    self.error = Some(KeyError::new(format!("missing {name}")));
                }
                self
            }
        }
    }

    pub fn build(self) -> Result<CompositeKey, KeyError> {
        if self.namespace.trim().is_empty() {
            return Err(KeyError::new("empty namespace"));
        }
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(CompositeKey {
            namespace: self.namespace,
            parts:     self.parts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn detail_key(id: u64, page: u32, size: u32) -> CompositeKey {
        CompositeKey::builder("detail")
            .part(id)
            .part(page)
            .part(size)
            .build()
            .unwrap()
    }

    #[test]
    fn test_same_inputs_same_key() {
        assert_eq!(detail_key(42, 0, 20), detail_key(42, 0, 20));
        let set: HashSet<_> = [detail_key(42, 0, 20), detail_key(42, 0, 20)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_any_differing_part_changes_key() {
        let base = detail_key(42, 0, 20);
        assert_ne!(base, detail_key(43, 0, 20));
        assert_ne!(base, detail_key(42, 1, 20));
        assert_ne!(base, detail_key(42, 0, 50));
    }

    #[test]
    fn test_parts_do_not_collide_through_separators() {
        let a = CompositeKey::builder("ns").part("a:b").part("c").build().unwrap();
        let b = CompositeKey::builder("ns").part("a").part("b:c").build().unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn test_nan_rejected() {
        let err = CompositeKey::builder("price")
            .part(f64::NAN)
            .build()
            .unwrap_err();
        assert_eq!(err, KeyError::new("non-finite number in key"));
        assert!(
            CompositeKey::builder("price")
                .part(f64::INFINITY)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_negative_zero_folds() {
        let a = CompositeKey::builder("p").part(0.0f64).build().unwrap();
        let b = CompositeKey::builder("p").part(-0.0f64).build().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_part_rejected() {
        let err = CompositeKey::builder("detail")
            .opt_part("masterId", None::<u64>)
            .part(0u32)
            .build()
            .unwrap_err();
        assert_eq!(err, KeyError::new("missing masterId"));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        assert!(CompositeKey::builder("  ").part(1u8).build().is_err());
    }

    #[test]
    fn test_plain_keys_validate() {
        assert!("item-42-page-0".validate().is_ok());
        assert!(String::new().validate().is_err());
        assert!(FastStr::from_static_str(" ").validate().is_err());
        assert!(7u64.validate().is_ok());
        assert!((String::from("a"), 3u32).validate().is_ok());
        assert!((String::from("a"), String::new()).validate().is_err());
    }
}
