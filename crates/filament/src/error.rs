//! Error taxonomy: codes, conditions, and the categories that bind them.
//!
//! An error *code* is a concrete, source-specific outcome; an error
//! *condition* is a portable classification of codes. Both are `(category,
//! value)` pairs where the category is a process-stable identity supplying
//! the name, the message table, and the classification rules.
//!
//! Categories are `static` unit structs, so they are immortal by
//! construction: a code can never outlive the category it points at, no
//! matter what order thread teardown happens in.
//!
//! The [`define_error_code!`], [`define_error_condition!`], and
//! [`define_error_transformer!`] macros generate the enum (or raw-value
//! newtype), its category singleton, and the conversions in one declaration.

use std::fmt;

#[doc(hidden)]
pub use paste::paste as __paste;
#[doc(hidden)]
pub use thiserror::Error as __ThisError;

/// A process-stable identity giving meaning to integer error values.
///
/// Implementations are generated by the declaration macros and installed as
/// `static` singletons; identity comparison is by address.
pub trait Category: Send + Sync {
    /// Short, unique name of the category.
    fn name(&self) -> &str;

    /// Human-readable message for a value of this category.
    fn message(&self, value: i32) -> String;

    /// Maps a value of this category to its canonical condition.
    ///
    /// Values without a portable classification map to the identity
    /// condition `(self, value)`.
    fn default_condition(&'static self, value: i32) -> Condition;

    /// Classifies a foreign `code` as equivalent to `value` of this
    /// category. Categories without an equivalence rule match nothing.
    fn equivalent(&self, _code: Code, _value: i32) -> bool {
        false
    }
}

fn same_category(a: &'static dyn Category, b: &'static dyn Category) -> bool {
    // Identity comparison: categories are static singletons, so the data
    // address alone distinguishes them (vtable pointers may be duplicated
    // across codegen units).
    std::ptr::eq(
        a as *const dyn Category as *const (),
        b as *const dyn Category as *const (),
    )
}

/// A concrete error outcome: an integer value bound to its category.
#[derive(Clone, Copy)]
pub struct Code {
    value: i32,
    category: &'static dyn Category,
}

impl Code {
    pub fn new(category: &'static dyn Category, value: i32) -> Self {
        Self { value, category }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn category(&self) -> &'static dyn Category {
        self.category
    }

    /// The message the category assigns to this value.
    pub fn message(&self) -> String {
        self.category.message(self.value)
    }

    /// The canonical condition this code classifies to.
    pub fn condition(&self) -> Condition {
        self.category.default_condition(self.value)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.category.name(), self.value, self.message())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for Code {}

impl PartialEq for Code {
    fn eq(&self, other: &Self) -> bool {
        same_category(self.category, other.category) && self.value == other.value
    }
}

impl Eq for Code {}

/// A portable classification of error codes.
#[derive(Clone, Copy)]
pub struct Condition {
    value: i32,
    category: &'static dyn Category,
}

impl Condition {
    pub fn new(category: &'static dyn Category, value: i32) -> Self {
        Self { value, category }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn category(&self) -> &'static dyn Category {
        self.category
    }

    pub fn message(&self) -> String {
        self.category.message(self.value)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.category.name(), self.value, self.message())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        same_category(self.category, other.category) && self.value == other.value
    }
}

impl Eq for Condition {}

impl PartialEq<Condition> for Code {
    /// A code matches a condition when either its own category maps it
    /// there, or the condition's category claims the code as equivalent.
    fn eq(&self, condition: &Condition) -> bool {
        self.condition() == *condition
            || condition.category.equivalent(*self, condition.value)
    }
}

impl PartialEq<Code> for Condition {
    fn eq(&self, code: &Code) -> bool {
        *code == *self
    }
}

/// Enumerated error codes generated by [`define_error_code!`].
pub trait ErrorCodeEnum: Copy {
    fn category() -> &'static dyn Category;
    fn value(self) -> i32;
}

/// Enumerated error conditions generated by [`define_error_condition!`].
pub trait ErrorConditionEnum: Copy {
    fn category() -> &'static dyn Category;
    fn value(self) -> i32;
}

/// Declares an enumerated error code with its category singleton.
///
/// Each variant carries a message; a trailing `[condition]` maps the variant
/// to a canonical [`Condition`] (variants without one classify to
/// themselves). Generates the enum (with `thiserror` messages), a
/// `<Name>Category` singleton, `From<Name> for Code`, and direct equality
/// against [`Condition`].
///
/// ```
/// use filament_rs::error::Errc;
/// filament_rs::define_error_code! {
///     /// Outcome of a parse attempt.
///     pub enum ParseError("doc::parse") {
///         Truncated = 1 => "input ended mid-record" [Errc::WouldBlock],
///         Malformed = 2 => "input is not a record",
///     }
/// }
/// use filament_rs::error::Condition;
/// assert_eq!(ParseError::Truncated, Condition::from(Errc::WouldBlock));
/// ```
#[macro_export]
macro_rules! define_error_code {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($category:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $message:literal $([$condition:expr])?
            ),+ $(,)?
        }
    ) => {
        $crate::error::__paste! {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, $crate::error::__ThisError)]
            $vis enum $name {
                $(
                    $(#[$vmeta])*
                    #[error($message)]
                    $variant = $value,
                )+
            }

            #[doc = concat!("Category singleton type for [`", stringify!($name), "`].")]
            #[derive(Debug)]
            $vis struct [<$name Category>];

            #[doc = concat!("Stable identity for [`", stringify!($name), "`] codes.")]
            $vis static [<$name:snake:upper _CATEGORY>]: [<$name Category>] = [<$name Category>];

            impl $crate::error::Category for [<$name Category>] {
                fn name(&self) -> &str {
                    $category
                }

                fn message(&self, value: i32) -> String {
                    match value {
                        $( $value => $message.to_string(), )+
                        _ => "unknown".to_string(),
                    }
                }

                fn default_condition(&'static self, value: i32) -> $crate::error::Condition {
                    match value {
                        $( $value => $crate::__variant_condition!(self, value $(, $condition)?), )+
                        _ => $crate::error::Condition::new(self, value),
                    }
                }
            }

            impl $crate::error::ErrorCodeEnum for $name {
                fn category() -> &'static dyn $crate::error::Category {
                    &[<$name:snake:upper _CATEGORY>]
                }

                fn value(self) -> i32 {
                    self as i32
                }
            }

            impl From<$name> for $crate::error::Code {
                fn from(code: $name) -> Self {
                    $crate::error::Code::new(
                        <$name as $crate::error::ErrorCodeEnum>::category(),
                        code as i32,
                    )
                }
            }

            impl PartialEq<$crate::error::Condition> for $name {
                fn eq(&self, condition: &$crate::error::Condition) -> bool {
                    $crate::error::Code::from(*self) == *condition
                }
            }

            impl PartialEq<$name> for $crate::error::Condition {
                fn eq(&self, code: &$name) -> bool {
                    $crate::error::Code::from(*code) == *self
                }
            }
        }
    };
}

/// Declares an enumerated error condition with its category singleton.
///
/// A trailing `[predicate]` per variant installs an equivalence classifier:
/// a `fn(Code) -> bool` deciding whether a foreign code belongs to that
/// condition. Variants without one match only codes that map to them via
/// `default_condition`.
#[macro_export]
macro_rules! define_error_condition {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($category:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => $message:literal $([$predicate:expr])?
            ),+ $(,)?
        }
    ) => {
        $crate::error::__paste! {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, $crate::error::__ThisError)]
            $vis enum $name {
                $(
                    $(#[$vmeta])*
                    #[error($message)]
                    $variant = $value,
                )+
            }

            #[doc = concat!("Category singleton type for [`", stringify!($name), "`].")]
            #[derive(Debug)]
            $vis struct [<$name Category>];

            #[doc = concat!("Stable identity for [`", stringify!($name), "`] conditions.")]
            $vis static [<$name:snake:upper _CATEGORY>]: [<$name Category>] = [<$name Category>];

            impl $crate::error::Category for [<$name Category>] {
                fn name(&self) -> &str {
                    $category
                }

                fn message(&self, value: i32) -> String {
                    match value {
                        $( $value => $message.to_string(), )+
                        _ => "unknown".to_string(),
                    }
                }

                fn default_condition(&'static self, value: i32) -> $crate::error::Condition {
                    $crate::error::Condition::new(self, value)
                }

                fn equivalent(&self, _code: $crate::error::Code, value: i32) -> bool {
                    match value {
                        $( $value => $crate::__variant_equivalent!(_code $(, $predicate)?), )+
                        _ => false,
                    }
                }
            }

            impl $crate::error::ErrorConditionEnum for $name {
                fn category() -> &'static dyn $crate::error::Category {
                    &[<$name:snake:upper _CATEGORY>]
                }

                fn value(self) -> i32 {
                    self as i32
                }
            }

            impl From<$name> for $crate::error::Condition {
                fn from(condition: $name) -> Self {
                    $crate::error::Condition::new(
                        <$name as $crate::error::ErrorConditionEnum>::category(),
                        condition as i32,
                    )
                }
            }

            impl PartialEq<$crate::error::Code> for $name {
                fn eq(&self, code: &$crate::error::Code) -> bool {
                    *code == $crate::error::Condition::from(*self)
                }
            }

            impl PartialEq<$name> for $crate::error::Code {
                fn eq(&self, condition: &$name) -> bool {
                    *self == $crate::error::Condition::from(*condition)
                }
            }
        }
    };
}

/// Declares an open-ended error code carrying raw integer values, for
/// adapting externally-numbered errors (OS errno, wire status words).
///
/// Takes a stringifier `fn(i32) -> String` and, optionally, a classifier
/// `fn(i32) -> Option<Condition>` applied by `default_condition`.
#[macro_export]
macro_rules! define_error_transformer {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($category:literal, $stringify:expr $(, $classify:expr)? );
    ) => {
        $crate::error::__paste! {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            $vis struct $name(pub i32);

            #[doc = concat!("Category singleton type for [`", stringify!($name), "`].")]
            #[derive(Debug)]
            $vis struct [<$name Category>];

            #[doc = concat!("Stable identity for [`", stringify!($name), "`] codes.")]
            $vis static [<$name:snake:upper _CATEGORY>]: [<$name Category>] = [<$name Category>];

            impl $crate::error::Category for [<$name Category>] {
                fn name(&self) -> &str {
                    $category
                }

                fn message(&self, value: i32) -> String {
                    ($stringify)(value)
                }

                fn default_condition(&'static self, value: i32) -> $crate::error::Condition {
                    $crate::__transformer_condition!(self, value $(, $classify)?)
                }
            }

            impl $crate::error::ErrorCodeEnum for $name {
                fn category() -> &'static dyn $crate::error::Category {
                    &[<$name:snake:upper _CATEGORY>]
                }

                fn value(self) -> i32 {
                    self.0
                }
            }

            impl From<$name> for $crate::error::Code {
                fn from(code: $name) -> Self {
                    $crate::error::Code::new(
                        <$name as $crate::error::ErrorCodeEnum>::category(),
                        code.0,
                    )
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", ($stringify)(self.0))
                }
            }

            impl std::error::Error for $name {}

            impl PartialEq<$crate::error::Condition> for $name {
                fn eq(&self, condition: &$crate::error::Condition) -> bool {
                    $crate::error::Code::from(*self) == *condition
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __variant_condition {
    ($category:expr, $value:expr, $condition:expr) => {
        $crate::error::Condition::from($condition)
    };
    ($category:expr, $value:expr) => {
        $crate::error::Condition::new($category, $value)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __variant_equivalent {
    ($code:expr, $predicate:expr) => {
        ($predicate)($code)
    };
    ($code:expr) => {
        false
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __transformer_condition {
    ($category:expr, $value:expr, $classify:expr) => {
        match ($classify)($value) {
            Some(condition) => condition,
            None => $crate::error::Condition::new($category, $value),
        }
    };
    ($category:expr, $value:expr) => {
        $crate::error::Condition::new($category, $value)
    };
}

define_error_condition! {
    /// Portable classifications shared across the crate's error codes,
    /// mirroring the generic `errc`-style vocabulary the codes map into.
    pub enum Errc("filament::generic") {
        WouldBlock = 1 => "operation would block",
        TimedOut = 2 => "operation timed out",
        OperationCanceled = 3 => "operation canceled",
        NotSupported = 4 => "operation not supported",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_error_code! {
        enum ProbeError("filament::test::probe") {
            Saturated = 1 => "probe is saturated" [Errc::WouldBlock],
            Detached = 2 => "probe is detached",
        }
    }

    define_error_code! {
        enum LinkError("filament::test::link") {
            Severed = 1 => "link is severed",
        }
    }

    define_error_condition! {
        enum FabricError("filament::test::fabric") {
            Unreachable = 1 => "fabric unreachable" [|code: Code| {
                code == Code::from(ProbeError::Detached)
                    || code == Code::from(LinkError::Severed)
            }],
        }
    }

    define_error_transformer! {
        struct RawStatus("filament::test::raw", |value: i32| format!("raw status {value}"), |value: i32| {
            (value == 11).then(|| Condition::from(Errc::WouldBlock))
        });
    }

    #[test]
    fn code_equality_requires_same_category_and_value() {
        assert_eq!(Code::from(ProbeError::Saturated), Code::from(ProbeError::Saturated));
        assert_ne!(Code::from(ProbeError::Saturated), Code::from(ProbeError::Detached));
        // Same value, different category.
        assert_ne!(Code::from(ProbeError::Saturated), Code::from(LinkError::Severed));
    }

    #[test]
    fn default_condition_maps_to_declared_condition() {
        assert_eq!(ProbeError::Saturated, Condition::from(Errc::WouldBlock));
        // Errc::TimedOut shares the value but not the mapping.
        assert_ne!(ProbeError::Saturated, Condition::from(Errc::TimedOut));
    }

    #[test]
    fn identity_condition_is_reflexive() {
        // A variant without an explicit mapping classifies to itself.
        let code = Code::from(ProbeError::Detached);
        assert_eq!(code, code.condition());
    }

    #[test]
    fn equivalence_predicate_classifies_foreign_codes() {
        assert_eq!(ProbeError::Detached, Condition::from(FabricError::Unreachable));
        assert_eq!(LinkError::Severed, Condition::from(FabricError::Unreachable));
        assert_ne!(ProbeError::Saturated, Condition::from(FabricError::Unreachable));
    }

    #[test]
    fn messages_come_from_the_category() {
        let code = Code::from(ProbeError::Saturated);
        assert_eq!(code.message(), "probe is saturated");
        assert_eq!(code.to_string(), "probe is saturated");
        assert_eq!(code.category().name(), "filament::test::probe");
        assert_eq!(code.category().message(99), "unknown");
    }

    #[test]
    fn transformer_carries_raw_values() {
        let wouldblock = RawStatus(11);
        let other = RawStatus(7);

        assert_eq!(wouldblock.to_string(), "raw status 11");
        assert_eq!(wouldblock, Condition::from(Errc::WouldBlock));
        // Unclassified values fall back to the identity condition.
        let code = Code::from(other);
        assert_eq!(code, code.condition());
        assert_ne!(other, Condition::from(Errc::WouldBlock));
    }

    #[test]
    fn thiserror_display_matches_category_message() {
        assert_eq!(ProbeError::Detached.to_string(), "probe is detached");
        assert_eq!(
            ProbeError::Detached.to_string(),
            Code::from(ProbeError::Detached).message()
        );
    }
}
