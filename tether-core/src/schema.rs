//! Schema descriptions for request and response types.
//!
//! Types advertise their shape through [`Schema`], usually via
//! `#[derive(Schema)]`. Expansion stops at [`MAX_DEPTH`] so self-referential
//! or deeply nested types produce a finite tree.

use std::collections::{BTreeMap, HashMap};

use crate::registry::Value;

/// Depth at which schema expansion stops.
pub const MAX_DEPTH: usize = 3;

/// A type that can describe its own shape as a [`Value`] tree.
pub trait Schema {
    /// Name rendered in the `type` field.
    fn type_name() -> String;

    /// Child values for struct-like types. `depth` is this type's own depth.
    fn fields(depth: usize) -> Vec<Value> {
        let _ = depth;
        Vec::new()
    }

    /// Describe this type at `depth`, or `None` once the cap is reached.
    fn value(depth: usize) -> Option<Value> {
        if depth >= MAX_DEPTH {
            return None;
        }
        let type_name = Self::type_name();
        Some(Value {
            name: type_name.clone(),
            type_name,
            values: Self::fields(depth),
        })
    }
}

/// Push the field `name` of type `T` onto `values` if it is within the cap.
///
/// Used by the derive: `depth` is the depth of the containing struct.
pub fn push_field<T: Schema + ?Sized>(values: &mut Vec<Value>, name: &str, depth: usize) {
    if let Some(value) = T::value(depth + 1) {
        values.push(value.renamed(name));
    }
}

macro_rules! leaf_schema {
    ($($ty:ty => $name:expr),* $(,)?) => {
        $(
            impl Schema for $ty {
                fn type_name() -> String {
                    $name.to_string()
                }
            }
        )*
    };
}

leaf_schema! {
    bool => "bool",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "usize",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    isize => "isize",
    f32 => "f32",
    f64 => "f64",
    char => "char",
    String => "string",
    str => "string",
    () => "()",
}

impl<T: Schema> Schema for Vec<T> {
    fn type_name() -> String {
        format!("[]{}", T::type_name())
    }
}

impl<T: Schema> Schema for [T] {
    fn type_name() -> String {
        format!("[]{}", T::type_name())
    }
}

impl<T: Schema, const N: usize> Schema for [T; N] {
    fn type_name() -> String {
        format!("[{N}]{}", T::type_name())
    }
}

impl<K: Schema, V: Schema, S> Schema for HashMap<K, V, S> {
    fn type_name() -> String {
        format!("map[{}]{}", K::type_name(), V::type_name())
    }
}

impl<K: Schema, V: Schema> Schema for BTreeMap<K, V> {
    fn type_name() -> String {
        format!("map[{}]{}", K::type_name(), V::type_name())
    }
}

// Indirections describe their target.
macro_rules! transparent_schema {
    ($($wrapper:ident),*) => {
        $(
            impl<T: Schema + ?Sized> Schema for $wrapper<T> {
                fn type_name() -> String {
                    T::type_name()
                }

                fn fields(depth: usize) -> Vec<Value> {
                    T::fields(depth)
                }
            }
        )*
    };
}

use std::rc::Rc;
use std::sync::Arc;
transparent_schema!(Box, Arc, Rc);

impl<T: Schema> Schema for Option<T> {
    fn type_name() -> String {
        T::type_name()
    }

    fn fields(depth: usize) -> Vec<Value> {
        T::fields(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inner;

    impl Schema for Inner {
        fn type_name() -> String {
            "Inner".into()
        }

        fn fields(depth: usize) -> Vec<Value> {
            let mut values = Vec::new();
            push_field::<u32>(&mut values, "count", depth);
            values
        }
    }

    struct Outer;

    impl Schema for Outer {
        fn type_name() -> String {
            "Outer".into()
        }

        fn fields(depth: usize) -> Vec<Value> {
            let mut values = Vec::new();
            push_field::<String>(&mut values, "name", depth);
            push_field::<Vec<Inner>>(&mut values, "items", depth);
            push_field::<Inner>(&mut values, "inner", depth);
            values
        }
    }

    /// Refers to itself; must terminate.
    struct Tree;

    impl Schema for Tree {
        fn type_name() -> String {
            "Tree".into()
        }

        fn fields(depth: usize) -> Vec<Value> {
            let mut values = Vec::new();
            push_field::<Vec<Tree>>(&mut values, "children", depth);
            push_field::<Tree>(&mut values, "parent", depth);
            values
        }
    }

    #[test]
    fn test_sequence_type_name() {
        assert_eq!(<Vec<String>>::type_name(), "[]string");
        assert_eq!(<Vec<Inner>>::type_name(), "[]Inner");
        assert_eq!(<HashMap<String, u64>>::type_name(), "map[string]u64");
    }

    #[test]
    fn test_struct_fields_are_renamed() {
        let value = Outer::value(0).unwrap();
        assert_eq!(value.name, "Outer");
        assert_eq!(value.type_name, "Outer");
        let names: Vec<_> = value.values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["name", "items", "inner"]);
        assert_eq!(value.values[1].type_name, "[]Inner");
        assert_eq!(value.values[2].values[0].name, "count");
    }

    #[test]
    fn test_depth_cap() {
        let root = Tree::value(0).unwrap();
        let parent = &root.values[1];
        assert_eq!(parent.name, "parent");
        let grandparent = &parent.values[1];
        assert_eq!(grandparent.name, "parent");
        // depth 3 is never expanded
        assert!(grandparent.values.is_empty());
        assert!(Tree::value(MAX_DEPTH).is_none());
    }

    #[test]
    fn test_option_and_box_are_transparent() {
        assert_eq!(<Option<Inner>>::value(0), Inner::value(0));
        assert_eq!(<Box<Inner>>::value(0), Inner::value(0));
    }
}
