//! Size Estimation Module
//!
//! Approximate in-memory footprint of cached values: primitives cost a fixed
//! amount, strings two bytes per character, containers the sum of their
//! children.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use crate::error::VerificationResult;

const BOOL_SIZE: u64 = 4;
const NUMBER_SIZE: u64 = 8;
const CHAR_SIZE: u64 = 2;

/// Approximate byte size of a value, used against the cache byte budget.
pub trait SizeEstimate {
    /// Returns the estimated size in bytes.
    fn estimated_size(&self) -> u64;
}

impl SizeEstimate for () {
    fn estimated_size(&self) -> u64 {
        0
    }
}

impl SizeEstimate for bool {
    fn estimated_size(&self) -> u64 {
        BOOL_SIZE
    }
}

macro_rules! number_size {
    ($($ty:ty),*) => {
        $(impl SizeEstimate for $ty {
            fn estimated_size(&self) -> u64 {
                NUMBER_SIZE
            }
        })*
    };
}

number_size!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl SizeEstimate for char {
    fn estimated_size(&self) -> u64 {
        CHAR_SIZE
    }
}

impl SizeEstimate for str {
    fn estimated_size(&self) -> u64 {
        self.chars().count() as u64 * CHAR_SIZE
    }
}

impl SizeEstimate for String {
    fn estimated_size(&self) -> u64 {
        self.as_str().estimated_size()
    }
}

impl<T: SizeEstimate> SizeEstimate for [T] {
    fn estimated_size(&self) -> u64 {
        self.iter().map(SizeEstimate::estimated_size).sum()
    }
}

impl<T: SizeEstimate> SizeEstimate for Vec<T> {
    fn estimated_size(&self) -> u64 {
        self.as_slice().estimated_size()
    }
}

impl<T: SizeEstimate> SizeEstimate for VecDeque<T> {
    fn estimated_size(&self) -> u64 {
        self.iter().map(SizeEstimate::estimated_size).sum()
    }
}

impl<T: SizeEstimate> SizeEstimate for Option<T> {
    fn estimated_size(&self) -> u64 {
        self.as_ref().map_or(0, SizeEstimate::estimated_size)
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for &T {
    fn estimated_size(&self) -> u64 {
        (**self).estimated_size()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Box<T> {
    fn estimated_size(&self) -> u64 {
        (**self).estimated_size()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Arc<T> {
    fn estimated_size(&self) -> u64 {
        (**self).estimated_size()
    }
}

impl<A: SizeEstimate, B: SizeEstimate> SizeEstimate for (A, B) {
    fn estimated_size(&self) -> u64 {
        self.0.estimated_size() + self.1.estimated_size()
    }
}

impl<K: SizeEstimate, V: SizeEstimate, S> SizeEstimate for HashMap<K, V, S> {
    fn estimated_size(&self) -> u64 {
        self.iter()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

impl<K: SizeEstimate, V: SizeEstimate> SizeEstimate for BTreeMap<K, V> {
    fn estimated_size(&self) -> u64 {
        self.iter()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

impl SizeEstimate for Value {
    fn estimated_size(&self) -> u64 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => BOOL_SIZE,
            Value::Number(_) => NUMBER_SIZE,
            Value::String(text) => text.estimated_size(),
            Value::Array(items) => items.iter().map(SizeEstimate::estimated_size).sum(),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| k.estimated_size() + v.estimated_size())
                .sum(),
        }
    }
}

impl SizeEstimate for VerificationResult {
    fn estimated_size(&self) -> u64 {
        BOOL_SIZE + self.reason.map_or(0, |_| NUMBER_SIZE) + self.message.estimated_size()
    }
}
