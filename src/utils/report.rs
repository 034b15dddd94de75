use ahash::AHashMap;
use serde::{Serialize, Serializer, ser::SerializeMap};
use std::{
    fmt,
    ops::{Index, IndexMut},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reportable {
    Float(f64),
    Int(i64),
}

macro_rules! reportable_from_primitive {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Reportable {
                fn from(val: $t) -> Self {
                    Reportable::Int(val as i64)
                }
            }
        )*
    };
}

reportable_from_primitive!(usize, u8, u16, u32, u64, isize, i8, i16, i32, i64);

impl From<f64> for Reportable {
    fn from(val: f64) -> Self {
        Reportable::Float(val)
    }
}

impl From<f32> for Reportable {
    fn from(val: f32) -> Self {
        Reportable::Float(val as f64)
    }
}

impl Default for Reportable {
    fn default() -> Self {
        Reportable::Float(0.0)
    }
}

impl Reportable {
    /// The scalar handed to metric sinks
    pub fn value(&self) -> f64 {
        match self {
            Reportable::Float(val) => *val,
            Reportable::Int(val) => *val as f64,
        }
    }
}

impl Serialize for Reportable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reportable::Float(val) => serializer.serialize_f64(*val),
            Reportable::Int(val) => serializer.serialize_i64(*val),
        }
    }
}

/// Metric name to scalar mapping, produced once per training step.
#[derive(Clone, Debug, Default)]
pub struct Report {
    data: AHashMap<String, Reportable>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}Step report{}", "-".repeat(25), "-".repeat(25))?;
        for (key, val) in self.sorted() {
            match val {
                Reportable::Float(val) => writeln!(f, "\t{key}: {val}")?,
                Reportable::Int(val) => writeln!(f, "\t{key}: {val}")?,
            }
        }
        Ok(())
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.data.len()))?;
        for (key, val) in self.sorted() {
            map.serialize_entry(key, val)?;
        }
        map.end()
    }
}

impl Report {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.data.get(key).map(Reportable::value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries ordered by key, so sinks see a stable layout
    pub fn sorted(&self) -> Vec<(&str, &Reportable)> {
        let mut items: Vec<_> = self.data.iter().map(|(k, v)| (k.as_str(), v)).collect();
        items.sort_unstable_by(|a, b| a.0.cmp(b.0));
        items
    }
}

impl Index<&str> for Report {
    type Output = Reportable;

    fn index(&self, key: &str) -> &Self::Output {
        &self.data[key]
    }
}

impl IndexMut<&str> for Report {
    fn index_mut(&mut self, key: &str) -> &mut Self::Output {
        self.data.entry(key.to_string()).or_default()
    }
}
