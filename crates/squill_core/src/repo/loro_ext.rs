//! Small typed-read extensions over Loro containers.

use loro::{Container, LoroList, LoroMap, ValueOrContainer};

/// Typed field reads on a Loro map, unwrapping the plain-value variant.
pub(crate) trait MapValueExt {
    fn get_str_field(&self, key: &str) -> Option<String>;
    fn get_i64_field(&self, key: &str) -> Option<i64>;
    fn get_bool_field(&self, key: &str) -> Option<bool>;
    fn get_child_map(&self, key: &str) -> Option<LoroMap>;
    /// Reads a text field stored either as a text container or as a plain
    /// last-writer-wins string (older documents).
    fn get_text_field(&self, key: &str) -> Option<String>;
    fn key_list(&self) -> Vec<String>;
}

impl MapValueExt for LoroMap {
    fn get_str_field(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| match v {
            ValueOrContainer::Value(val) => val.as_string().map(|s| s.to_string()),
            _ => None,
        })
    }

    fn get_i64_field(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| match v {
            ValueOrContainer::Value(val) => val.as_i64().copied(),
            _ => None,
        })
    }

    fn get_bool_field(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| match v {
            ValueOrContainer::Value(val) => val.as_bool().copied(),
            _ => None,
        })
    }

    fn get_child_map(&self, key: &str) -> Option<LoroMap> {
        match self.get(key) {
            Some(ValueOrContainer::Container(Container::Map(map))) => Some(map),
            _ => None,
        }
    }

    fn get_text_field(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(ValueOrContainer::Container(Container::Text(text))) => Some(text.to_string()),
            Some(ValueOrContainer::Value(val)) => val.as_string().map(|s| s.to_string()),
            _ => None,
        }
    }

    fn key_list(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.for_each(|k, _| keys.push(k.to_string()));
        keys
    }
}

/// Reads over the order sequence, which is a list of string cell ids.
pub(crate) trait IdListExt {
    /// Every entry in position order; `None` marks a non-string entry.
    fn raw_entries(&self) -> Vec<Option<String>>;
    /// Positions at which `id` occurs.
    fn positions_of(&self, id: &str) -> Vec<usize>;
}

impl IdListExt for LoroList {
    fn raw_entries(&self) -> Vec<Option<String>> {
        let mut entries = Vec::new();
        self.for_each(|v| {
            let entry = match v {
                ValueOrContainer::Value(val) => val.as_string().map(|s| s.to_string()),
                _ => None,
            };
            entries.push(entry);
        });
        entries
    }

    fn positions_of(&self, id: &str) -> Vec<usize> {
        self.raw_entries()
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| (entry.as_deref() == Some(id)).then_some(i))
            .collect()
    }
}
