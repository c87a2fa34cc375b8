//! Stage-1 chunking strategies (spec.md §4.5).
//!
//! Applied in order; the first strategy that applies to the data wins.

use serde_json::Value;

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Splits `data` into chunks whose word count each stays under `max_words`,
/// trying JSON-array packing, then JSON-object-with-array-field, then
/// paragraph grouping, then falling back to word-count slicing.
#[must_use]
pub fn chunk(data: &str, max_words: usize) -> Vec<String> {
    if max_words == 0 || word_count(data) <= max_words {
        return vec![data.to_string()];
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(data) {
        if items.len() >= 2 {
            return chunk_json_array(&items, max_words);
        }
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(data) {
        if let Some((key, Value::Array(items))) = map.iter().find(|(_, v)| matches!(v, Value::Array(a) if a.len() >= 2)) {
            let key = key.clone();
            let siblings: Vec<(String, Value)> = map
                .iter()
                .filter(|(k, _)| *k != &key)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return chunk_json_object_array(&key, items, &siblings, max_words);
        }
    }

    let paragraphs: Vec<&str> = data.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    if paragraphs.len() >= 2 {
        return chunk_paragraphs(&paragraphs, max_words);
    }

    chunk_by_words(data, max_words)
}

/// Packs array elements into groups whose aggregate word count stays within
/// `max_words`; an element that alone exceeds `max_words` becomes its own
/// chunk (spec.md §8 testable property).
fn chunk_json_array(items: &[Value], max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    let mut current_words = 0usize;

    for item in items {
        let item_words = word_count(&item.to_string());
        if !current.is_empty() && current_words + item_words > max_words {
            chunks.push(Value::Array(std::mem::take(&mut current)).to_string());
            current_words = 0;
        }
        current_words += item_words;
        current.push(item.clone());
    }
    if !current.is_empty() {
        chunks.push(Value::Array(current).to_string());
    }
    chunks
}

fn chunk_json_object_array(
    key: &str,
    items: &[Value],
    siblings: &[(String, Value)],
    max_words: usize,
) -> Vec<String> {
    let array_chunks = chunk_json_array(items, max_words);
    array_chunks
        .into_iter()
        .map(|chunk_text| {
            let array_value: Value = serde_json::from_str(&chunk_text).unwrap_or(Value::Array(Vec::new()));
            let mut obj = serde_json::Map::new();
            for (k, v) in siblings {
                obj.insert(k.clone(), v.clone());
            }
            obj.insert(key.to_string(), array_value);
            Value::Object(obj).to_string()
        })
        .collect()
}

fn chunk_paragraphs(paragraphs: &[&str], max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for p in paragraphs {
        let p_words = word_count(p);
        if !current.is_empty() && current_words + p_words > max_words {
            chunks.push(current.join("\n\n"));
            current.clear();
            current_words = 0;
        }
        current_words += p_words;
        current.push(p);
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

fn chunk_by_words(data: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = data.split_whitespace().collect();
    words
        .chunks(max_words.max(1))
        .map(|group| group.join(" "))
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn short_phrase() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z]{1,6}", 1..4).prop_map(|words| words.join(" "))
    }

    proptest! {
        /// Every element survives chunking exactly once, and no chunk holds
        /// more words than an element's own size would force onto it
        /// (spec.md §8: word-count bound, element-set preservation).
        #[test]
        fn json_array_chunking_preserves_elements_and_bounds_chunk_size(
            phrases in prop::collection::vec(short_phrase(), 1..12),
            max_words in 1usize..8,
        ) {
            let items: Vec<Value> = phrases.iter().map(|p| Value::String(p.clone())).collect();
            let chunks = chunk_json_array(&items, max_words);

            let recovered: Vec<Value> = chunks
                .iter()
                .flat_map(|c| match serde_json::from_str::<Value>(c).unwrap() {
                    Value::Array(elements) => elements,
                    other => vec![other],
                })
                .collect();
            prop_assert_eq!(recovered, items);

            for chunk_text in &chunks {
                let parsed: Value = serde_json::from_str(chunk_text).unwrap();
                if let Value::Array(elements) = parsed {
                    if elements.len() > 1 {
                        let total: usize = elements.iter().map(|e| word_count(&e.to_string())).sum();
                        prop_assert!(total <= max_words);
                    }
                }
            }
        }
    }
}
