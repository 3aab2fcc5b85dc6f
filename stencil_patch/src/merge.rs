//! The two merge flavours shared by the patch verbs and the context builder.

use serde_json::Value as Json;

/// Deep_merge merges `src` into `dst` recursively.
///
/// Mappings merge key by key; everything else, sequences included, replaces
/// wholesale. `null` is an ordinary value, not a deletion marker.
pub fn deep_merge(dst: &mut Json, src: &Json) {
    match (dst, src) {
        (Json::Object(dst), Json::Object(src)) => {
            for (k, v) in src {
                match dst.get_mut(k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        dst.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Shallow_merge merges `src` into `dst` one level deep.
///
/// Top-level keys of `src` replace whole values in `dst`, nested mappings
/// included.
pub fn shallow_merge(dst: &mut Json, src: &Json) {
    match (dst, src) {
        (Json::Object(dst), Json::Object(src)) => {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}
