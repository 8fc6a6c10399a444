//! Low-level lopdf helpers shared by background decoding and compositing.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// Page tree depth after which inheritance lookups give up (broken files).
const MAX_DEPTH: usize = 32;

/// Default to US Letter size when no MediaBox can be found.
pub const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Follow references until a direct object is reached.
pub fn resolve<'a>(objects: &'a BTreeMap<ObjectId, Object>, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = objects.get(id)?,
            other => return Some(other),
        }
    }
    None
}

/// Look up a page attribute, walking up the page tree for inheritable keys.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.objects.get(&page_id)?.as_dict().ok()?;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(&doc.objects, value);
        }
        let parent = node.get(b"Parent").ok()?;
        node = resolve(&doc.objects, parent)?.as_dict().ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        #[allow(clippy::cast_precision_loss)]
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Page MediaBox as `[x0, y0, x1, y1]` with `x0 <= x1` and `y0 <= y1`.
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(Object::Array(arr)) = inherited(doc, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_BOX;
    };

    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| resolve(&doc.objects, o).and_then(number))
        .collect();

    if values.len() != 4 {
        return DEFAULT_PAGE_BOX;
    }

    [
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ]
}

/// Effective resources of a page as a direct dictionary (cloned).
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Decoded content of a page, concatenating content arrays.
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::Lopdf(format!("Failed to get page: {e}")))?;

    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let streams: Vec<&Object> = match resolve(&doc.objects, contents) {
        Some(Object::Array(arr)) => arr.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };

    let mut result = Vec::new();
    for obj in streams {
        if let Some(Object::Stream(stream)) = resolve(&doc.objects, obj) {
            // Fall back to raw content when the stream is not compressed
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            result.extend_from_slice(&content);
            result.push(b'\n');
        }
    }
    Ok(result)
}

/// Deep copy an object from `source` into `target`, following references.
///
/// `/Parent` entries are dropped so copying a resource never drags the
/// source page tree along. The map is filled before recursing, which makes
/// reference cycles terminate.
pub fn copy_object(
    target: &mut Document,
    source: &BTreeMap<ObjectId, Object>,
    obj: &Object,
    map: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object> {
    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = map.get(id) {
                return Ok(Object::Reference(new_id));
            }
            let referenced = source
                .get(id)
                .ok_or_else(|| Error::Lopdf(format!("dangling reference {} {} R", id.0, id.1)))?;

            let new_id = target.new_object_id();
            map.insert(*id, new_id);
            let copied = copy_object(target, source, referenced, map)?;
            target.objects.insert(new_id, copied);
            Ok(Object::Reference(new_id))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(target, source, dict, map)?)),
        Object::Array(items) => items
            .iter()
            .map(|item| copy_object(target, source, item, map))
            .collect::<Result<Vec<_>>>()
            .map(Object::Array),
        Object::Stream(stream) => {
            let dict = copy_dictionary(target, source, &stream.dict, map)?;
            let mut copied = stream.clone();
            copied.dict = dict;
            Ok(Object::Stream(copied))
        }
        other => Ok(other.clone()),
    }
}

fn copy_dictionary(
    target: &mut Document,
    source: &BTreeMap<ObjectId, Object>,
    dict: &Dictionary,
    map: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary> {
    let mut copied = Dictionary::new();
    for (key, value) in dict.iter() {
        if key.as_slice() == b"Parent" {
            continue;
        }
        copied.set(key.clone(), copy_object(target, source, value, map)?);
    }
    Ok(copied)
}
