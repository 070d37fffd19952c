//! Locates the listing array inside the page's hydration JSON.
//!
//! The document's layout is not a published contract, so instead of a fixed
//! path we walk the whole tree depth-first looking for a `"properties"` key
//! whose value is a non-empty array of listing-shaped objects. The walk uses
//! an explicit stack: input depth is bounded only by memory, never by the
//! call stack.

use serde_json::Value;

/// Key under which the site stores its listings.
pub const LISTINGS_KEY: &str = "properties";

/// Keys the first element must carry for an array to count as listings.
const REQUIRED_LISTING_KEYS: [&str; 2] = ["price", "bedrooms"];

enum Pending<'a> {
    /// A value whose children still need visiting.
    Visit(&'a Value),
    /// An object entry: check it as a candidate, then descend into it.
    Entry(&'a str, &'a Value),
}

/// Return the first listing array found in document order, if any.
///
/// Objects are scanned entry by entry. Each entry is tested as a candidate
/// before its own subtree is searched, and a whole entry's subtree is searched
/// before the next sibling is looked at.
pub fn find_record_list(root: &Value) -> Option<&[Value]> {
    let mut stack = vec![Pending::Visit(root)];

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Entry(key, value) => {
                if key == LISTINGS_KEY {
                    if let Some(records) = as_listing_array(value) {
                        return Some(records);
                    }
                }
                stack.push(Pending::Visit(value));
            }
            Pending::Visit(Value::Object(map)) => {
                stack.extend(
                    map.iter()
                        .rev()
                        .map(|(key, value)| Pending::Entry(key.as_str(), value)),
                );
            }
            Pending::Visit(Value::Array(items)) => {
                stack.extend(items.iter().rev().map(Pending::Visit));
            }
            Pending::Visit(_) => {}
        }
    }

    None
}

fn as_listing_array(value: &Value) -> Option<&[Value]> {
    let items = value.as_array()?;
    let first = items.first()?.as_object()?;
    REQUIRED_LISTING_KEYS
        .iter()
        .all(|key| first.contains_key(*key))
        .then_some(items.as_slice())
}
