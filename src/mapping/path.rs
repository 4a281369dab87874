//! Dotted-path / numeric-index resolver over `serde_json::Value`.

use serde_json::Value;

/// Resolve `path` against `source`.
///
/// Supports dotted field names and `[n]` numeric array indices, e.g.
/// `data.items[0].price`. A missing segment at any point yields `None`
/// rather than an error. When `path` contains neither `.` nor `[`, a fast
/// path does a single object lookup.
pub fn resolve<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
	if !path.contains('.') && !path.contains('[') {
		return source.get(path);
	}

	let mut current = source;
	for segment in split_path(path) {
		current = match segment {
			PathSegment::Field(name) => current.get(name)?,
			PathSegment::Index(index) => current.get(index)?,
		};
	}
	Some(current)
}

enum PathSegment<'a> {
	Field(&'a str),
	Index(usize),
}

fn split_path(path: &str) -> impl Iterator<Item = PathSegment<'_>> {
	path.split('.').flat_map(split_indices)
}

fn split_indices(segment: &str) -> impl Iterator<Item = PathSegment<'_>> {
	let mut parts = Vec::new();
	let mut rest = segment;

	if let Some(bracket) = rest.find('[') {
		if bracket > 0 {
			parts.push(PathSegment::Field(&rest[..bracket]));
		}
		rest = &rest[bracket..];
		while let Some(stripped) = rest.strip_prefix('[') {
			if let Some(end) = stripped.find(']') {
				if let Ok(index) = stripped[..end].parse::<usize>() {
					parts.push(PathSegment::Index(index));
				}
				rest = &stripped[end + 1..];
			} else {
				break;
			}
		}
	} else if !rest.is_empty() {
		parts.push(PathSegment::Field(rest));
	}

	parts.into_iter()
}

/// Resolve the first of `path` or each entry in `fallbacks` (in order) that
/// yields a defined, non-null value. Returns the value and, if a fallback
/// supplied it, the fallback's index.
pub fn resolve_with_fallbacks<'a>(
	source: &'a Value,
	path: &str,
	fallbacks: &[String],
) -> (Option<&'a Value>, Option<usize>) {
	if let Some(value) = resolve(source, path).filter(|value| !value.is_null()) {
		return (Some(value), None);
	}
	for (index, fallback) in fallbacks.iter().enumerate() {
		if let Some(value) = resolve(source, fallback).filter(|value| !value.is_null()) {
			return (Some(value), Some(index));
		}
	}
	(None, None)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn resolves_flat_field_on_the_fast_path() {
		let source = json!({ "lastDone": "561.000" });
		assert_eq!(resolve(&source, "lastDone").unwrap(), "561.000");
	}

	#[test]
	fn resolves_dotted_and_indexed_paths() {
		let source = json!({ "data": { "items": [{ "price": 12.5 }] } });
		assert_eq!(resolve(&source, "data.items[0].price").unwrap(), 12.5);
	}

	#[test]
	fn missing_segment_returns_none_not_error() {
		let source = json!({ "data": {} });
		assert!(resolve(&source, "data.items[0].price").is_none());
	}

	#[test]
	fn falls_back_in_order_skipping_null_and_missing() {
		let source = json!({ "lastDone": null, "price": { "current": 10.0 } });
		let (value, used) = resolve_with_fallbacks(&source, "lastDone", &["missing.path".into(), "price.current".into()]);
		assert_eq!(value.unwrap(), 10.0);
		assert_eq!(used, Some(1));
	}
}
