//! Result slot naming: `result`, `result2`, `result5`, ...

/// Parse the version of a slot name with the given prefix.
///
/// A file extension is ignored, an empty suffix is version 0, and names
/// without the prefix or with a non-numeric suffix are not versions.
pub fn parse_version(name: &str, prefix: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?;
    let suffix = rest.split_once('.').map(|(stem, _)| stem).unwrap_or(rest);
    if suffix.is_empty() {
        return Some(0);
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Name of the slot holding `version`.
pub fn slot_name(prefix: &str, version: u64) -> String {
    if version == 0 {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, version)
    }
}

/// Pick the name with the highest version. Ties go to the greater name.
pub fn resolve_latest_version<'a, I>(names: I, prefix: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter_map(|name| parse_version(name, prefix).map(|v| (v, name)))
        .max()
        .map(|(_, name)| name)
}

/// First version after every existing one; slots start at 1.
///
/// `None` once the highest existing version is `u64::MAX`.
pub fn next_version<'a, I>(names: I, prefix: &str) -> Option<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    match names
        .into_iter()
        .filter_map(|name| parse_version(name, prefix))
        .max()
    {
        Some(v) => v.checked_add(1),
        None => Some(1),
    }
}
