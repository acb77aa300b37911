//! Expansion of a variant into its resolved package list.

use mxpack_schema::{Config, Variant};

/// Package name of a rez request: the text before the first `-`.
fn package_name(request: &str) -> &str {
    request.split('-').next().unwrap_or(request)
}

/// Number of `-`-delimited tokens; more tokens means a more specific request.
fn specificity(request: &str) -> usize {
    request.split('-').count()
}

/// The full, de-duplicated request for building `variant`.
///
/// Sources are merged in this order: runtime requirements, build
/// requirements, the variant's additions, then the variant's own keys.
pub fn package_list(config: &Config, variant: &Variant) -> Vec<String> {
    let requires = config.requires(&[]);
    let build_requires = config.build_requires(&[]);
    let full = requires
        .iter()
        .chain(&build_requires)
        .chain(&variant.additions)
        .chain(&variant.keys)
        .map(String::as_str);

    merge_requests(full, &config.priority)
}

/// Merge requests by package name and pin `priority` packages to the front.
///
/// - Conflict (`!pkg`) and alternative (`a|b`) requests are skipped.
/// - For one package name the request with more tokens wins; on a tie the
///   earlier request stays.
/// - A package keeps the position where its name was first seen.
/// - Priority packages come first, in `priority` order.
pub fn merge_requests<'a>(
    requests: impl IntoIterator<Item = &'a str>,
    priority: &[String],
) -> Vec<String> {
    let mut merged: Vec<(&str, &str)> = Vec::new();

    for request in requests {
        if request.contains('!') || request.contains('|') {
            continue;
        }

        let name = package_name(request);
        match merged.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                if specificity(request) > specificity(slot.1) {
                    slot.1 = request;
                }
            }
            None => merged.push((name, request)),
        }
    }

    // Stable sort: non-priority packages keep discovery order.
    merged.sort_by_key(|(name, _)| {
        priority
            .iter()
            .position(|p| p == name)
            .unwrap_or(priority.len())
    });

    merged.into_iter().map(|(_, r)| r.to_string()).collect()
}
