use std::env;
use std::sync::OnceLock;

static CACHE_CAPACITY: OnceLock<Option<usize>> = OnceLock::new();

/// Optional override for the staged executable cache capacity.
/// Invalid or zero values fall back to the built-in default.
pub(crate) fn staged_cache_capacity() -> Option<usize> {
    *CACHE_CAPACITY.get_or_init(|| match env::var("TREESTAGE_CACHE_CAPACITY") {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse::<usize>().ok().filter(|cap| *cap > 0)
        }
        _ => None,
    })
}
