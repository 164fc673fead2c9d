//! Paths that skip admission entirely

/// Leading path segments served as static content.
const STATIC_PREFIXES: &[&str] = &[
    "_next/static",
    "_next/image",
    "favicon.ico",
    "logo",
    "fonts",
    "images",
];

/// Extensions that mark a static asset anywhere in the path.
const STATIC_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".svg", ".webp", ".ico", ".woff2"];

/// True for requests the gate must not count or block.
///
/// A prefix only matches whole: `/logo.svg` and `/logo/x` are static,
/// `/logout` is not.
pub fn is_static_asset(path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');

    let prefixed = STATIC_PREFIXES.iter().any(|prefix| {
        trimmed
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('.'))
    });

    prefixed || STATIC_EXTENSIONS.iter().any(|ext| trimmed.contains(ext))
}
