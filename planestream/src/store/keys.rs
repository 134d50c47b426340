//! Chunk key and URL construction.
//!
//! There is exactly one URL builder in this crate. The prefetch director and
//! the foreground fetch path both go through [`chunk_url`], so the warmed
//! URL and the later "real" request are byte-for-byte identical. Any
//! divergence here (separator, coordinate order, prefix) would produce
//! silent cache misses for every prefetched chunk.

use std::sync::OnceLock;

use regex::Regex;

use super::level::ResolutionLevel;

/// Build the request URL for one chunk.
///
/// Scheme: `{base}/{level}/{t}{sep}{c}{sep}{z_chunk}{sep}{y_chunk}{sep}{x_chunk}`
/// where the separator comes from the level's own metadata document
/// (commonly `/`).
///
/// # Arguments
///
/// * `base` - store base URL, without trailing slash
/// * `level` - resolution level (provides index and separator)
/// * `t` - timepoint index
/// * `c` - channel index
/// * `z_chunk` - chunk index along the depth axis
/// * `y_chunk` - chunk row
/// * `x_chunk` - chunk column
pub fn chunk_url(
    base: &str,
    level: &ResolutionLevel,
    t: u64,
    c: u64,
    z_chunk: u64,
    y_chunk: u64,
    x_chunk: u64,
) -> String {
    let sep = &level.separator;
    format!(
        "{}/{}/{}{sep}{}{sep}{}{sep}{}{sep}{}",
        base.trim_end_matches('/'),
        level.index,
        t,
        c,
        z_chunk,
        y_chunk,
        x_chunk
    )
}

fn tail_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Trailing five coordinate components: t c z y x
        Regex::new(r"(\d+)[/.](\d+)[/.](\d+)[/.](\d+)[/.](\d+)$").expect("valid chunk-path regex")
    })
}

/// Extract the Z-chunk index from a chunk resource path.
///
/// Fallback used when a tile's owning render item cannot tell us its plane
/// (a known timing race during plane switches). Matches the trailing five
/// coordinate components of the URL scheme above, with either `/` or `.`
/// as separator.
///
/// # Returns
///
/// `None` if the path does not end in five coordinate components.
pub fn plane_from_path(path: &str) -> Option<u64> {
    let caps = tail_regex().captures(path)?;
    caps.get(3)?.as_str().parse().ok()
}
