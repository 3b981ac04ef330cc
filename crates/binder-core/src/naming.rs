//! Deterministic, DNS-safe build and image names.
//!
//! A repository + ref must always map to the same build name, because that
//! name is how an in-flight build is found again. Build names are capped at
//! 63 characters (a Kubernetes label value); image names at 255.

use sha2::{Digest, Sha256};

pub const BUILD_NAME_LIMIT: usize = 63;
pub const IMAGE_NAME_LIMIT: usize = 255;
pub const BUILD_PREFIX: &str = "build-";

/// Replace every char outside `[A-Za-z0-9]` with `-XX` per UTF-8 byte.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("-{b:02X}"));
            }
        }
    }
    out
}

/// Escape `slug`, truncate it, and append a short hash of the original.
///
/// The hash keeps truncated or escaped slugs distinct, and guarantees the
/// result never ends with `-`.
pub fn safe_build_slug(slug: &str, limit: usize, hash_length: usize) -> String {
    let hash = hex::encode(Sha256::digest(slug.as_bytes()));
    let escaped = escape(slug);
    let keep = limit.saturating_sub(hash_length + 1).min(escaped.len());
    // `escape` output is ASCII, so byte slicing is char slicing.
    format!("{}-{}", &escaped[..keep], &hash[..hash_length.min(hash.len())]).to_lowercase()
}

/// Build name for `slug` at `git_ref`, at most `limit` characters.
pub fn generate_build_name(
    slug: &str,
    git_ref: &str,
    prefix: &str,
    limit: usize,
    ref_length: usize,
) -> String {
    let slug_limit = limit.saturating_sub(prefix.len() + ref_length + 1);
    let safe_slug = safe_build_slug(slug, slug_limit, 6);
    let safe_ref = safe_build_slug(git_ref, ref_length, 2);
    let short_ref: String = safe_ref.chars().take(ref_length).collect();
    format!("{prefix}{safe_slug}-{short_ref}").to_lowercase()
}

/// Build name with the default prefix and limits.
pub fn build_name(slug: &str, git_ref: &str) -> String {
    generate_build_name(slug, git_ref, BUILD_PREFIX, BUILD_NAME_LIMIT, 6)
}

/// Full image reference `{prefix}{safe_slug}:{ref}`.
pub fn image_name(prefix: &str, slug: &str, git_ref: &str) -> String {
    let safe_slug = safe_build_slug(slug, IMAGE_NAME_LIMIT.saturating_sub(prefix.len()), 6);
    format!("{prefix}{safe_slug}:{git_ref}")
        .replace('_', "-")
        .to_lowercase()
}
